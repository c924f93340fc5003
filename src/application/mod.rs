//! Application services layer.

pub mod accounts;
pub mod error;
pub mod repos;
