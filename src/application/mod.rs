//! Application services and the ports they depend on.

pub mod calculator;
pub mod error;
pub mod repos;
