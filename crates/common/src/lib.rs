//! Process-level helpers shared by the store binary and service crate.

pub mod env;
pub mod utils;
