pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod store;

pub use crate::core::*;
pub use error::*;
pub use store::{DateRange, EventStore, QueryFilters};
