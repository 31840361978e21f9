pub mod admission;
pub mod ai;
pub mod config;
pub mod decoder;
pub mod error;
pub mod handlers;
pub mod key;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod router;
pub mod state;
pub mod upstream;

pub use error::{GateError, Result};
