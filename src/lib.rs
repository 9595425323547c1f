pub mod apis;
pub mod app;
pub mod common;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod rate_limiter;
pub mod storage;
pub mod types;

pub use error::{Result, ScraperError};
