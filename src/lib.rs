pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use error::{ClickError, ClickResult};
