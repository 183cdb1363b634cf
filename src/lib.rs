pub mod auth;
pub mod codec;
pub mod config;
pub mod crawl;
pub mod descriptor;
mod error;
pub mod events;
pub mod http;
pub mod models;
pub mod names;
pub mod pagination;
pub mod paths;
pub mod resolver;

pub use error::{EngineError, Result};
