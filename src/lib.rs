pub mod analyzer;
pub mod archive;
pub mod config;
pub mod crawl;
pub mod error;
pub mod freshness;
pub mod graph;
pub mod registry;
pub mod service;
pub mod storage;
pub mod sweeper;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use error::{Error, ResponseClass, Result};
pub use service::IndexService;
