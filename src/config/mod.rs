//! Configuration module for Sumi-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so command-line flags alone can describe a crawl.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, OutputConfig, PolitenessConfig, RenderConfig, RetryConfig, ScopeConfig,
    UserAgentConfig,
};

pub use parser::{config_fingerprint, load_config, parse_config};
pub use validation::validate;
