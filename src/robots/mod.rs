//! Robots.txt handling module
//!
//! This module parses robots.txt files and caches the resolved rules per
//! domain. An unreachable robots.txt is governed by an explicit fail policy:
//! failing open keeps the crawl live at the cost of strict compliance,
//! failing closed skips the whole domain.

mod cache;
mod parser;

pub use cache::{RobotsCache, RobotsLookup, RobotsSettings};
pub use parser::{RobotsOrigin, RobotsRules};
