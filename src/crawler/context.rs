//! Everything a crawl needs, passed explicitly
//!
//! The coordinator and its workers share one `CrawlContext` behind an `Arc`.
//! Swapping an adapter (fetcher, parser, content store, frontier) means
//! building the context with a different implementation.

use crate::checkpoint::CheckpointManager;
use crate::config::Config;
use crate::crawler::{Fetcher, HtmlParser, Parser, PolitenessPolicy};
use crate::storage::{ContentStore, FrontierStore, FsContentStore};
use crate::url::{normalize, CrawlScope};
use std::sync::Arc;
use url::Url;

pub struct CrawlContext {
    pub config: Arc<Config>,
    pub frontier: Arc<dyn FrontierStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub politeness: PolitenessPolicy,
    pub parser: Arc<dyn Parser>,
    pub content: Arc<dyn ContentStore>,
    pub checkpoints: CheckpointManager,
    pub scope: CrawlScope,
    /// Seeds that survived normalization
    pub seeds: Vec<Url>,
}

impl CrawlContext {
    /// Builds a context with the default parser and filesystem content store
    pub fn new(config: Config, frontier: Arc<dyn FrontierStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        let max_len = config.crawler.max_url_length;
        let seeds: Vec<Url> = config
            .seeds
            .iter()
            .filter_map(|raw| match normalize(raw, None, max_len) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(seed = %raw, error = %e, "Ignoring invalid seed URL");
                    None
                }
            })
            .collect();

        let scope = CrawlScope::from_config(&config.scope, &seeds);
        let politeness = PolitenessPolicy::new(&config, fetcher.clone());
        let checkpoints = CheckpointManager::from_config(&config.output);
        let content: Arc<dyn ContentStore> =
            Arc::new(FsContentStore::new(config.output.repository_dir()));

        Self {
            config: Arc::new(config),
            frontier,
            fetcher,
            politeness,
            parser: Arc::new(HtmlParser::new()),
            content,
            checkpoints,
            scope,
            seeds,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = content;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = checkpoints;
        self
    }
}
