//! URL handling module for Sumi-Crawl
//!
//! This module provides URL normalization, domain keys for politeness
//! tracking, and the crawl scope that decides which links may be enqueued.

mod domain;
mod matcher;
mod normalize;

use crate::config::ScopeConfig;
use url::Url;

pub use domain::{domain_key, extract_host, robots_path, robots_url};
pub use matcher::DomainPattern;
pub use normalize::normalize;

/// Result of checking a URL against the crawl scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeDecision {
    /// Link may be enqueued
    InScope,
    /// Link is recorded (optionally) but never fetched
    OutOfScope,
}

impl ScopeDecision {
    pub fn is_in_scope(&self) -> bool {
        matches!(self, Self::InScope)
    }
}

/// The set of domains a crawl is allowed to enter
///
/// Built once per session from `[scope]`. When no patterns are configured,
/// the hosts of the seed URLs form the scope.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    patterns: Vec<DomainPattern>,
    follow_subdomains: bool,
}

impl CrawlScope {
    pub fn new(patterns: Vec<DomainPattern>, follow_subdomains: bool) -> Self {
        Self {
            patterns,
            follow_subdomains,
        }
    }

    /// Builds the scope from configuration, falling back to the seed hosts
    pub fn from_config(scope: &ScopeConfig, seeds: &[Url]) -> Self {
        let patterns = if scope.allowed_domains.is_empty() {
            seeds
                .iter()
                .filter_map(extract_host)
                .map(DomainPattern::Exact)
                .collect()
        } else {
            scope
                .allowed_domains
                .iter()
                .map(|p| DomainPattern::parse(p))
                .collect()
        };
        Self::new(patterns, scope.follow_subdomains)
    }

    /// Classifies a normalized URL
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_crawl::url::{CrawlScope, DomainPattern, ScopeDecision};
    /// use url::Url;
    ///
    /// let scope = CrawlScope::new(vec![DomainPattern::parse("example.com")], false);
    /// let inside = Url::parse("https://example.com/a").unwrap();
    /// let outside = Url::parse("https://other.org/").unwrap();
    /// assert_eq!(scope.classify(&inside), ScopeDecision::InScope);
    /// assert_eq!(scope.classify(&outside), ScopeDecision::OutOfScope);
    /// ```
    pub fn classify(&self, url: &Url) -> ScopeDecision {
        let Some(host) = extract_host(url) else {
            return ScopeDecision::OutOfScope;
        };

        if self
            .patterns
            .iter()
            .any(|pattern| pattern.matches(&host, self.follow_subdomains))
        {
            ScopeDecision::InScope
        } else {
            ScopeDecision::OutOfScope
        }
    }

    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_scope_defaults_to_seed_hosts() {
        let config = ScopeConfig {
            allowed_domains: vec![],
            follow_subdomains: false,
            record_out_of_scope: true,
        };
        let scope = CrawlScope::from_config(&config, &[url("https://example.com/")]);

        assert!(scope.classify(&url("https://example.com/x")).is_in_scope());
        assert!(!scope.classify(&url("https://blog.example.com/")).is_in_scope());
        assert!(!scope.classify(&url("https://other.org/")).is_in_scope());
    }

    #[test]
    fn test_scope_follows_subdomains() {
        let config = ScopeConfig {
            allowed_domains: vec![],
            follow_subdomains: true,
            record_out_of_scope: true,
        };
        let scope = CrawlScope::from_config(&config, &[url("https://example.com/")]);
        assert!(scope.classify(&url("https://blog.example.com/")).is_in_scope());
    }

    #[test]
    fn test_configured_patterns_override_seeds() {
        let config = ScopeConfig {
            allowed_domains: vec!["*.example.org".to_string()],
            follow_subdomains: false,
            record_out_of_scope: true,
        };
        let scope = CrawlScope::from_config(&config, &[url("https://example.com/")]);

        assert!(!scope.classify(&url("https://example.com/")).is_in_scope());
        assert!(scope.classify(&url("https://docs.example.org/")).is_in_scope());
    }

    #[test]
    fn test_scope_ignores_port() {
        let scope = CrawlScope::new(vec![DomainPattern::parse("127.0.0.1")], false);
        assert!(scope.classify(&url("http://127.0.0.1:4567/page")).is_in_scope());
    }
}
