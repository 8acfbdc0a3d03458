//! Integration tests for Sumi-Crawl
//!
//! `crawl_tests` drives the real HTTP stack against wiremock servers. The
//! other modules use a scripted in-process fetcher so timing and ordering can
//! be observed exactly.

mod crawl_tests;
mod frontier_tests;
mod politeness_tests;
mod resume_tests;
mod support;
