/// A parsed domain pattern from the `[scope]` configuration
///
/// Two shapes are supported:
/// 1. Exact: "example.com" matches only "example.com"
///    (and its subdomains when subdomain following is enabled)
/// 2. Wildcard: "*.example.com" always matches the bare domain and every
///    subdomain, nested or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    Wildcard(String),
}

impl DomainPattern {
    /// Parses a pattern, lowercasing it
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => Self::Wildcard(base.to_string()),
            None => Self::Exact(pattern),
        }
    }

    /// Checks a lowercase host against the pattern
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_crawl::url::DomainPattern;
    ///
    /// let exact = DomainPattern::parse("example.com");
    /// assert!(exact.matches("example.com", false));
    /// assert!(!exact.matches("blog.example.com", false));
    /// assert!(exact.matches("blog.example.com", true));
    ///
    /// let wildcard = DomainPattern::parse("*.example.com");
    /// assert!(wildcard.matches("api.v2.example.com", false));
    /// assert!(!wildcard.matches("example.org", false));
    /// ```
    pub fn matches(&self, host: &str, follow_subdomains: bool) -> bool {
        match self {
            Self::Exact(base) => {
                host == base || (follow_subdomains && is_subdomain_of(host, base))
            }
            Self::Wildcard(base) => host == base || is_subdomain_of(host, base),
        }
    }
}

fn is_subdomain_of(host: &str, base: &str) -> bool {
    !base.is_empty()
        && host.len() > base.len() + 1
        && host.ends_with(base)
        && host.as_bytes()[host.len() - base.len() - 1] == b'.'
}
