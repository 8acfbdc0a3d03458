use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key politeness state is tracked under
///
/// This is the host, plus the port when it is not the scheme default, since
/// two servers on one host are throttled independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::domain_key;
///
/// assert_eq!(domain_key(&Url::parse("https://example.com/a").unwrap()), "example.com");
/// assert_eq!(domain_key(&Url::parse("http://127.0.0.1:8080/").unwrap()), "127.0.0.1:8080");
/// ```
pub fn domain_key(url: &Url) -> String {
    let host = extract_host(url).unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// The robots.txt location serving the given URL's domain
pub fn robots_url(url: &Url) -> Option<Url> {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    if !robots.username().is_empty() || robots.password().is_some() {
        robots.set_username("").ok()?;
        robots.set_password(None).ok()?;
    }
    Some(robots)
}

/// Path plus query, the part robots rules are matched against
pub fn robots_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
