use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Normalizes a URL so that equivalent spellings produce the same string
///
/// # Normalization Steps
///
/// 1. Reject input longer than `max_len`
/// 2. Resolve against `base` when given (standard URL resolution), else parse
///    as an absolute URL; reject if malformed
/// 3. Reject anything but http/https and URLs without a host
/// 4. Lowercase scheme and host, drop default ports
/// 5. Normalize path:
///    - Decode percent-encoded unreserved characters, uppercase other escapes
///    - Remove dot segments and empty segments
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 6. Remove fragment
/// 7. Remove tracking query parameters, sort the rest by key
/// 8. Remove empty query string
/// 9. Reject the result if it is longer than `max_len`
///
/// The scheme and any `www.` label are preserved: they name distinct hosts
/// for politeness purposes.
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("https://Example.com/docs/").unwrap();
/// let url = normalize("../about/?b=2&a=1#team", Some(&base), 2048).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about?a=1&b=2");
/// ```
pub fn normalize(raw: &str, base: Option<&Url>, max_len: usize) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.len() > max_len {
        return Err(UrlError::TooLong {
            len: raw.len(),
            max: max_len,
        });
    }

    let parsed = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    let mut url = parsed.map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingDomain),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(&normalize_percent_encoding(url.path()));
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params.iter());
        }
    }

    if url.as_str().len() > max_len {
        return Err(UrlError::TooLong {
            len: url.as_str().len(),
            max: max_len,
        });
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Skip empty segments (from multiple slashes) and current directory markers
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Decodes escapes of unreserved characters and uppercases the remaining ones
///
/// `%7e` and `~` name the same resource, so both spellings must collapse.
fn normalize_percent_encoding(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &path[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if value.is_ascii_alphanumeric() || matches!(value, b'-' | b'.' | b'_' | b'~') {
                    out.push(value as char);
                } else {
                    out.push('%');
                    out.push_str(&hex.to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.is_empty() && !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable: repeated keys keep their relative order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
