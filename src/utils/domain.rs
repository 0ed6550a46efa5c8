//! Utility functions for turning website/domain cells into bare domains.

use url::Url;

fn keep_domain_chars(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Extracts a bare, lower-cased domain (e.g. "example.com") from a website or domain cell.
///
/// Handles common variations:
/// - Adds `https://` scheme if missing before parsing.
/// - Removes the `www.` prefix, any path, query or port.
/// - Keeps only `[a-z0-9.-]`.
///
/// Returns an empty string when nothing usable remains; callers treat that as
/// "missing domain".
pub fn clean_domain(website_url_or_domain: &str) -> String {
    let trimmed_input = website_url_or_domain.trim().to_lowercase();
    if trimmed_input.is_empty() {
        return String::new();
    }

    let url_str_with_scheme = if trimmed_input.contains("://") {
        trimmed_input.clone()
    } else {
        format!("https://{}", trimmed_input)
    };

    let host = match Url::parse(&url_str_with_scheme) {
        Ok(url) => url.host_str().map(str::to_string),
        Err(e) => {
            tracing::trace!("'{}' is not a parsable URL ({}); cleaning manually.", trimmed_input, e);
            None
        }
    };

    let host = host.unwrap_or_else(|| {
        let without_scheme = trimmed_input
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&trimmed_input);
        without_scheme
            .split(|c: char| c == '/' || c == '?' || c == '#' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_string()
    });

    let domain = host.strip_prefix("www.").unwrap_or(&host);
    keep_domain_chars(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_domain_variants() {
        assert_eq!(clean_domain("example.com"), "example.com");
        assert_eq!(clean_domain("  WWW.Example.com "), "example.com");
        assert_eq!(clean_domain("https://www.example.com/about?x=1"), "example.com");
        assert_eq!(clean_domain("http://shop.example.co.uk:8080/"), "shop.example.co.uk");
        assert_eq!(clean_domain("example.com/path with space"), "example.com");
    }

    #[test]
    fn test_clean_domain_empty() {
        assert_eq!(clean_domain(""), "");
        assert_eq!(clean_domain("   "), "");
    }
}
