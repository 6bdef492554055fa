//! Hostname normalization and validation shared by the engine, the list
//! repository and the page watchers.

use url::Url;

/// Lowercases and trims a raw host so lookups and storage keys agree.
/// Returns `None` for input that cannot name a host at all.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == ':' || c == '@')
    {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Strict check for list entries: labels of `[a-z0-9-]` that start and end
/// alphanumeric, each at most 63 bytes, at least two labels, and a final
/// label of at least two characters. Expects already-normalized input.
pub fn validate(host: &str) -> bool {
    if host.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    if labels.last().map_or(true, |tld| tld.len() < 2) {
        return false;
    }
    labels.iter().all(|label| label_ok(label))
}

fn label_ok(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// Extracts the normalized host from a page URL, if it has one.
pub fn host_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    normalize(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("News.Example.COM"), Some("news.example.com".into()));
        assert_eq!(normalize("  example.com.  "), Some("example.com".into()));
        assert_eq!(normalize(".example.com"), Some("example.com".into()));
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("exa mple.com"), None);
        assert_eq!(normalize("https://example.com"), None);
        assert_eq!(normalize("user@example.com"), None);
    }

    #[test]
    fn test_validate() {
        assert!(validate("example.com"));
        assert!(validate("a.bc"));
        assert!(validate("my-site.co.uk"));
        assert!(validate("xn--bcher-kva.example"));

        // Single label, empty labels, bad hyphen placement
        assert!(!validate("localhost"));
        assert!(!validate("example..com"));
        assert!(!validate("-bad.com"));
        assert!(!validate("bad-.com"));
        // Final label too short, oversized label
        assert!(!validate("example.a"));
        let long = format!("{}.com", "a".repeat(64));
        assert!(!validate(&long));
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(
            host_from_url("https://News.Example.com/some/page?q=1"),
            Some("news.example.com".into())
        );
        assert_eq!(host_from_url("http://sub.site.org:8080/x"), Some("sub.site.org".into()));
        assert_eq!(host_from_url("not a url"), None);
        assert_eq!(host_from_url("file:///tmp/notes.txt"), None);
    }
}
