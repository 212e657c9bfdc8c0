//! Post URL recognition and shortcode extraction.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

// Compile-time constant patterns; Regex::new cannot fail on them.
static RE_POST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?instagram\.com/(p|reel)/.+$").expect("invalid post URL regex")
});
static RE_SHORTCODE_PRESENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(p|reel)/([a-zA-Z0-9_-]+)/?").expect("invalid shortcode presence regex")
});
static RE_SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(p|reel)/([a-zA-Z0-9_-]+)(?:/|\?|$)").expect("invalid shortcode regex")
});

/// Whether `url` looks like a post or reel URL (scheme and `www.` optional).
#[must_use]
pub fn is_post_url(url: &str) -> bool {
    RE_POST_URL.is_match(url)
}

#[must_use]
pub fn is_shortcode_present(url: &str) -> bool {
    RE_SHORTCODE_PRESENT
        .captures(url)
        .and_then(|c| c.get(2))
        .is_some_and(|m| !m.as_str().is_empty())
}

/// Extract the shortcode from a `/p/<code>` or `/reel/<code>` URL.
#[must_use]
pub fn post_shortcode(url: &str) -> Option<String> {
    RE_SHORTCODE
        .captures(url)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
}

/// Validate a user-supplied post URL and return its shortcode.
pub fn parse_post_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("post URL is required".to_string()));
    }
    if !is_post_url(url) || !is_shortcode_present(url) {
        return Err(Error::InvalidInput(format!("not a post or reel URL: {url}")));
    }
    post_shortcode(url)
        .ok_or_else(|| Error::InvalidInput(format!("no shortcode found in {url}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_shortcode() {
        assert_eq!(
            post_shortcode("https://www.instagram.com/p/CxYz_12-ab/").as_deref(),
            Some("CxYz_12-ab")
        );
        assert_eq!(
            post_shortcode("https://instagram.com/reel/C1a2B3c4?igsh=abc").as_deref(),
            Some("C1a2B3c4")
        );
        assert_eq!(post_shortcode("instagram.com/REEL/AbC").as_deref(), Some("AbC"));
        assert_eq!(post_shortcode("https://instagram.com/stories/someone/123"), None);
        // Characters outside the shortcode alphabet end the match without a boundary.
        assert_eq!(post_shortcode("https://instagram.com/p/abc.def"), None);
    }

    #[test]
    fn test_is_post_url() {
        assert!(is_post_url("https://www.instagram.com/p/abc/"));
        assert!(is_post_url("http://instagram.com/reel/abc"));
        assert!(is_post_url("instagram.com/p/abc"));
        assert!(!is_post_url("https://example.com/p/abc"));
        assert!(!is_post_url("https://instagram.com/p/"));
        assert!(!is_post_url("https://instagram.com/tv/abc"));
    }

    #[test]
    fn test_is_shortcode_present() {
        assert!(is_shortcode_present("https://instagram.com/reel/abc"));
        assert!(!is_shortcode_present("https://instagram.com/reel/"));
    }

    #[test]
    fn test_parse_post_url() {
        assert_eq!(
            parse_post_url("  https://www.instagram.com/reel/Cq1w2E3r/?utm_source=ig  ").unwrap(),
            "Cq1w2E3r"
        );
        assert!(matches!(parse_post_url(""), Err(Error::InvalidInput(_))));
        assert!(matches!(
            parse_post_url("https://www.youtube.com/watch?v=abc"),
            Err(Error::InvalidInput(_))
        ));
    }
}
