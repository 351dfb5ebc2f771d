//! Markdown link extraction and URL canonicalization.
//!
//! Only the two link forms the listing tables use are understood:
//! inline `[label](url)` and footnote `[label][n]` with a `[n]: url`
//! definition somewhere else in the same text.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static INLINE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static FOOTNOTE_LINK_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\[(\d+)\]").unwrap());
static FOOTNOTE_LINK_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]:\s+(\S+)").unwrap());

/// Referral parameters some boards append to every outbound link.
const TRACKING_SUFFIXES: [&str; 2] = [
    "?utm_source=Simplify&ref=Simplify",
    "&utm_source=Simplify&ref=Simplify",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    /// (label, url) for `[label](url)`
    pub regular: Vec<(String, String)>,
    /// (label, url) for `[label][n]` whose `[n]:` definition was found
    pub footnotes: Vec<(String, String)>,
}

pub fn find_links(text: &str) -> Links {
    let regular = INLINE_LINK
        .captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    let definitions: HashMap<&str, &str> = FOOTNOTE_LINK_URL
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    // A reference without a definition is dropped, not reported.
    let footnotes = FOOTNOTE_LINK_TEXT
        .captures_iter(text)
        .filter_map(|c| {
            let url = definitions.get(&c[2])?;
            Some((c[1].to_string(), url.to_string()))
        })
        .collect();

    Links { regular, footnotes }
}

/// Rewrites every link URL through `transform` in place and drops `**`
/// bold markers. Inline links collapse to `label` followed by the
/// transformed URL, so `|_| String::new()` leaves plain label text.
pub fn replace_links<F>(text: &str, transform: F) -> String
where
    F: Fn(&str) -> String,
{
    let inline_done = INLINE_LINK.replace_all(text, |c: &Captures| {
        format!("{}{}", &c[1], transform(&c[2]))
    });

    let footnotes_done = FOOTNOTE_LINK_URL.replace_all(&inline_done, |c: &Captures| {
        format!("[{}]: {}", &c[1], transform(&c[2]))
    });

    footnotes_done.replace("**", "")
}

/// Label text only, with all link targets removed.
pub fn strip_links(text: &str) -> String {
    replace_links(text, |_| String::new())
}

/// Normal form used when comparing URLs across sources: no `www.` and no
/// known referral suffixes. Applied until nothing changes so that
/// `canonical_url(canonical_url(u)) == canonical_url(u)`.
pub fn canonical_url(url: &str) -> String {
    let mut current = url.to_string();
    loop {
        let mut next = current.replace("www.", "");
        for suffix in TRACKING_SUFFIXES {
            next = next.replace(suffix, "");
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_inline_links() {
        let links = find_links("[Apply](https://a.com/1) and [Docs](https://b.com)");
        assert_eq!(
            links.regular,
            vec![
                ("Apply".to_string(), "https://a.com/1".to_string()),
                ("Docs".to_string(), "https://b.com".to_string()),
            ]
        );
        assert!(links.footnotes.is_empty());
    }

    #[test]
    fn test_find_footnote_links() {
        let text = "See [the board][1] for more.\n\n[1]: https://board.example/jobs";
        let links = find_links(text);
        assert_eq!(
            links.footnotes,
            vec![("the board".to_string(), "https://board.example/jobs".to_string())]
        );
    }

    #[test]
    fn test_footnote_without_definition_is_omitted() {
        let links = find_links("See [the board][7].");
        assert!(links.footnotes.is_empty());
        assert!(links.regular.is_empty());
    }

    #[test]
    fn test_strip_links_leaves_label() {
        assert_eq!(strip_links("**[Acme Corp](https://acme.com)**"), "Acme Corp");
        assert_eq!(strip_links("Plain Co"), "Plain Co");
    }

    #[test]
    fn test_replace_links_transforms_urls() {
        let out = replace_links("[Acme](https://www.acme.com)", |u| format!(" <{}>", canonical_url(u)));
        assert_eq!(out, "Acme <https://acme.com>");

        let out = replace_links("x [1]: https://www.a.com", canonical_url);
        assert_eq!(out, "x [1]: https://a.com");
    }

    #[test]
    fn test_canonical_url_strips_www_and_tracking() {
        assert_eq!(
            canonical_url("https://www.jobs.example/123?utm_source=Simplify&ref=Simplify"),
            "https://jobs.example/123"
        );
        assert_eq!(
            canonical_url("https://jobs.example/123?gh_jid=9&utm_source=Simplify&ref=Simplify"),
            "https://jobs.example/123?gh_jid=9"
        );
    }

    #[test]
    fn test_canonical_url_is_idempotent() {
        let samples = [
            "https://www.example.com/a",
            "https://example.com/a?utm_source=Simplify&ref=Simplify",
            "https://wwwww.w.example.com",
            "https://x.com/?a=1&utm_source=Simplify&ref=Simplify&utm_source=Simplify&ref=Simplify",
            "",
        ];
        for url in samples {
            let once = canonical_url(url);
            assert_eq!(canonical_url(&once), once, "not idempotent for {url}");
        }
    }
}
