//! Multi-format link extraction from listing responses.
//!
//! A monitored location may answer with JSON, HTML, or plain text. This
//! module turns whatever came back into a deduplicated, order-preserving
//! list of absolute candidate URLs. Individual malformed entries are
//! silently dropped — extraction never fails because of one bad candidate,
//! only the surrounding fetch can fail.

use crate::utils::extension_of;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Wrapper keys under which a JSON listing may nest its entry array
const WRAPPER_KEYS: &[&str] = &["files", "urls", "links", "items", "data"];

/// Reference fields of a JSON entry object, checked in priority order
const REFERENCE_FIELDS: &[&str] = &["url", "href", "link", "file", "download_url", "path"];

/// Body representation declared by the listing response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// Structured list data (`application/json` and friends)
    Json,
    /// Hypertext (`text/html`) — also the fallback for unknown types
    Html,
    /// One candidate per non-empty line (`text/plain`)
    Text,
}

impl ContentKind {
    /// Classify a declared media type, ignoring parameters
    ///
    /// Unrecognized types fall back to [`ContentKind::Html`]: a hypertext
    /// scan of arbitrary bytes yields nothing rather than an error, which is
    /// the best-effort behavior we want for mislabeled listings.
    pub fn from_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or(media_type)
            .trim()
            .to_lowercase();

        if essence.ends_with("json") {
            ContentKind::Json
        } else if essence == "text/plain" {
            ContentKind::Text
        } else {
            ContentKind::Html
        }
    }
}

/// Extracts candidate file URLs from listing bodies
///
/// Holds the supported-extension set used for candidate validation; cheap to
/// construct and stateless across calls, so extraction is idempotent.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    supported_extensions: Vec<String>,
}

impl LinkExtractor {
    /// Create an extractor validating against the given extension set
    /// (lowercase, without dots)
    pub fn new(supported_extensions: Vec<String>) -> Self {
        Self {
            supported_extensions,
        }
    }

    /// Extract candidate URLs from a listing body
    ///
    /// Returns absolute `http`/`https` URLs, deduplicated, in first-occurrence
    /// order. Candidates whose path carries an extension outside the
    /// supported set are dropped; extension-less candidates pass (they cover
    /// API-style endpoints without file suffixes).
    pub fn extract(&self, body: &str, kind: ContentKind, base_url: &Url) -> Vec<String> {
        let raw_candidates = match kind {
            ContentKind::Json => match Self::candidates_from_json(body) {
                Some(candidates) => candidates,
                None => {
                    // Mislabeled listing: attempt the hypertext scan instead
                    debug!("Listing declared JSON but did not parse, falling back to HTML scan");
                    Self::candidates_from_html(body)
                }
            },
            ContentKind::Html => Self::candidates_from_html(body),
            ContentKind::Text => Self::candidates_from_text(body),
        };

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for raw in raw_candidates {
            let Some(valid) = self.validate(&raw, base_url) else {
                continue;
            };
            if seen.insert(valid.clone()) {
                result.push(valid);
            }
        }
        result
    }

    /// Pull raw candidate strings out of a JSON body
    ///
    /// Accepts a flat array, or an array nested under the first recognized
    /// wrapper key. Entries may be plain strings or objects exposing one of
    /// the reference fields; anything else is dropped.
    fn candidates_from_json(body: &str) -> Option<Vec<String>> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;

        let entries = match &value {
            serde_json::Value::Array(entries) => entries.as_slice(),
            serde_json::Value::Object(map) => WRAPPER_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_array()))
                .map(|a| a.as_slice())?,
            _ => return None,
        };

        let candidates = entries
            .iter()
            .filter_map(|entry| match entry {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(fields) => REFERENCE_FIELDS
                    .iter()
                    .find_map(|field| fields.get(*field).and_then(|v| v.as_str()))
                    .map(|s| s.to_string()),
                _ => None,
            })
            .collect();

        Some(candidates)
    }

    /// Scan hypertext for hyperlink and image-source attributes
    fn candidates_from_html(body: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        let mut candidates = Vec::new();

        // Both selectors are statically valid; parse cannot fail on them
        for (selector, attr) in [("a[href]", "href"), ("img[src]", "src")] {
            let Ok(selector) = Selector::parse(selector) else {
                continue;
            };
            for element in document.select(&selector) {
                if let Some(value) = element.value().attr(attr) {
                    candidates.push(value.to_string());
                }
            }
        }

        candidates
    }

    /// Treat each non-empty line as one candidate
    fn candidates_from_text(body: &str) -> Vec<String> {
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Resolve a raw candidate against the listing URL and validate it
    ///
    /// Returns the absolute URL string, or None when the candidate is
    /// malformed, uses a non-http scheme, or carries an unsupported
    /// extension.
    fn validate(&self, raw: &str, base_url: &Url) -> Option<String> {
        let resolved = base_url.join(raw).ok()?;

        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }

        if let Some(last_segment) = resolved.path_segments().and_then(|mut s| s.next_back())
            && let Some(ext) = extension_of(last_segment)
            && !self
                .supported_extensions
                .iter()
                .any(|supported| *supported == ext)
        {
            return None;
        }

        Some(resolved.to_string())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(vec![
            "pdf".into(),
            "zip".into(),
            "csv".into(),
            "txt".into(),
        ])
    }

    fn base() -> Url {
        Url::parse("http://example.com/listing").unwrap()
    }

    #[test]
    fn content_kind_classification() {
        assert_eq!(
            ContentKind::from_media_type("application/json"),
            ContentKind::Json
        );
        assert_eq!(
            ContentKind::from_media_type("application/vnd.api+json; charset=utf-8"),
            ContentKind::Json
        );
        assert_eq!(ContentKind::from_media_type("text/plain"), ContentKind::Text);
        assert_eq!(ContentKind::from_media_type("text/html"), ContentKind::Html);
        // Unknown types fall back to hypertext
        assert_eq!(
            ContentKind::from_media_type("application/octet-stream"),
            ContentKind::Html
        );
    }

    #[test]
    fn json_flat_array_of_strings() {
        let body = r#"["http://example.com/a.pdf", "http://example.com/b.zip"]"#;
        let urls = extractor().extract(body, ContentKind::Json, &base());
        assert_eq!(
            urls,
            vec!["http://example.com/a.pdf", "http://example.com/b.zip"]
        );
    }

    #[test]
    fn json_dedup_and_unsupported_extension_drop() {
        // The canonical scenario: duplicate entry plus an unsupported .exe
        let body = r#"["http://example.com/a.pdf", "http://example.com/a.pdf", "http://example.com/b.exe"]"#;
        let urls = extractor().extract(body, ContentKind::Json, &base());
        assert_eq!(urls, vec!["http://example.com/a.pdf"]);
    }

    #[test]
    fn json_array_under_wrapper_key() {
        for key in ["files", "urls", "links", "items", "data"] {
            let body = format!(r#"{{"{key}": ["http://example.com/a.pdf"]}}"#);
            let urls = extractor().extract(&body, ContentKind::Json, &base());
            assert_eq!(urls, vec!["http://example.com/a.pdf"], "wrapper key {key}");
        }
    }

    #[test]
    fn json_object_entries_use_field_priority() {
        // "url" outranks "href" when both are present
        let body = r#"[
            {"href": "http://example.com/second.pdf", "url": "http://example.com/first.pdf"},
            {"link": "http://example.com/third.pdf"},
            {"download_url": "http://example.com/fourth.pdf"}
        ]"#;
        let urls = extractor().extract(body, ContentKind::Json, &base());
        assert_eq!(
            urls,
            vec![
                "http://example.com/first.pdf",
                "http://example.com/third.pdf",
                "http://example.com/fourth.pdf"
            ]
        );
    }

    #[test]
    fn json_non_reference_entries_are_dropped_silently() {
        let body = r#"["http://example.com/a.pdf", 42, true, null, {"name": "no ref here"}]"#;
        let urls = extractor().extract(body, ContentKind::Json, &base());
        assert_eq!(urls, vec!["http://example.com/a.pdf"]);
    }

    #[test]
    fn json_unparseable_body_falls_back_to_html_scan() {
        let body = r#"not json at all <a href="http://example.com/a.pdf">a</a>"#;
        let urls = extractor().extract(body, ContentKind::Json, &base());
        assert_eq!(urls, vec!["http://example.com/a.pdf"]);
    }

    #[test]
    fn html_extracts_anchors_and_image_sources() {
        let body = r#"
            <html><body>
                <a href="http://example.com/report.pdf">report</a>
                <a href="/relative/data.csv">data</a>
                <img src="chart.png">
                <a>no href</a>
            </body></html>
        "#;
        let extractor = LinkExtractor::new(vec!["pdf".into(), "csv".into(), "png".into()]);
        let urls = extractor.extract(body, ContentKind::Html, &base());
        assert_eq!(
            urls,
            vec![
                "http://example.com/report.pdf",
                "http://example.com/relative/data.csv",
                "http://example.com/chart.png",
            ]
        );
    }

    #[test]
    fn html_relative_resolution_respects_base_path() {
        let base = Url::parse("http://example.com/dir/listing.html").unwrap();
        let body = r#"<a href="file.pdf">f</a>"#;
        let urls = extractor().extract(body, ContentKind::Html, &base);
        assert_eq!(urls, vec!["http://example.com/dir/file.pdf"]);
    }

    #[test]
    fn text_one_candidate_per_nonempty_line() {
        let body = "http://example.com/a.pdf\n\n  http://example.com/b.zip  \n\n";
        let urls = extractor().extract(body, ContentKind::Text, &base());
        assert_eq!(
            urls,
            vec!["http://example.com/a.pdf", "http://example.com/b.zip"]
        );
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let body = "ftp://example.com/a.pdf\nfile:///etc/passwd\nhttp://example.com/ok.pdf";
        let urls = extractor().extract(body, ContentKind::Text, &base());
        assert_eq!(urls, vec!["http://example.com/ok.pdf"]);
    }

    #[test]
    fn extensionless_candidates_are_accepted() {
        let body = "http://example.com/api/export\nhttp://example.com/blocked.exe";
        let urls = extractor().extract(body, ContentKind::Text, &base());
        assert_eq!(urls, vec!["http://example.com/api/export"]);
    }

    #[test]
    fn query_strings_do_not_hide_extensions() {
        let body = "http://example.com/a.exe?disguise=.pdf";
        let urls = extractor().extract(body, ContentKind::Text, &base());
        assert!(urls.is_empty(), "extension comes from the path, not the query");
    }

    #[test]
    fn extraction_is_idempotent() {
        let body = r#"
            <a href="b.pdf">b</a>
            <a href="a.pdf">a</a>
            <a href="b.pdf">b again</a>
        "#;
        let extractor = extractor();
        let first = extractor.extract(body, ContentKind::Html, &base());
        let second = extractor.extract(body, ContentKind::Html, &base());
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec!["http://example.com/b.pdf", "http://example.com/a.pdf"]
        );
    }

    #[test]
    fn empty_bodies_yield_no_candidates() {
        let ex = extractor();
        assert!(ex.extract("", ContentKind::Text, &base()).is_empty());
        assert!(ex.extract("", ContentKind::Html, &base()).is_empty());
        assert!(ex.extract("{}", ContentKind::Json, &base()).is_empty());
    }
}
