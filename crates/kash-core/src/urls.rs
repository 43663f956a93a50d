// SPDX-License-Identifier: MIT OR Apache-2.0
//! URL validation, normalization, and media-service canonicalization.
//!
//! Canonicalization is idempotent: media URLs are collapsed to one canonical
//! form per service, and all other URLs get basic normalization (lowercased
//! scheme/host, tracking parameters stripped, empty query/fragment dropped).

use tracing::debug;
use url::Url;

/// Query parameters that are tracking noise on any domain.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "igshid",
    "ref_src",
];

/// Returns true if the string parses as an http(s) or file URL.
#[must_use]
pub fn is_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => matches!(u.scheme(), "http" | "https" | "file"),
        Err(_) => false,
    }
}

/// Basic normalization: lowercase scheme and host, strip tracking
/// parameters, drop empty queries and fragments. Idempotent.
#[must_use]
pub fn normalize_url(url_str: &str) -> String {
    let Ok(mut url) = Url::parse(url_str) else {
        return url_str.to_string();
    };

    // Url::parse already lowercases scheme and host.
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &kept {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }
    url.set_fragment(None);

    let normalized = url.to_string();
    if normalized != url_str {
        debug!(target: "kash.urls", original = url_str, normalized = %normalized, "normalized URL");
    }
    normalized
}

/// Canonicalize a URL: media-service plugins win, otherwise basic
/// normalization. Idempotent.
#[must_use]
pub fn canonicalize_url(url_str: &str) -> String {
    match match_media_url(url_str) {
        Some(m) => m.canonical_url,
        None => normalize_url(url_str),
    }
}

// ---------------------------------------------------------------------------
// Media services
// ---------------------------------------------------------------------------

/// A recognized media URL: the canonical form plus the service's media id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMatch {
    /// Name of the matching service (e.g. `"youtube"`).
    pub service: &'static str,
    /// Canonical URL for the media.
    pub canonical_url: String,
    /// Service-specific media identifier.
    pub media_id: String,
}

/// A media-service plugin that recognizes URLs for one service.
pub trait MediaService: Send + Sync {
    /// Service name, used in item metadata.
    fn name(&self) -> &'static str;

    /// Return the canonical form and media id if the URL belongs to this
    /// service.
    fn canonicalize(&self, url: &Url) -> Option<MediaMatch>;
}

struct YouTube;

impl MediaService for YouTube {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn canonicalize(&self, url: &Url) -> Option<MediaMatch> {
        let host = url.host_str()?.trim_start_matches("www.");
        let media_id = match host {
            "youtube.com" | "m.youtube.com" => {
                if url.path() == "/watch" {
                    url.query_pairs()
                        .find(|(k, _)| k == "v")
                        .map(|(_, v)| v.into_owned())?
                } else if let Some(rest) = url.path().strip_prefix("/shorts/") {
                    rest.trim_matches('/').to_string()
                } else {
                    return None;
                }
            }
            "youtu.be" => url.path().trim_matches('/').to_string(),
            _ => return None,
        };
        if media_id.is_empty() {
            return None;
        }
        Some(MediaMatch {
            service: self.name(),
            canonical_url: format!("https://www.youtube.com/watch?v={media_id}"),
            media_id,
        })
    }
}

struct Vimeo;

impl MediaService for Vimeo {
    fn name(&self) -> &'static str {
        "vimeo"
    }

    fn canonicalize(&self, url: &Url) -> Option<MediaMatch> {
        let host = url.host_str()?.trim_start_matches("www.");
        if host != "vimeo.com" {
            return None;
        }
        let media_id = url.path().trim_matches('/').to_string();
        if media_id.is_empty() || !media_id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(MediaMatch {
            service: self.name(),
            canonical_url: format!("https://vimeo.com/{media_id}"),
            media_id,
        })
    }
}

struct ApplePodcasts;

impl MediaService for ApplePodcasts {
    fn name(&self) -> &'static str {
        "apple_podcasts"
    }

    fn canonicalize(&self, url: &Url) -> Option<MediaMatch> {
        let host = url.host_str()?;
        if host != "podcasts.apple.com" {
            return None;
        }
        // Paths look like /us/podcast/<slug>/id<number>.
        let media_id = url
            .path_segments()?
            .find_map(|seg| seg.strip_prefix("id"))
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))?
            .to_string();
        let episode = url
            .query_pairs()
            .find(|(k, _)| k == "i")
            .map(|(_, v)| v.into_owned());
        let canonical_url = match &episode {
            Some(i) => format!("https://podcasts.apple.com/podcast/id{media_id}?i={i}"),
            None => format!("https://podcasts.apple.com/podcast/id{media_id}"),
        };
        Some(MediaMatch {
            service: self.name(),
            canonical_url,
            media_id,
        })
    }
}

const MEDIA_SERVICES: &[&dyn MediaService] = &[&YouTube, &Vimeo, &ApplePodcasts];

/// Run the URL through the known media-service plugins; the first match wins.
#[must_use]
pub fn match_media_url(url_str: &str) -> Option<MediaMatch> {
    let url = Url::parse(url_str).ok()?;
    MEDIA_SERVICES.iter().find_map(|svc| svc.canonicalize(&url))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_url_accepts_web_and_file_schemes() {
        assert!(is_url("https://example.com/page"));
        assert!(is_url("http://example.com"));
        assert!(is_url("file:///tmp/x.txt"));
        assert!(!is_url("docs/file.md"));
        assert!(!is_url("not a url"));
        assert!(!is_url("mailto:someone@example.com"));
    }

    #[test]
    fn normalize_strips_tracking_params_and_fragment() {
        let url = "https://Example.COM/page?utm_source=x&id=3&fbclid=abc#section";
        assert_eq!(normalize_url(url), "https://example.com/page?id=3");
    }

    #[test]
    fn normalize_drops_empty_query() {
        assert_eq!(
            normalize_url("https://example.com/page?utm_source=x"),
            "https://example.com/page"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for url in [
            "https://Example.com/a?utm_campaign=z&q=1#frag",
            "https://www.youtube.com/watch?v=abc123&t=5",
            "https://youtu.be/abc123",
            "https://vimeo.com/12345?ref_src=share",
            "https://podcasts.apple.com/us/podcast/some-show/id987?i=111",
        ] {
            let once = canonicalize_url(url);
            assert_eq!(canonicalize_url(&once), once, "not idempotent for {url}");
        }
    }

    #[test]
    fn youtube_variants_collapse_to_watch_url() {
        let canonical = "https://www.youtube.com/watch?v=abc123";
        assert_eq!(canonicalize_url("https://youtu.be/abc123"), canonical);
        assert_eq!(
            canonicalize_url("https://www.youtube.com/watch?v=abc123&t=99"),
            canonical
        );
        assert_eq!(
            canonicalize_url("https://m.youtube.com/watch?v=abc123"),
            canonical
        );
        assert_eq!(
            canonicalize_url("https://www.youtube.com/shorts/abc123"),
            canonical
        );
    }

    #[test]
    fn media_match_reports_service_and_id() {
        let m = match_media_url("https://vimeo.com/4422").unwrap();
        assert_eq!(m.service, "vimeo");
        assert_eq!(m.media_id, "4422");

        let m = match_media_url("https://podcasts.apple.com/us/podcast/x/id987").unwrap();
        assert_eq!(m.service, "apple_podcasts");
        assert_eq!(m.media_id, "987");

        assert!(match_media_url("https://example.com/watch?v=1").is_none());
    }
}
