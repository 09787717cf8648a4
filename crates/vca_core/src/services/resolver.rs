//! Video URL resolution.
//!
//! Maps a user-supplied URL to its hosting platform and native video id.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::models::Platform;

/// Errors from URL resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Unsupported video URL: {0}")]
    Unsupported(String),

    #[error("URL is empty")]
    Empty,
}

/// A URL resolved to its platform and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub platform: Platform,
    pub video_id: String,
}

struct Patterns {
    youtube: Vec<Regex>,
    vimeo: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |list: &[&str]| -> Vec<Regex> {
            list.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };
        Patterns {
            youtube: compile(&[
                r"youtu\.be/([0-9A-Za-z_-]{11})",
                r"youtube\.com/embed/([0-9A-Za-z_-]{11})",
                r"youtube\.com/v/([0-9A-Za-z_-]{11})",
                r"youtube\.com/shorts/([0-9A-Za-z_-]{11})",
                r"[?&]v=([0-9A-Za-z_-]{11})",
            ]),
            vimeo: compile(&[
                r"player\.vimeo\.com/video/(\d+)",
                r"vimeo\.com/(?:channels/[^/]+/)?(\d+)",
            ]),
        }
    })
}

/// Resolve a YouTube or Vimeo URL.
///
/// Returns `UrlError::Unsupported` when no known pattern matches.
pub fn parse_video_url(url: &str) -> Result<ParsedUrl, UrlError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(UrlError::Empty);
    }

    let patterns = patterns();

    let (platform, candidates) = if url.contains("youtube.com") || url.contains("youtu.be") {
        (Platform::Youtube, &patterns.youtube)
    } else if url.contains("vimeo.com") {
        (Platform::Vimeo, &patterns.vimeo)
    } else {
        return Err(UrlError::Unsupported(url.to_string()));
    };

    candidates
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| ParsedUrl {
            platform,
            video_id: m.as_str().to_string(),
        })
        .ok_or_else(|| UrlError::Unsupported(url.to_string()))
}
