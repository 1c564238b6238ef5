// Helper functions shared by engines and strategies

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ExtractorConfig;

lazy_static! {
    static ref YOUTUBE_ID: Regex = Regex::new(
        r"(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/|shorts/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})"
    )
    .expect("valid youtube id regex");
    static ref SOUNDCLOUD_PATH: Regex =
        Regex::new(r"soundcloud\.com/([A-Za-z0-9_-]+/[A-Za-z0-9_-]+)").expect("valid soundcloud regex");
    static ref SPOTIFY_TRACK: Regex =
        Regex::new(r"open\.spotify\.com/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)")
            .expect("valid spotify regex");
}

/// 11-character video id from any common YouTube URL shape
pub fn youtube_video_id(url: &str) -> Option<String> {
    YOUTUBE_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `artist/track` slug of a SoundCloud track URL
pub fn soundcloud_track_path(url: &str) -> Option<String> {
    SOUNDCLOUD_PATH
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

pub fn spotify_track_id(url: &str) -> Option<String> {
    SPOTIFY_TRACK
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `host` is `domain` or one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Cache key for a free-text search: normalized whitespace and case
pub fn search_content_id(query: &str) -> String {
    let normalized = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("search:{}", normalized)
}

/// Last `max` bytes of `text`, cut on a char boundary
pub fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

/// HTTP client shared by the in-process streaming strategies.
///
/// Only the connect phase is bounded here; body reads run for the lifetime
/// of the stream and are bounded by validation and the caller instead.
pub fn build_http_client(
    config: &ExtractorConfig,
    connect_timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("stream-resolver/", env!("CARGO_PKG_VERSION")));

    if let Some(proxy_url) = config.proxy.as_deref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Build proxy arguments for yt-dlp
pub fn proxy_args(config: &ExtractorConfig) -> Vec<String> {
    match &config.proxy {
        Some(proxy) => vec!["--proxy".to_string(), proxy.clone()],
        None => Vec::new(),
    }
}

/// Build cookie arguments for yt-dlp
pub fn cookie_args(config: &ExtractorConfig) -> Vec<String> {
    if let Some(path) = &config.cookies_path {
        vec!["--cookies".to_string(), path.clone()]
    } else if config.cookies_from_browser {
        vec!["--cookies-from-browser".to_string(), "chrome".to_string()]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_id_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?list=PL1&v=dQw4w9WgXcQ&t=10",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
        ] {
            assert_eq!(youtube_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{url}");
        }
        assert_eq!(youtube_video_id("https://www.youtube.com/channel/UC123"), None);
    }

    #[test]
    fn test_soundcloud_and_spotify_ids() {
        assert_eq!(
            soundcloud_track_path("https://soundcloud.com/Artist-Name/some-track?in=x").as_deref(),
            Some("artist-name/some-track")
        );
        assert_eq!(
            spotify_track_id("https://open.spotify.com/intl-de/track/4uLU6hMCjMI75M1A2tKUQC?si=1")
                .as_deref(),
            Some("4uLU6hMCjMI75M1A2tKUQC")
        );
    }

    #[test]
    fn test_host_matches() {
        assert!(host_matches("youtube.com", "youtube.com"));
        assert!(host_matches("music.youtube.com", "youtube.com"));
        assert!(!host_matches("notyoutube.com", "youtube.com"));
    }

    #[test]
    fn test_search_content_id_normalizes() {
        assert_eq!(search_content_id("  Lofi   Beats "), "search:lofi beats");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        let cut = tail("ééé", 3);
        assert_eq!(cut, "é");
    }

    #[test]
    fn test_extractor_args() {
        let config = ExtractorConfig::default()
            .with_proxy(Some("socks5h://127.0.0.1:1080".to_string()))
            .with_cookies_from_browser(true);
        assert_eq!(proxy_args(&config), vec!["--proxy", "socks5h://127.0.0.1:1080"]);
        assert_eq!(cookie_args(&config), vec!["--cookies-from-browser", "chrome"]);
        assert!(cookie_args(&ExtractorConfig::default()).is_empty());
    }
}
