// Spotify engine
//
// Spotify audio is DRM protected, so only the track title is read from the
// public oEmbed endpoint. The audio itself is resolved through a YouTube
// search for that title.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::search::search_target;
use super::ytdlp::YOUTUBE_STRATEGIES;
use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::extractor::Extractor;
use crate::resolver::method_cache::MethodCache;
use crate::resolver::models::{EngineStream, MediaReference, SourceKind, TrackInfo};
use crate::resolver::traits::Engine;
use crate::resolver::utils::{host_matches, spotify_track_id};

pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://open.spotify.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    thumbnail_url: Option<String>,
}

pub struct SpotifyEngine {
    extractor: Arc<Extractor>,
    cache: MethodCache,
    oembed_endpoint: String,
    initialized: AtomicBool,
}

impl SpotifyEngine {
    pub fn new(config: &ResolverConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            extractor,
            cache: MethodCache::new(config.cache.ttl),
            oembed_endpoint: DEFAULT_OEMBED_ENDPOINT.to_string(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_oembed_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.oembed_endpoint = endpoint.into();
        self
    }

    fn content_id(reference: &MediaReference) -> String {
        let id = spotify_track_id(reference.as_str()).unwrap_or_else(|| reference.to_string());
        format!("spotify:{}", id)
    }

    async fn fetch_oembed(&self, reference: &MediaReference) -> Result<OEmbed, ResolveError> {
        let response = self
            .extractor
            .http_client()
            .get(&self.oembed_endpoint)
            .query(&[("url", reference.as_str())])
            .timeout(self.extractor.timeouts().metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: format!("oEmbed returned HTTP {}", status),
            });
        }
        Ok(response.json::<OEmbed>().await?)
    }

    async fn title(&self, reference: &MediaReference) -> Result<String, ResolveError> {
        let oembed = self.fetch_oembed(reference).await?;
        oembed
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .ok_or_else(|| ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: "oEmbed response has no title".to_string(),
            })
    }
}

#[async_trait]
impl Engine for SpotifyEngine {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["spotify", "search"]
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn can_handle(&self, reference: &MediaReference) -> bool {
        reference
            .host()
            .is_some_and(|host| host_matches(&host, "open.spotify.com"))
            && reference.path().contains("/track/")
    }

    async fn initialize(&self) -> Result<(), ResolveError> {
        let result = self.extractor.initialize().await;
        self.initialized.store(result.is_ok(), Ordering::Release);
        result
    }

    async fn get_track_info(&self, reference: &MediaReference) -> Result<TrackInfo, ResolveError> {
        if !self.can_handle(reference) {
            return Err(ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: "not a Spotify track".to_string(),
            });
        }

        let id = spotify_track_id(reference.as_str()).unwrap_or_default();
        match self.fetch_oembed(reference).await {
            Ok(OEmbed {
                title: Some(title),
                thumbnail_url,
            }) => Ok(TrackInfo {
                id,
                title,
                author: "Unknown".to_string(),
                duration_seconds: 0,
                source_kind: SourceKind::Spotify,
                thumbnail_url,
                origin_url: reference.to_string(),
            }),
            Ok(_) => Ok(TrackInfo::degraded(&id, reference, SourceKind::Spotify)),
            Err(err) => {
                tracing::debug!(engine = "spotify", error = %err, "metadata degraded");
                Ok(TrackInfo::degraded(&id, reference, SourceKind::Spotify))
            }
        }
    }

    async fn get_stream(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        let title = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            title = self.title(reference) => title,
        };
        let title = title.map_err(|err| ResolveError::ExtractionFailed {
            engine: self.name().to_string(),
            attempted: 0,
            last_error: Box::new(err),
        })?;

        tracing::debug!(engine = "spotify", %title, "searching for Spotify track");
        self.extractor
            .run_chain(
                self.name(),
                &search_target(&title),
                &Self::content_id(reference),
                YOUTUBE_STRATEGIES,
                &self.cache,
                cancel,
            )
            .await
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::engines::extractor_for_tests;
    use crate::resolver::process::CommandSpec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TRACK: &str = "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC";

    async fn oembed_server(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("url", TRACK))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn engine_with(server: &MockServer, command: Option<CommandSpec>) -> SpotifyEngine {
        SpotifyEngine::new(&ResolverConfig::default(), extractor_for_tests(command))
            .with_oembed_endpoint(format!("{}/oembed", server.uri()))
    }

    fn engine(server: &MockServer) -> SpotifyEngine {
        engine_with(server, None)
    }

    #[test]
    fn test_handles_track_urls_only() {
        let engine = SpotifyEngine::new(&ResolverConfig::default(), extractor_for_tests(None));
        assert!(engine.can_handle(&TRACK.into()));
        assert!(!engine.can_handle(&"https://open.spotify.com/playlist/37i9dQZF1DX".into()));
        assert!(!engine.can_handle(&"spotify song title".into()));
    }

    #[tokio::test]
    async fn test_track_info_from_oembed() {
        let server = oembed_server(
            200,
            serde_json::json!({
                "title": "Never Gonna Give You Up",
                "thumbnail_url": "https://i.scdn.co/image/abc"
            }),
        )
        .await;

        let info = engine(&server).get_track_info(&TRACK.into()).await.unwrap();
        assert_eq!(info.id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(info.title, "Never Gonna Give You Up");
        assert_eq!(info.source_kind, SourceKind::Spotify);
        assert_eq!(info.thumbnail_url.as_deref(), Some("https://i.scdn.co/image/abc"));
    }

    #[tokio::test]
    async fn test_oembed_failure_degrades_info_and_fails_stream() {
        let server = oembed_server(404, serde_json::json!({})).await;
        let engine = engine(&server);

        let info = engine.get_track_info(&TRACK.into()).await.unwrap();
        assert_eq!(info.title, "4uLU6hMCjMI75M1A2tKUQC");

        let err = engine
            .get_stream(&TRACK.into(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ResolveError::ExtractionFailed {
                attempted,
                last_error,
                ..
            } => {
                assert_eq!(attempted, 0);
                assert!(last_error.to_string().contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_searches_for_title() {
        use futures_util::StreamExt;

        let server =
            oembed_server(200, serde_json::json!({ "title": "Never Gonna Give You Up" })).await;
        let script = r#"case "$*" in *" -o - "*) printf '%s' "$*";; *) exit 1;; esac"#;
        let engine = engine_with(
            &server,
            Some(CommandSpec::new("sh").args(["-c", script, "yt-dlp"])),
        );

        let found = engine
            .get_stream(&TRACK.into(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.content_id, "spotify:4uLU6hMCjMI75M1A2tKUQC");

        let echoed: Vec<u8> = found
            .stream
            .map(|chunk| chunk.unwrap().to_vec())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert!(String::from_utf8_lossy(&echoed).ends_with("ytsearch1:Never Gonna Give You Up"));
    }
}
