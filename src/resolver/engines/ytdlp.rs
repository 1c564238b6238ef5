// yt-dlp backed engines for YouTube and SoundCloud URLs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::extractor::{track_from_json, Extractor, Strategy};
use crate::resolver::method_cache::MethodCache;
use crate::resolver::models::{EngineStream, MediaReference, SourceKind, TrackInfo};
use crate::resolver::traits::Engine;
use crate::resolver::utils::{host_matches, soundcloud_track_path, youtube_video_id};

/// Full chain for platforms that hand out signed media URLs
pub const YOUTUBE_STRATEGIES: &[Strategy] =
    &[Strategy::DirectUrl, Strategy::PipeStdout, Strategy::TempFile];

const SOUNDCLOUD_STRATEGIES: &[Strategy] = &[Strategy::PipeStdout, Strategy::TempFile];

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];
const SOUNDCLOUD_HOSTS: &[&str] = &["soundcloud.com"];

pub struct YtDlpEngine {
    name: &'static str,
    priority: u32,
    capabilities: &'static [&'static str],
    hosts: &'static [&'static str],
    source_kind: SourceKind,
    strategies: &'static [Strategy],
    extractor: Arc<Extractor>,
    cache: MethodCache,
    initialized: AtomicBool,
}

impl YtDlpEngine {
    pub fn youtube(config: &ResolverConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            name: "youtube",
            priority: 10,
            capabilities: &["youtube"],
            hosts: YOUTUBE_HOSTS,
            source_kind: SourceKind::YouTube,
            strategies: YOUTUBE_STRATEGIES,
            extractor,
            cache: MethodCache::new(config.cache.ttl),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn soundcloud(config: &ResolverConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            name: "soundcloud",
            priority: 20,
            capabilities: &["soundcloud"],
            hosts: SOUNDCLOUD_HOSTS,
            source_kind: SourceKind::SoundCloud,
            strategies: SOUNDCLOUD_STRATEGIES,
            extractor,
            cache: MethodCache::new(config.cache.ttl),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn strategies(&self) -> &'static [Strategy] {
        self.strategies
    }

    fn content_id(&self, reference: &MediaReference) -> String {
        let id = match self.source_kind {
            SourceKind::YouTube => youtube_video_id(reference.as_str()),
            SourceKind::SoundCloud => soundcloud_track_path(reference.as_str()),
            _ => None,
        };
        id.unwrap_or_else(|| reference.as_str().to_string())
    }
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn capabilities(&self) -> &'static [&'static str] {
        self.capabilities
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn can_handle(&self, reference: &MediaReference) -> bool {
        reference
            .host()
            .is_some_and(|host| self.hosts.iter().any(|domain| host_matches(&host, domain)))
    }

    async fn initialize(&self) -> Result<(), ResolveError> {
        let result = self.extractor.initialize().await;
        self.initialized.store(result.is_ok(), Ordering::Release);
        match &result {
            Ok(()) => tracing::info!(engine = self.name, "engine initialized"),
            Err(err) => tracing::warn!(engine = self.name, error = %err, "engine unavailable"),
        }
        result
    }

    async fn get_track_info(&self, reference: &MediaReference) -> Result<TrackInfo, ResolveError> {
        if !self.can_handle(reference) {
            return Err(ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: format!("not a {} reference", self.name),
            });
        }

        let content_id = self.content_id(reference);
        match self
            .extractor
            .fetch_metadata(reference.as_str(), &CancellationToken::new())
            .await
        {
            Ok(json) => Ok(track_from_json(&json, self.source_kind, reference)),
            Err(err) => {
                tracing::debug!(engine = self.name, error = %err, "metadata degraded");
                Ok(TrackInfo::degraded(&content_id, reference, self.source_kind))
            }
        }
    }

    async fn get_stream(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        let content_id = self.content_id(reference);
        self.extractor
            .run_chain(
                self.name,
                reference.as_str(),
                &content_id,
                self.strategies,
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

    #[test]
    fn test_youtube_handles_youtube_hosts_only() {
        let engine = YtDlpEngine::youtube(&ResolverConfig::default(), extractor_for_tests(None));
        assert!(engine.can_handle(&"https://www.youtube.com/watch?v=dQw4w9WgXcQ".into()));
        assert!(engine.can_handle(&"https://youtu.be/dQw4w9WgXcQ".into()));
        assert!(engine.can_handle(&"https://music.youtube.com/watch?v=dQw4w9WgXcQ".into()));
        assert!(!engine.can_handle(&"https://soundcloud.com/a/b".into()));
        assert!(!engine.can_handle(&"never gonna give you up".into()));
    }

    #[test]
    fn test_soundcloud_chain_has_no_direct_url() {
        let engine = YtDlpEngine::soundcloud(&ResolverConfig::default(), extractor_for_tests(None));
        assert!(engine.can_handle(&"https://soundcloud.com/artist/track".into()));
        assert!(!engine.strategies().contains(&Strategy::DirectUrl));
        assert_eq!(engine.priority(), 20);
    }

    #[test]
    fn test_content_id_uses_video_id() {
        let engine = YtDlpEngine::youtube(&ResolverConfig::default(), extractor_for_tests(None));
        let a = engine.content_id(&"https://youtu.be/dQw4w9WgXcQ".into());
        let b = engine.content_id(&"https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3".into());
        assert_eq!(a, "dQw4w9WgXcQ");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_foreign_reference_has_no_track_info() {
        let engine = YtDlpEngine::youtube(&ResolverConfig::default(), extractor_for_tests(None));
        let err = engine
            .get_track_info(&"https://example.com/song.mp3".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotAvailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_metadata_degrades() {
        let engine = YtDlpEngine::youtube(
            &ResolverConfig::default(),
            extractor_for_tests(Some(CommandSpec::new("sh").args(["-c", "echo not-json", "yt-dlp"]))),
        );

        let reference = MediaReference::new("https://youtu.be/dQw4w9WgXcQ");
        let info = engine.get_track_info(&reference).await.unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.duration_seconds, 0);
        assert_eq!(info.source_kind, SourceKind::YouTube);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_initialize_with_fixed_command() {
        let engine = YtDlpEngine::soundcloud(
            &ResolverConfig::default(),
            extractor_for_tests(Some(CommandSpec::new("sh").args(["-c", "true", "yt-dlp"]))),
        );
        assert!(!engine.is_initialized());
        engine.initialize().await.unwrap();
        assert!(engine.is_initialized());
    }
}
