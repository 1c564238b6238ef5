// Direct engine: plain HTTP(S) links to audio files

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::extractor::{Extractor, Strategy};
use crate::resolver::method_cache::MethodCache;
use crate::resolver::models::{EngineStream, MediaReference, SourceKind, TrackInfo};
use crate::resolver::traits::Engine;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "oga", "opus", "flac", "wav", "webm", "weba",
];

const DIRECT_STRATEGIES: &[Strategy] = &[Strategy::HttpStream];

pub struct DirectEngine {
    extractor: Arc<Extractor>,
    cache: MethodCache,
    initialized: AtomicBool,
}

impl DirectEngine {
    pub fn new(config: &ResolverConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            extractor,
            cache: MethodCache::new(config.cache.ttl),
            initialized: AtomicBool::new(false),
        }
    }
}

/// Map ffprobe `-show_format` output onto track info
fn track_from_probe(
    json: &serde_json::Value,
    reference: &MediaReference,
) -> TrackInfo {
    let mut info = TrackInfo::degraded(reference.as_str(), reference, SourceKind::Direct);
    let format = &json["format"];
    let tag = |key: &str| {
        format["tags"][key]
            .as_str()
            .or_else(|| format["tags"][key.to_uppercase().as_str()].as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string())
    };

    if let Some(title) = tag("title") {
        info.title = title;
    }
    if let Some(artist) = tag("artist") {
        info.author = artist;
    }
    // ffprobe reports duration as a decimal string
    if let Some(duration) = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
    {
        info.duration_seconds = duration.max(0.0) as u64;
    }
    info
}

#[async_trait]
impl Engine for DirectEngine {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["direct"]
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn can_handle(&self, reference: &MediaReference) -> bool {
        if !reference.is_url() {
            return false;
        }
        let path = reference.path().to_lowercase();
        path.rsplit_once('.')
            .is_some_and(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext))
    }

    async fn initialize(&self) -> Result<(), ResolveError> {
        // Streaming needs nothing external; ffprobe only improves metadata
        if !self.extractor.initialize_probe().await {
            tracing::warn!(engine = "direct", "ffprobe not found, metadata will be degraded");
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn get_track_info(&self, reference: &MediaReference) -> Result<TrackInfo, ResolveError> {
        if !self.can_handle(reference) {
            return Err(ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: "not a direct audio URL".to_string(),
            });
        }

        match self
            .extractor
            .probe_metadata(reference.as_str(), &CancellationToken::new())
            .await
        {
            Ok(json) => Ok(track_from_probe(&json, reference)),
            Err(err) => {
                tracing::debug!(engine = "direct", error = %err, "metadata degraded");
                Ok(TrackInfo::degraded(
                    reference.as_str(),
                    reference,
                    SourceKind::Direct,
                ))
            }
        }
    }

    async fn get_stream(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        self.extractor
            .run_chain(
                self.name(),
                reference.as_str(),
                reference.as_str(),
                DIRECT_STRATEGIES,
                &self.cache,
                cancel,
            )
            .await
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
