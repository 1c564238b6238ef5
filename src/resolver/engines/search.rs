// Free-text search engine: first YouTube hit for the query

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ytdlp::YOUTUBE_STRATEGIES;
use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::extractor::{track_from_json, Extractor};
use crate::resolver::method_cache::MethodCache;
use crate::resolver::models::{EngineStream, MediaReference, SourceKind, TrackInfo};
use crate::resolver::traits::Engine;
use crate::resolver::utils::search_content_id;

/// `ytsearch1:` target for a query
pub fn search_target(query: &str) -> String {
    format!("ytsearch1:{}", query.trim())
}

pub struct SearchEngine {
    extractor: Arc<Extractor>,
    cache: MethodCache,
    initialized: AtomicBool,
}

impl SearchEngine {
    pub fn new(config: &ResolverConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            extractor,
            cache: MethodCache::new(config.cache.ttl),
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Engine for SearchEngine {
    fn name(&self) -> &'static str {
        "search"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["search"]
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn can_handle(&self, reference: &MediaReference) -> bool {
        !reference.is_url() && !reference.as_str().is_empty()
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
                reason: "not a search query".to_string(),
            });
        }

        let target = search_target(reference.as_str());
        match self
            .extractor
            .fetch_metadata(&target, &CancellationToken::new())
            .await
        {
            Ok(json) => Ok(track_from_json(&json, SourceKind::YouTube, reference)),
            Err(err) => {
                tracing::debug!(engine = "search", error = %err, "metadata degraded");
                Ok(TrackInfo::degraded(
                    &search_content_id(reference.as_str()),
                    reference,
                    SourceKind::YouTube,
                ))
            }
        }
    }

    async fn get_stream(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        let target = search_target(reference.as_str());
        let content_id = search_content_id(reference.as_str());
        self.extractor
            .run_chain(
                self.name(),
                &target,
                &content_id,
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
