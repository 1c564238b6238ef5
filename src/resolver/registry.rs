// Engine registry - ordered fallback across engines
//
// Engines are tried in (priority, registration order). Each attempt is raced
// against an outer timeout; the first validated stream wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::errors::{EngineFailure, ResolveError};
use super::models::{MediaReference, StreamHandle, TrackInfo};
use super::stats::{EngineStats, EngineStatsSnapshot};
use super::traits::Engine;
use crate::config::RegistryConfig;

struct RegisteredEngine {
    engine: Arc<dyn Engine>,
    stats: Arc<EngineStats>,
}

/// Introspection view of one engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub name: String,
    pub priority: u32,
    pub initialized: bool,
    pub capabilities: Vec<String>,
    pub stats: EngineStatsSnapshot,
}

impl EngineStatus {
    pub fn success_rate(&self) -> Option<f64> {
        self.stats.success_rate()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub engines: Vec<EngineStatus>,
    pub initialized_engines: usize,
    pub active_streams: usize,
    pub max_streams: usize,
}

pub struct EngineRegistry {
    engines: Vec<RegisteredEngine>,
    permits: Arc<Semaphore>,
    max_streams: usize,
    engine_timeout: Duration,
}

impl EngineRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            engines: Vec::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_streams)),
            max_streams: config.max_concurrent_streams,
            engine_timeout: config.engine_timeout,
        }
    }

    /// Add an engine. Equal priorities keep registration order.
    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        tracing::debug!(
            engine = engine.name(),
            priority = engine.priority(),
            "engine registered"
        );
        self.engines.push(RegisteredEngine {
            engine,
            stats: Arc::new(EngineStats::new()),
        });
        // Stable sort, so ties stay in registration order
        self.engines.sort_by_key(|entry| entry.engine.priority());
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|entry| entry.engine.name()).collect()
    }

    /// Initialize every engine. Returns how many are usable.
    pub async fn initialize_all(&self) -> usize {
        let mut ready = 0;
        for entry in &self.engines {
            match entry.engine.initialize().await {
                Ok(()) => ready += 1,
                Err(err) => {
                    tracing::warn!(engine = entry.engine.name(), error = %err, "engine failed to initialize")
                }
            }
        }
        tracing::info!(ready, total = self.engines.len(), "engines initialized");
        ready
    }

    /// Recovery: zero the stats and run initialization again.
    pub async fn reinitialize(&self) -> usize {
        for entry in &self.engines {
            entry.stats.reset();
        }
        self.initialize_all().await
    }

    pub fn clear_all_caches(&self) {
        for entry in &self.engines {
            entry.engine.clear_cache();
        }
        tracing::info!("engine caches cleared");
    }

    pub fn active_streams(&self) -> usize {
        self.max_streams
            .saturating_sub(self.permits.available_permits())
    }

    pub fn max_streams(&self) -> usize {
        self.max_streams
    }

    pub fn engine_statuses(&self) -> Vec<EngineStatus> {
        self.engines
            .iter()
            .map(|entry| EngineStatus {
                name: entry.engine.name().to_string(),
                priority: entry.engine.priority(),
                initialized: entry.engine.is_initialized(),
                capabilities: entry
                    .engine
                    .capabilities()
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                stats: entry.stats.snapshot(),
            })
            .collect()
    }

    pub fn system_status(&self) -> SystemStatus {
        let engines = self.engine_statuses();
        SystemStatus {
            initialized_engines: engines.iter().filter(|e| e.initialized).count(),
            engines,
            active_streams: self.active_streams(),
            max_streams: self.max_streams,
        }
    }

    fn eligible<'a>(
        &'a self,
        reference: &'a MediaReference,
    ) -> impl Iterator<Item = &'a RegisteredEngine> + 'a {
        self.engines.iter().filter(move |entry| {
            entry.engine.is_initialized() && entry.engine.can_handle(reference)
        })
    }

    pub async fn resolve_stream(
        &self,
        reference: &MediaReference,
    ) -> Result<StreamHandle, ResolveError> {
        self.resolve_stream_with(reference, &CancellationToken::new())
            .await
    }

    /// Resolve with a caller-owned token; cancelling it abandons the current engine.
    pub async fn resolve_stream_with(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, ResolveError> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| ResolveError::CapacityExceeded {
                max: self.max_streams,
            })?;

        let mut failures = Vec::new();

        for entry in self.eligible(reference) {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            let name = entry.engine.name();
            entry.stats.record_attempt();
            let started = Instant::now();
            let attempt = cancel.child_token();

            tracing::debug!(engine = name, reference = %reference, "trying engine");
            let result = match tokio::time::timeout(
                self.engine_timeout,
                entry.engine.get_stream(reference, &attempt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    // The attempt future is already dropped; this reaches anything it spawned
                    attempt.cancel();
                    Err(ResolveError::EngineTimeout {
                        engine: name.to_string(),
                        timeout: self.engine_timeout,
                    })
                }
            };

            match result {
                Ok(found) => {
                    entry.stats.record_success(started.elapsed());
                    tracing::info!(
                        engine = name,
                        strategy = found.strategy,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "stream resolved"
                    );
                    return Ok(StreamHandle::new(name, found, Some(permit)));
                }
                Err(ResolveError::Cancelled) if cancel.is_cancelled() => {
                    entry.stats.record_failure();
                    return Err(ResolveError::Cancelled);
                }
                Err(error) => {
                    entry.stats.record_failure();
                    tracing::warn!(engine = name, error = %error, "engine failed");
                    failures.push(EngineFailure {
                        engine: name.to_string(),
                        error,
                    });
                }
            }
        }

        let err = ResolveError::AllEnginesFailed { failures };
        tracing::warn!(
            reference = %reference,
            diagnostics = %err.diagnostics(),
            "no playable source found"
        );
        Err(err)
    }

    /// Metadata from the first eligible engine that answers in time.
    pub async fn get_track_info(
        &self,
        reference: &MediaReference,
    ) -> Result<TrackInfo, ResolveError> {
        let mut last_error = None;
        for entry in self.eligible(reference) {
            let name = entry.engine.name();
            match tokio::time::timeout(self.engine_timeout, entry.engine.get_track_info(reference))
                .await
            {
                Ok(Ok(info)) => return Ok(info),
                Ok(Err(err)) => {
                    tracing::debug!(engine = name, error = %err, "no track info");
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::debug!(engine = name, "track info timed out");
                    last_error = Some(ResolveError::EngineTimeout {
                        engine: name.to_string(),
                        timeout: self.engine_timeout,
                    });
                }
            }
        }

        Err(ResolveError::NotAvailable {
            reference: reference.to_string(),
            reason: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no engine accepted this reference".to_string()),
        })
    }
}
