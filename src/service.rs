// MediaResolver - the inbound API used by the command/playback layer

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ResolverConfig;
use crate::health::{HealthEvent, HealthMonitor, HealthStatus, ResourceProbe, SysinfoProbe};
use crate::resolver::{
    default_engines, Engine, EngineRegistry, MediaReference, ResolveError, StreamHandle,
    SystemStatus, TrackInfo,
};

/// Condensed health view for status commands
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall: HealthStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub issues: Vec<String>,
    pub status: SystemStatus,
}

pub struct MediaResolver {
    registry: Arc<EngineRegistry>,
    monitor: Arc<HealthMonitor>,
    shutdown: CancellationToken,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl MediaResolver {
    /// Stock engines, initialized. Engines whose tools are missing stay registered but unused.
    pub async fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let engines = default_engines(&config)?;
        Ok(Self::with_engines(config, engines).await)
    }

    pub async fn with_engines(config: ResolverConfig, engines: Vec<Arc<dyn Engine>>) -> Self {
        let mut registry = EngineRegistry::new(&config.registry);
        for engine in engines {
            registry.register(engine);
        }
        registry.initialize_all().await;
        Self::with_registry(config, Arc::new(registry), Arc::new(SysinfoProbe::new()))
    }

    /// Wrap an already initialized registry.
    pub fn with_registry(
        config: ResolverConfig,
        registry: Arc<EngineRegistry>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            probe,
            config.health.clone(),
        ));
        Self {
            registry,
            monitor,
            shutdown: CancellationToken::new(),
            monitor_task: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub async fn resolve_stream(
        &self,
        reference: impl Into<MediaReference>,
    ) -> Result<StreamHandle, ResolveError> {
        let reference = reference.into();
        self.registry
            .resolve_stream_with(&reference, &self.shutdown)
            .await
    }

    pub async fn get_track_info(
        &self,
        reference: impl Into<MediaReference>,
    ) -> Result<TrackInfo, ResolveError> {
        self.registry.get_track_info(&reference.into()).await
    }

    pub fn system_status(&self) -> SystemStatus {
        self.registry.system_status()
    }

    /// Latest report, or a fresh check when the monitor has not run yet
    pub fn health_summary(&self) -> HealthSummary {
        let report = self
            .monitor
            .latest_report()
            .unwrap_or_else(|| self.monitor.check_now());
        HealthSummary {
            overall: report.overall,
            checked_at: report.timestamp,
            issues: report.issues.clone(),
            status: self.registry.system_status(),
        }
    }

    /// Start the periodic monitor. Returns false when it is already running.
    pub fn start_health_monitor(&self) -> bool {
        let mut task = self.monitor_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *task = Some(self.monitor.start(self.shutdown.child_token()));
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.monitor.subscribe()
    }

    /// Stop the monitor and abandon in-flight resolutions.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "health monitor task ended abnormally");
            }
        }
        tracing::info!("resolver shut down");
    }
}
