// Periodic health monitor with bounded auto-recovery

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::checks::{evaluate, plan_recovery, HealthReport, HealthStatus, RecoveryAction, SystemSnapshot};
use super::probe::ResourceProbe;
use crate::config::HealthConfig;
use crate::resolver::EngineRegistry;

const EVENT_CAPACITY: usize = 32;

/// Observable monitor output
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// A check cycle produced a non-healthy report
    Alert {
        overall: HealthStatus,
        issues: Vec<String>,
    },
    /// Recovery actions that were just executed
    Recovery { actions: Vec<RecoveryAction> },
    /// Result of the single check that follows a recovery
    FollowUp {
        overall: HealthStatus,
        improved: bool,
    },
}

pub struct HealthMonitor {
    registry: Arc<EngineRegistry>,
    probe: Arc<dyn ResourceProbe>,
    config: HealthConfig,
    latest: RwLock<Option<Arc<HealthReport>>>,
    events: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<EngineRegistry>,
        probe: Arc<dyn ResourceProbe>,
        config: HealthConfig,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            probe,
            config,
            latest: RwLock::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Most recent report; older ones are not kept
    pub fn latest_report(&self) -> Option<Arc<HealthReport>> {
        self.latest.read().clone()
    }

    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            engines: self.registry.engine_statuses(),
            active_streams: self.registry.active_streams(),
            max_streams: self.registry.max_streams(),
            memory_bytes: self.probe.memory_bytes(),
        }
    }

    fn emit(&self, event: HealthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Run every check once, store and publish the report. No recovery.
    pub fn check_now(&self) -> Arc<HealthReport> {
        let report = Arc::new(evaluate(self.snapshot(), &self.config));

        match report.overall {
            HealthStatus::Healthy => tracing::debug!("health check passed"),
            HealthStatus::Warning => {
                tracing::warn!(issues = ?report.issues, "health warning")
            }
            HealthStatus::Critical => {
                tracing::error!(issues = ?report.issues, "health critical")
            }
        }
        if report.overall != HealthStatus::Healthy {
            self.emit(HealthEvent::Alert {
                overall: report.overall,
                issues: report.issues.clone(),
            });
        }

        *self.latest.write() = Some(Arc::clone(&report));
        report
    }

    /// One monitor tick: check, recover if critical, then confirm once.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Arc<HealthReport> {
        let report = self.check_now();
        let actions = plan_recovery(&report);
        if actions.is_empty() {
            return report;
        }

        self.recover(&actions).await;

        tokio::select! {
            _ = shutdown.cancelled() => return report,
            _ = tokio::time::sleep(self.config.followup_delay) => {}
        }

        let followup = self.check_now();
        let improved = followup.overall < report.overall;
        tracing::info!(
            before = %report.overall,
            after = %followup.overall,
            improved,
            "recovery follow-up"
        );
        self.emit(HealthEvent::FollowUp {
            overall: followup.overall,
            improved,
        });
        followup
    }

    pub async fn recover(&self, actions: &[RecoveryAction]) {
        for action in actions {
            tracing::warn!(action = ?action, "running recovery action");
            match action {
                RecoveryAction::ClearCaches => self.registry.clear_all_caches(),
                RecoveryAction::ReinitializeEngines => {
                    let ready = self.registry.reinitialize().await;
                    tracing::info!(ready, "engines reinitialized");
                }
            }
        }
        self.emit(HealthEvent::Recovery {
            actions: actions.to_vec(),
        });
    }

    /// Spawn the periodic loop. It stops when `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let period = monitor.config.interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "health monitor started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.run_cycle(&shutdown).await;
                    }
                }
            }
            tracing::info!("health monitor stopped");
        })
    }
}
