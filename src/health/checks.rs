// Health checks and classification
//
// Pure functions over a `SystemSnapshot`; the monitor gathers the snapshot
// and acts on the resulting report.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::HealthConfig;
use crate::resolver::EngineStatus;

/// Ordered so that the worst status compares greatest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    EngineAvailability,
    Performance,
    Memory,
    Concurrency,
    EngineErrorRate,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EngineAvailability => "engine_availability",
            Self::Performance => "performance",
            Self::Memory => "memory",
            Self::Concurrency => "concurrency",
            Self::EngineErrorRate => "engine_error_rate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub status: HealthStatus,
    pub message: String,
}

impl CheckResult {
    fn new(kind: CheckKind, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }
}

/// Everything the checks look at, captured at one instant
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub engines: Vec<EngineStatus>,
    pub active_streams: usize,
    pub max_streams: usize,
    /// Resident memory of this process; `None` when it could not be read
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub overall: HealthStatus,
    pub checks: Vec<CheckResult>,
    pub issues: Vec<String>,
    pub snapshot: SystemSnapshot,
}

impl HealthReport {
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.kind == kind)
    }

    /// Status of one check; a check that did not run counts as healthy
    pub fn status_of(&self, kind: CheckKind) -> HealthStatus {
        self.check(kind)
            .map(|check| check.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn is_healthy(&self) -> bool {
        self.overall == HealthStatus::Healthy
    }
}

/// Run every check against `snapshot` and classify the result.
pub fn evaluate(snapshot: SystemSnapshot, config: &HealthConfig) -> HealthReport {
    let mut issues = Vec::new();
    let mut checks = vec![
        check_engine_availability(&snapshot, config),
        check_performance(&snapshot, config),
        check_memory(&snapshot, config),
        check_concurrency(&snapshot, config),
    ];

    let (error_rate, flagged) = check_engine_error_rate(&snapshot, config);
    checks.push(error_rate);

    for check in &checks {
        if check.status != HealthStatus::Healthy && check.kind != CheckKind::EngineErrorRate {
            issues.push(check.message.clone());
        }
    }
    issues.extend(flagged);

    let overall = checks
        .iter()
        .map(|check| check.status)
        .max()
        .unwrap_or(HealthStatus::Healthy);

    HealthReport {
        timestamp: OffsetDateTime::now_utc(),
        overall,
        checks,
        issues,
        snapshot,
    }
}

fn check_engine_availability(snapshot: &SystemSnapshot, config: &HealthConfig) -> CheckResult {
    let total = snapshot.engines.len();
    let ready = snapshot.engines.iter().filter(|e| e.initialized).count();
    let kind = CheckKind::EngineAvailability;

    if ready < config.min_available_engines {
        CheckResult::new(
            kind,
            HealthStatus::Critical,
            format!("only {}/{} engines are available", ready, total),
        )
    } else if ready < total {
        let down: Vec<_> = snapshot
            .engines
            .iter()
            .filter(|e| !e.initialized)
            .map(|e| e.name.as_str())
            .collect();
        CheckResult::new(
            kind,
            HealthStatus::Warning,
            format!("{}/{} engines available, down: {}", ready, total, down.join(", ")),
        )
    } else {
        CheckResult::new(
            kind,
            HealthStatus::Healthy,
            format!("{}/{} engines available", ready, total),
        )
    }
}

fn check_performance(snapshot: &SystemSnapshot, config: &HealthConfig) -> CheckResult {
    let (attempts, failures) = snapshot.engines.iter().fold((0u64, 0u64), |(a, f), e| {
        (a + e.stats.attempts, f + e.stats.failures)
    });
    let kind = CheckKind::Performance;

    if attempts < config.min_samples {
        return CheckResult::new(
            kind,
            HealthStatus::Healthy,
            format!("{} attempts so far, not enough to judge", attempts),
        );
    }

    let failure_rate = failures as f64 / attempts as f64;
    let message = format!(
        "failure rate {:.0}% over {} attempts",
        failure_rate * 100.0,
        attempts
    );
    if failure_rate > config.failure_rate_threshold {
        CheckResult::new(kind, HealthStatus::Warning, message)
    } else {
        CheckResult::new(kind, HealthStatus::Healthy, message)
    }
}

fn check_memory(snapshot: &SystemSnapshot, config: &HealthConfig) -> CheckResult {
    let kind = CheckKind::Memory;
    let Some(bytes) = snapshot.memory_bytes else {
        return CheckResult::new(kind, HealthStatus::Healthy, "memory usage unavailable");
    };

    let mib = bytes / (1024 * 1024);
    if bytes > config.memory_critical_bytes {
        CheckResult::new(
            kind,
            HealthStatus::Critical,
            format!("memory usage {} MiB is above the critical limit", mib),
        )
    } else if bytes > config.memory_warning_bytes {
        CheckResult::new(
            kind,
            HealthStatus::Warning,
            format!("memory usage {} MiB is high", mib),
        )
    } else {
        CheckResult::new(kind, HealthStatus::Healthy, format!("memory usage {} MiB", mib))
    }
}

fn check_concurrency(snapshot: &SystemSnapshot, config: &HealthConfig) -> CheckResult {
    let kind = CheckKind::Concurrency;
    let message = format!(
        "{}/{} streams in use",
        snapshot.active_streams, snapshot.max_streams
    );
    if snapshot.max_streams == 0 {
        return CheckResult::new(kind, HealthStatus::Healthy, message);
    }

    let utilization = snapshot.active_streams as f64 / snapshot.max_streams as f64;
    if utilization > config.concurrency_warning_ratio {
        CheckResult::new(kind, HealthStatus::Warning, message)
    } else {
        CheckResult::new(kind, HealthStatus::Healthy, message)
    }
}

/// Returns the check plus one issue line per flagged engine.
fn check_engine_error_rate(
    snapshot: &SystemSnapshot,
    config: &HealthConfig,
) -> (CheckResult, Vec<String>) {
    let flagged: Vec<String> = snapshot
        .engines
        .iter()
        .filter(|e| e.stats.attempts > config.engine_min_attempts)
        .filter_map(|e| {
            let rate = e.success_rate()?;
            (rate < config.engine_min_success_rate).then(|| {
                format!(
                    "engine {} succeeds {:.0}% of {} attempts",
                    e.name,
                    rate * 100.0,
                    e.stats.attempts
                )
            })
        })
        .collect();

    let check = if flagged.is_empty() {
        CheckResult::new(
            CheckKind::EngineErrorRate,
            HealthStatus::Healthy,
            "no engine above its error budget",
        )
    } else {
        CheckResult::new(
            CheckKind::EngineErrorRate,
            HealthStatus::Critical,
            format!("{} engine(s) failing", flagged.len()),
        )
    };
    (check, flagged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    ClearCaches,
    ReinitializeEngines,
}

/// Bounded recovery for a report. Empty unless the report is critical.
pub fn plan_recovery(report: &HealthReport) -> Vec<RecoveryAction> {
    if report.overall != HealthStatus::Critical {
        return Vec::new();
    }

    let mut actions = Vec::new();
    if report.status_of(CheckKind::Memory) != HealthStatus::Healthy {
        actions.push(RecoveryAction::ClearCaches);
    }
    if report.status_of(CheckKind::EngineAvailability) == HealthStatus::Critical {
        actions.push(RecoveryAction::ReinitializeEngines);
    }
    actions
}
