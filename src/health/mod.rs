// Health monitoring
//
// - checks.rs: pure classification of a system snapshot
// - probe.rs: process resource numbers
// - monitor.rs: timer loop, alerts, bounded recovery

pub mod checks;
pub mod monitor;
pub mod probe;

pub use checks::{
    evaluate, plan_recovery, CheckKind, CheckResult, HealthReport, HealthStatus, RecoveryAction,
    SystemSnapshot,
};
pub use monitor::{HealthEvent, HealthMonitor};
pub use probe::{FixedProbe, ResourceProbe, SysinfoProbe};
