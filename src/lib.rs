//! Multi-engine audio stream resolution.
//!
//! A [`MediaResolver`] turns a URL or free-text query into a validated,
//! already-flowing audio byte stream. Platform engines are tried in priority
//! order, each running its own chain of extraction strategies, while a health
//! monitor watches engine statistics and process resources and runs bounded
//! recovery when things go critical.

pub mod config;
pub mod health;
pub mod logging;
pub mod resolver;
pub mod service;

pub use config::ResolverConfig;
pub use health::{HealthEvent, HealthReport, HealthStatus};
pub use resolver::{
    Engine, EngineRegistry, MediaReference, ResolveError, SourceKind, StreamHandle, SystemStatus,
    TrackInfo,
};
pub use service::{HealthSummary, MediaResolver};
