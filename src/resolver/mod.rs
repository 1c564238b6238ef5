// Stream resolver module
//
// Architecture:
// - traits.rs: Engine trait
// - engines/: per-platform engines
// - extractor.rs: strategy chain shared by the engines
// - registry.rs: ordered fallback across engines
// - validator.rs, method_cache.rs, stats.rs: per-request helpers

pub mod diagnostics;
pub mod engines;
pub mod errors;
pub mod extractor;
pub mod http;
pub mod method_cache;
pub mod models;
pub mod process;
pub mod registry;
pub mod stats;
pub mod temp_artifact;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod validator;

pub use diagnostics::{diagnose_error, BlockingReason};
pub use engines::{default_engines, engines_sharing};
pub use errors::{EngineFailure, ResolveError};
pub use extractor::Strategy;
pub use method_cache::MethodCache;
pub use models::{ByteStream, EngineStream, MediaReference, SourceKind, StreamHandle, TrackInfo};
pub use registry::{EngineRegistry, EngineStatus, SystemStatus};
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use traits::Engine;
pub use validator::{StreamValidator, ValidationError};
