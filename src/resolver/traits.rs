// Engine trait definition

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::ResolveError;
use super::models::{EngineStream, MediaReference, TrackInfo};

/// One platform-specific way of turning a reference into audio.
///
/// Engines own their strategy chain and method cache. The registry owns
/// ordering, outer timeouts, capacity and statistics.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine (for logging and status)
    fn name(&self) -> &'static str;

    /// Lower is tried first
    fn priority(&self) -> u32;

    fn capabilities(&self) -> &'static [&'static str];

    fn is_initialized(&self) -> bool;

    /// Cheap, synchronous check. Must not do I/O.
    fn can_handle(&self, reference: &MediaReference) -> bool;

    /// Probe external tools and mark the engine usable. Safe to call again.
    async fn initialize(&self) -> Result<(), ResolveError>;

    /// Best-effort metadata. Falls back to degraded info instead of failing.
    async fn get_track_info(&self, reference: &MediaReference) -> Result<TrackInfo, ResolveError>;

    /// Run the strategy chain until one produces a validated stream.
    async fn get_stream(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError>;

    /// Drop remembered strategy choices
    fn clear_cache(&self) {}
}
