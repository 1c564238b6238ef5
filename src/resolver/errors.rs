// Error types for stream resolution

use std::time::Duration;

use super::diagnostics::{diagnose_error, BlockingReason};
use super::process::ProcessError;

/// One engine's failure inside a single resolution.
#[derive(Debug)]
pub struct EngineFailure {
    pub engine: String,
    pub error: ResolveError,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Metadata could not be produced for this reference
    #[error("metadata not available for {reference}: {reason}")]
    NotAvailable { reference: String, reason: String },

    /// One extraction technique failed; the engine falls through to the next one
    #[error("strategy {strategy} failed: {reason}")]
    StrategyFailed {
        strategy: &'static str,
        reason: String,
        blocking: Option<BlockingReason>,
    },

    /// Every strategy of one engine failed
    #[error("engine {engine} exhausted {attempted} strategies, last error: {last_error}")]
    ExtractionFailed {
        engine: String,
        attempted: usize,
        last_error: Box<ResolveError>,
    },

    /// The registry's outer bound fired before the engine answered
    #[error("engine {engine} timed out after {}ms", .timeout.as_millis())]
    EngineTimeout { engine: String, timeout: Duration },

    /// Every eligible engine was tried and none produced a stream
    #[error("no playable source found")]
    AllEnginesFailed { failures: Vec<EngineFailure> },

    /// Too many streams are open at once
    #[error("stream capacity exceeded ({max} streams already open)")]
    CapacityExceeded { max: usize },

    /// Extractor or probe binary is missing
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Build a strategy failure, classifying the message with the blocking diagnostics.
    pub fn strategy(strategy: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let blocking = diagnose_error(&reason);
        Self::StrategyFailed {
            strategy,
            reason,
            blocking,
        }
    }

    /// Blocking reason attached to this error, looking through engine wrappers.
    pub fn blocking_reason(&self) -> Option<BlockingReason> {
        match self {
            Self::StrategyFailed { blocking, .. } => *blocking,
            Self::ExtractionFailed { last_error, .. } => last_error.blocking_reason(),
            _ => None,
        }
    }

    /// Message safe to show to end users. Never includes subprocess output.
    pub fn user_message(&self) -> String {
        match self {
            Self::AllEnginesFailed { .. }
            | Self::ExtractionFailed { .. }
            | Self::StrategyFailed { .. }
            | Self::EngineTimeout { .. } => "No playable source found".to_string(),
            Self::CapacityExceeded { .. } => {
                "Too many streams are playing right now, try again shortly".to_string()
            }
            Self::NotAvailable { .. } => "Track information is not available".to_string(),
            Self::Cancelled => "Request was cancelled".to_string(),
            _ => "Playback source error".to_string(),
        }
    }

    /// Full per-engine breakdown, meant for logs and diagnostics channels only.
    pub fn diagnostics(&self) -> String {
        match self {
            Self::AllEnginesFailed { failures } if failures.is_empty() => {
                "no engine accepted this reference".to_string()
            }
            Self::AllEnginesFailed { failures } => failures
                .iter()
                .enumerate()
                .map(|(i, f)| format!("{}. [{}] {}", i + 1, f.engine, f.error))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}
