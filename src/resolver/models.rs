// Common data models for stream resolution

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::io::StreamReader;

/// Boxed byte stream shared by every strategy.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Opaque input identifying a piece of media: a URL or free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaReference(String);

impl MediaReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        let lower = self.0.to_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Lowercased host for URL references, `None` for search text.
    pub fn host(&self) -> Option<String> {
        if !self.is_url() {
            return None;
        }
        reqwest::Url::parse(&self.0)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
    }

    /// Path of a URL reference, empty for search text.
    pub fn path(&self) -> String {
        if !self.is_url() {
            return String::new();
        }
        reqwest::Url::parse(&self.0)
            .map(|url| url.path().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaReference {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MediaReference {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Platform a track was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    YouTube,
    SoundCloud,
    Spotify,
    Direct,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => write!(f, "youtube"),
            Self::SoundCloud => write!(f, "soundcloud"),
            Self::Spotify => write!(f, "spotify"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Track metadata. Advisory only, never required for playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub source_kind: SourceKind,
    pub thumbnail_url: Option<String>,
    pub origin_url: String,
}

impl TrackInfo {
    /// Placeholder info used when the metadata fetch times out or fails to parse.
    pub fn degraded(id: &str, reference: &MediaReference, source_kind: SourceKind) -> Self {
        let title = if reference.is_url() {
            let path = reference.path();
            path.rsplit('/')
                .find(|segment| !segment.is_empty())
                .map(|segment| segment.to_string())
                .unwrap_or_else(|| "Unknown track".to_string())
        } else {
            reference.as_str().to_string()
        };

        Self {
            id: id.to_string(),
            title,
            author: "Unknown".to_string(),
            duration_seconds: 0,
            source_kind,
            thumbnail_url: None,
            origin_url: reference.as_str().to_string(),
        }
    }

    /// Duration formatted as `m:ss`
    pub fn duration_label(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }
}

/// What an engine hands back to the registry on success.
pub struct EngineStream {
    pub strategy: &'static str,
    pub content_id: String,
    pub stream: ByteStream,
}

impl fmt::Debug for EngineStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineStream")
            .field("strategy", &self.strategy)
            .field("content_id", &self.content_id)
            .finish_non_exhaustive()
    }
}

/// Validated, already-flowing audio stream owned by the caller.
///
/// Holds one slot of the registry's concurrency budget until dropped. Child
/// processes and temp files backing the stream are torn down with it.
pub struct StreamHandle {
    engine: String,
    strategy: String,
    content_id: String,
    stream: ByteStream,
    _permit: Option<OwnedSemaphorePermit>,
}

impl StreamHandle {
    pub(crate) fn new(
        engine: &str,
        found: EngineStream,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            engine: engine.to_string(),
            strategy: found.strategy.to_string(),
            content_id: found.content_id,
            stream: found.stream,
            _permit: permit,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Adapt into an `AsyncRead` for audio pipelines that want a reader.
    pub fn into_reader(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }
}

impl Stream for StreamHandle {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("engine", &self.engine)
            .field("strategy", &self.strategy)
            .field("content_id", &self.content_id)
            .finish_non_exhaustive()
    }
}
