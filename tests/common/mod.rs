// Scriptable engine for registry and health tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use stream_resolver::resolver::{EngineStream, SourceKind};
use stream_resolver::{Engine, MediaReference, ResolveError, TrackInfo};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed(&'static [u8]),
    Fail(&'static str),
    Hang,
}

/// Shared record of which engines were asked for a stream, in order
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub struct MockEngine {
    name: &'static str,
    priority: u32,
    behavior: Behavior,
    handles: bool,
    initialized: AtomicBool,
    init_failures_left: AtomicUsize,
    calls: CallLog,
    pub init_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    pub last_token: Mutex<Option<CancellationToken>>,
}

impl MockEngine {
    pub fn new(name: &'static str, priority: u32, behavior: Behavior, calls: &CallLog) -> Self {
        Self {
            name,
            priority,
            behavior,
            handles: true,
            initialized: AtomicBool::new(false),
            init_failures_left: AtomicUsize::new(0),
            calls: Arc::clone(calls),
            init_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            last_token: Mutex::new(None),
        }
    }

    /// Refuse every reference
    pub fn not_handling(mut self) -> Self {
        self.handles = false;
        self
    }

    /// Fail the next `n` initializations
    pub fn failing_init(self, n: usize) -> Self {
        self.init_failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["mock"]
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn can_handle(&self, _reference: &MediaReference) -> bool {
        self.handles
    }

    async fn initialize(&self) -> Result<(), ResolveError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .init_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        self.initialized.store(!fail, Ordering::SeqCst);
        if fail {
            Err(ResolveError::ToolNotFound(format!("{} tool", self.name)))
        } else {
            Ok(())
        }
    }

    async fn get_track_info(&self, reference: &MediaReference) -> Result<TrackInfo, ResolveError> {
        match self.behavior {
            Behavior::Fail(reason) => Err(ResolveError::NotAvailable {
                reference: reference.to_string(),
                reason: reason.to_string(),
            }),
            _ => {
                let mut info = TrackInfo::degraded(self.name, reference, SourceKind::Direct);
                info.title = format!("{} title", self.name);
                Ok(info)
            }
        }
    }

    async fn get_stream(
        &self,
        _reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        self.calls.lock().push(self.name);
        *self.last_token.lock() = Some(cancel.clone());

        match self.behavior {
            Behavior::Succeed(payload) => Ok(EngineStream {
                strategy: "mock",
                content_id: format!("{}-content", self.name),
                stream: Box::pin(stream::iter(vec![Ok::<_, std::io::Error>(
                    Bytes::from_static(payload),
                )])),
            }),
            Behavior::Fail(reason) => Err(ResolveError::strategy("mock", reason)),
            Behavior::Hang => {
                futures_util::future::pending::<()>().await;
                Err(ResolveError::Cancelled)
            }
        }
    }

    fn clear_cache(&self) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}
