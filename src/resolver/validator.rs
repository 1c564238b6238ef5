// Stream validator - bounded first-data probe before a stream is handed out

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use super::models::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("stream errored before first data: {0}")]
    Errored(String),

    #[error("stream ended before producing data")]
    Ended,

    #[error("no data within {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("validation cancelled")]
    Cancelled,
}

/// Waits a bounded window for the first non-empty chunk of a stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamValidator {
    window: Duration,
}

impl StreamValidator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Validate `stream`, giving it back unchanged (first chunk re-prepended) on success.
    ///
    /// An error event, end-of-stream, window expiry or cancellation before
    /// the first data chunk all fail validation; the stream is dropped in
    /// those cases, which tears down whatever backs it.
    pub async fn validate(
        &self,
        mut stream: ByteStream,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ValidationError> {
        let deadline = Instant::now() + self.window;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ValidationError::Cancelled),
                next = timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Err(_) => return Err(ValidationError::TimedOut(self.window)),
                Ok(None) => return Err(ValidationError::Ended),
                Ok(Some(Err(err))) => return Err(ValidationError::Errored(err.to_string())),
                Ok(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Ok(Some(Ok(chunk))) => {
                    let head = stream::once(async move { Ok(chunk) });
                    return Ok(Box::pin(head.chain(stream)));
                }
            }
        }
    }

    /// Boolean form: does the stream produce data inside the window?
    pub async fn probe(&self, stream: ByteStream) -> bool {
        self.validate(stream, &CancellationToken::new()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;
    use tokio::time::sleep;

    fn chunk_after(delay: Duration) -> ByteStream {
        Box::pin(
            stream::once(async move {
                sleep(delay).await;
                Ok::<_, io::Error>(Bytes::from_static(b"ID3"))
            })
            .chain(stream::iter(vec![Ok(Bytes::from_static(b"rest"))])),
        )
    }

    fn error_after(delay: Duration) -> ByteStream {
        Box::pin(stream::once(async move {
            sleep(delay).await;
            Err::<Bytes, _>(io::Error::new(io::ErrorKind::ConnectionReset, "403 from upstream"))
        }))
    }

    fn silent() -> ByteStream {
        Box::pin(stream::pending::<io::Result<Bytes>>())
    }

    const WINDOW: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_data_inside_window_validates() {
        let validator = StreamValidator::new(WINDOW);
        assert!(validator.probe(chunk_after(Duration::from_millis(500))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_fails_after_window() {
        let validator = StreamValidator::new(WINDOW);
        let started = Instant::now();

        let result = validator
            .validate(silent(), &CancellationToken::new())
            .await;

        assert_eq!(result.err(), Some(ValidationError::TimedOut(WINDOW)));
        assert!(started.elapsed() >= WINDOW);
        assert!(started.elapsed() < WINDOW + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_error_fails_without_waiting_out_window() {
        let validator = StreamValidator::new(WINDOW);
        let started = Instant::now();

        let result = validator
            .validate(error_after(Duration::from_millis(100)), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ValidationError::Errored(_))));
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_stream_fails() {
        let validator = StreamValidator::new(WINDOW);
        let result = validator
            .validate(
                Box::pin(stream::empty::<io::Result<Bytes>>()),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.err(), Some(ValidationError::Ended));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validated_stream_is_unmodified() {
        let validator = StreamValidator::new(WINDOW);
        let validated = validator
            .validate(chunk_after(Duration::from_millis(10)), &CancellationToken::new())
            .await
            .unwrap();

        let chunks: Vec<Bytes> = validated.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"ID3"), Bytes::from_static(b"rest")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_chunks_are_skipped() {
        let validator = StreamValidator::new(WINDOW);
        let source: ByteStream = Box::pin(stream::iter(vec![
            Ok::<_, io::Error>(Bytes::new()),
            Ok(Bytes::from_static(b"data")),
        ]));

        let validated = validator
            .validate(source, &CancellationToken::new())
            .await
            .unwrap();
        let chunks: Vec<Bytes> = validated.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"data")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_validation() {
        let validator = StreamValidator::new(WINDOW);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = validator.validate(silent(), &cancel).await;
        assert_eq!(result.err(), Some(ValidationError::Cancelled));
    }
}
