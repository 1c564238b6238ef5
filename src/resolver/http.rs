// In-process HTTP streaming shared by the direct-url and http-stream strategies

use std::io;

use futures_util::TryStreamExt;
use tokio_util::sync::CancellationToken;

use super::errors::ResolveError;
use super::models::ByteStream;
use super::validator::StreamValidator;

/// GET `url` and hand back its body once the first bytes have arrived.
pub async fn open_stream(
    client: &reqwest::Client,
    url: &str,
    strategy: &'static str,
    validator: &StreamValidator,
    cancel: &CancellationToken,
) -> Result<ByteStream, ResolveError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
        response = client.get(url).send() => response
            .map_err(|err| ResolveError::strategy(strategy, format!("request failed: {}", err)))?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::strategy(strategy, format!("HTTP {}", status)));
    }

    tracing::debug!(
        strategy,
        %status,
        content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-"),
        "upstream responded"
    );

    let body: ByteStream = Box::pin(response.bytes_stream().map_err(io::Error::other));
    validator
        .validate(body, cancel)
        .await
        .map_err(|err| ResolveError::strategy(strategy, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn validator() -> StreamValidator {
        StreamValidator::new(Duration::from_millis(1000))
    }

    #[tokio::test]
    async fn test_streams_successful_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/audio.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fakeaudio".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/audio.mp3", server.uri());
        let stream = open_stream(
            &reqwest::Client::new(),
            &url,
            "http-stream",
            &validator(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let body: Vec<u8> = stream
            .map(|chunk| chunk.unwrap().to_vec())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(body, b"ID3fakeaudio");
    }

    #[tokio::test]
    async fn test_forbidden_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = open_stream(
            &reqwest::Client::new(),
            &format!("{}/expired", server.uri()),
            "direct-url",
            &validator(),
            &CancellationToken::new(),
        )
        .await
        .err()
        .expect("stream should be refused");

        assert!(err.to_string().contains("HTTP 403"));
        assert_eq!(
            err.blocking_reason(),
            Some(crate::resolver::diagnostics::BlockingReason::Http403Forbidden)
        );
    }

    #[tokio::test]
    async fn test_empty_body_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = open_stream(
            &reqwest::Client::new(),
            &server.uri(),
            "http-stream",
            &validator(),
            &CancellationToken::new(),
        )
        .await
        .err()
        .expect("stream should be refused");

        assert!(matches!(err, ResolveError::StrategyFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = open_stream(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/never",
            "http-stream",
            &validator(),
            &cancel,
        )
        .await
        .err()
        .expect("stream should be refused");
        assert!(matches!(err, ResolveError::Cancelled));
    }
}
