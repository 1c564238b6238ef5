// Strategy chain shared by every engine
//
// Each strategy is one self-contained way of producing a validated byte
// stream. Strategies run in order, each under its own time budget, and a
// failure falls straight through to the next one.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::errors::ResolveError;
use super::http::open_stream;
use super::method_cache::MethodCache;
use super::models::{ByteStream, EngineStream, MediaReference, SourceKind, TrackInfo};
use super::process::{run_checked, ChildStream, CommandSpec, ProcessError};
use super::temp_artifact::TempArtifact;
use super::tools::ToolManager;
use super::utils::{build_http_client, cookie_args, proxy_args};
use super::validator::StreamValidator;
use crate::config::{ExtractorConfig, ResolverConfig, StrategyTimeouts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Extractor prints a signed media URL, fetched in-process
    DirectUrl,
    /// Extractor writes the media to stdout
    PipeStdout,
    /// Extractor downloads to a private temp file first
    TempFile,
    /// Plain HTTP(S) fetch of the reference itself
    HttpStream,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectUrl => "direct-url",
            Strategy::PipeStdout => "pipe-stdout",
            Strategy::TempFile => "temp-file",
            Strategy::HttpStream => "http-stream",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "direct-url" => Some(Strategy::DirectUrl),
            "pipe-stdout" => Some(Strategy::PipeStdout),
            "temp-file" => Some(Strategy::TempFile),
            "http-stream" => Some(Strategy::HttpStream),
            _ => None,
        }
    }
}

/// Declared order, with a cached strategy moved to the front when it belongs to this chain.
pub fn ordered_strategies(declared: &[Strategy], cached: Option<&str>) -> Vec<Strategy> {
    let Some(first) = cached
        .and_then(Strategy::from_name)
        .filter(|s| declared.contains(s))
    else {
        return declared.to_vec();
    };

    let mut order = Vec::with_capacity(declared.len());
    order.push(first);
    order.extend(declared.iter().copied().filter(|s| *s != first));
    order
}

/// External extractor plus the in-process HTTP client, shared by one engine.
pub struct Extractor {
    config: ExtractorConfig,
    timeouts: StrategyTimeouts,
    validator: StreamValidator,
    pipe_validator: StreamValidator,
    tools: ToolManager,
    command: RwLock<Option<CommandSpec>>,
    ffprobe: RwLock<Option<String>>,
    http: reqwest::Client,
}

impl Extractor {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let http = build_http_client(&config.extractor, config.timeouts.http_connect)?;
        Ok(Self {
            config: config.extractor.clone(),
            timeouts: config.timeouts.clone(),
            validator: StreamValidator::new(config.validator.window),
            // yt-dlp resolves formats before writing anything, so its window is wider
            pipe_validator: StreamValidator::new(config.timeouts.pipe_first_byte),
            tools: ToolManager::new(&config.extractor),
            command: RwLock::new(None),
            ffprobe: RwLock::new(None),
            http,
        })
    }

    /// Skip detection and use `command` as the extractor invocation.
    pub fn with_command(self, command: CommandSpec) -> Self {
        *self.command.write() = Some(command);
        self
    }

    /// Locate the extractor for the configured mode.
    pub async fn initialize(&self) -> Result<(), ResolveError> {
        if self.command.read().is_some() {
            return Ok(());
        }
        match self.tools.extractor_command().await {
            Some(command) => {
                *self.command.write() = Some(command);
                Ok(())
            }
            None => Err(ResolveError::ToolNotFound(format!(
                "yt-dlp (mode {})",
                self.config.mode
            ))),
        }
    }

    /// Locate ffprobe. Missing ffprobe only degrades metadata.
    pub async fn initialize_probe(&self) -> bool {
        if self.ffprobe.read().is_some() {
            return true;
        }
        let found = self.tools.ffprobe_path().await;
        let available = found.is_some();
        *self.ffprobe.write() = found;
        available
    }

    pub fn is_ready(&self) -> bool {
        self.command.read().is_some()
    }

    pub fn timeouts(&self) -> &StrategyTimeouts {
        &self.timeouts
    }

    /// Worst-case wall clock for running `strategies` back to back
    pub fn chain_budget(&self, strategies: &[Strategy]) -> Duration {
        strategies.iter().map(|s| self.strategy_budget(*s)).sum()
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    fn base_command(&self) -> Result<CommandSpec, ResolveError> {
        self.command
            .read()
            .clone()
            .ok_or_else(|| ResolveError::ToolNotFound("yt-dlp".to_string()))
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.as_secs().max(1).to_string(),
        ];

        if !self.config.player_clients.is_empty() {
            args.push("--extractor-args".to_string());
            args.push(format!(
                "youtube:player_client={}",
                self.config.player_clients.join(",")
            ));
        }

        args.extend(cookie_args(&self.config));
        args.extend(proxy_args(&self.config));
        args
    }

    fn extractor_command(&self, extra: &[&str], target: &str) -> Result<CommandSpec, ResolveError> {
        Ok(self
            .base_command()?
            .args(self.common_args())
            .args(extra.iter().copied())
            .arg(target))
    }

    /// `--dump-json` for `target`, parsed into a JSON value.
    pub async fn fetch_metadata(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ResolveError> {
        let command = self.extractor_command(&["--dump-json", "--skip-download"], target)?;
        let stdout = run_checked(&command, self.timeouts.metadata, cancel)
            .await
            .map_err(|err| ResolveError::NotAvailable {
                reference: target.to_string(),
                reason: err.to_string(),
            })?;

        let text = String::from_utf8_lossy(&stdout);
        let first = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
        serde_json::from_str(first).map_err(|err| ResolveError::NotAvailable {
            reference: target.to_string(),
            reason: format!("invalid JSON: {}", err),
        })
    }

    /// ffprobe metadata for a media URL
    pub async fn probe_metadata(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ResolveError> {
        let ffprobe = self
            .ffprobe
            .read()
            .clone()
            .ok_or_else(|| ResolveError::ToolNotFound("ffprobe".to_string()))?;
        let command = CommandSpec::new(ffprobe).args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            url,
        ]);
        let stdout = run_checked(&command, self.timeouts.probe, cancel).await?;
        serde_json::from_slice(&stdout).map_err(|err| ResolveError::NotAvailable {
            reference: url.to_string(),
            reason: format!("invalid ffprobe output: {}", err),
        })
    }

    /// Run `declared` strategies against `target` until one yields a validated stream.
    pub async fn run_chain(
        &self,
        engine: &str,
        target: &str,
        content_id: &str,
        declared: &[Strategy],
        cache: &MethodCache,
        cancel: &CancellationToken,
    ) -> Result<EngineStream, ResolveError> {
        let cached = cache.get(content_id);
        let order = ordered_strategies(declared, cached.as_deref());
        if let Some(method) = &cached {
            tracing::debug!(engine, content_id, method = %method, "method cache hit");
        }

        let mut attempted = 0;
        let mut last_error = None;

        for strategy in order {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            attempted += 1;

            let started = Instant::now();
            let attempt = cancel.child_token();
            let budget = self.strategy_budget(strategy);
            let result =
                match tokio::time::timeout(budget, self.run_strategy(strategy, target, &attempt))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        attempt.cancel();
                        Err(ResolveError::strategy(
                            strategy.as_str(),
                            format!("timed out after {:.1}s", budget.as_secs_f32()),
                        ))
                    }
                };

            match result {
                Ok(stream) => {
                    tracing::info!(
                        engine,
                        strategy = strategy.as_str(),
                        content_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "strategy succeeded"
                    );
                    cache.put(content_id, strategy.as_str());
                    return Ok(EngineStream {
                        strategy: strategy.as_str(),
                        content_id: content_id.to_string(),
                        stream,
                    });
                }
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(err) => {
                    tracing::warn!(
                        engine,
                        strategy = strategy.as_str(),
                        blocking = ?err.blocking_reason(),
                        error = %err,
                        "strategy failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(ResolveError::ExtractionFailed {
            engine: engine.to_string(),
            attempted,
            last_error: Box::new(last_error.unwrap_or_else(|| {
                ResolveError::strategy("none", "no strategies declared for this engine")
            })),
        })
    }

    fn strategy_budget(&self, strategy: Strategy) -> Duration {
        let http = self.timeouts.http_connect + self.timeouts.http_response;
        match strategy {
            Strategy::DirectUrl => self.timeouts.direct_url + http + self.validator.window(),
            Strategy::PipeStdout => self.pipe_validator.window() + Duration::from_secs(1),
            Strategy::TempFile => self.timeouts.temp_file + self.validator.window(),
            Strategy::HttpStream => http + self.validator.window(),
        }
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ResolveError> {
        match strategy {
            Strategy::DirectUrl => self.direct_url(target, cancel).await,
            Strategy::PipeStdout => self.pipe_stdout(target, cancel).await,
            Strategy::TempFile => self.temp_file(target, cancel).await,
            Strategy::HttpStream => {
                open_stream(&self.http, target, strategy.as_str(), &self.validator, cancel).await
            }
        }
    }

    async fn direct_url(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ResolveError> {
        const NAME: &str = "direct-url";
        let command = self.extractor_command(&["-g", "-f", &self.config.audio_format], target)?;
        let stdout = run_checked(&command, self.timeouts.direct_url, cancel)
            .await
            .map_err(|err| process_failure(NAME, err))?;

        let text = String::from_utf8_lossy(&stdout);
        let media_url = text
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("http"))
            .ok_or_else(|| ResolveError::strategy(NAME, "extractor returned no formats"))?;

        tracing::debug!(strategy = NAME, "signed media URL obtained");
        open_stream(&self.http, media_url, NAME, &self.validator, cancel).await
    }

    async fn pipe_stdout(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ResolveError> {
        const NAME: &str = "pipe-stdout";
        let command = self.extractor_command(
            &["-f", &self.config.audio_format, "--no-progress", "-o", "-"],
            target,
        )?;
        let child = ChildStream::spawn(&command).map_err(|err| process_failure(NAME, err))?;
        let stderr = child.stderr_tail();

        self.pipe_validator
            .validate(Box::pin(child), cancel)
            .await
            .map_err(|err| {
                let tail = stderr.get();
                if tail.is_empty() {
                    ResolveError::strategy(NAME, err.to_string())
                } else {
                    ResolveError::strategy(NAME, format!("{}; {}", err, tail))
                }
            })
    }

    async fn temp_file(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ResolveError> {
        const NAME: &str = "temp-file";
        // Dropped (and removed) on every early return below
        let artifact = TempArtifact::reserve(&self.config.temp_dir, "audio").await?;
        let path = artifact.path().to_string_lossy().to_string();

        let command = self.extractor_command(
            &[
                "-f",
                &self.config.audio_format,
                "--no-progress",
                "--no-part",
                "--force-overwrites",
                "-o",
                &path,
            ],
            target,
        )?;
        run_checked(&command, self.timeouts.temp_file, cancel)
            .await
            .map_err(|err| process_failure(NAME, err))?;

        let size = tokio::fs::metadata(artifact.path())
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(ResolveError::strategy(NAME, "downloaded file is missing or empty"));
        }
        tracing::debug!(strategy = NAME, bytes = size, "temp artifact ready");

        let stream = artifact.into_stream().await?;
        self.validator
            .validate(Box::pin(stream), cancel)
            .await
            .map_err(|err| ResolveError::strategy(NAME, err.to_string()))
    }
}

fn process_failure(strategy: &'static str, err: ProcessError) -> ResolveError {
    match err {
        ProcessError::Cancelled { .. } => ResolveError::Cancelled,
        ProcessError::Spawn { .. } => ResolveError::Process(err),
        other => ResolveError::strategy(strategy, other.to_string()),
    }
}

/// TrackInfo from an extractor `--dump-json` document
pub fn track_from_json(
    json: &serde_json::Value,
    source_kind: SourceKind,
    reference: &MediaReference,
) -> TrackInfo {
    let text = |key: &str| json[key].as_str().filter(|s| !s.is_empty());

    TrackInfo {
        id: text("id").unwrap_or("unknown").to_string(),
        title: text("track")
            .or_else(|| text("title"))
            .unwrap_or("Unknown")
            .to_string(),
        author: text("artist")
            .or_else(|| text("uploader"))
            .or_else(|| text("channel"))
            .unwrap_or("Unknown")
            .to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0).max(0.0) as u64,
        source_kind,
        thumbnail_url: text("thumbnail").map(str::to_string),
        origin_url: text("webpage_url")
            .unwrap_or(reference.as_str())
            .to_string(),
    }
}
