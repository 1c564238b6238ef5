//! Centralized configuration for the resolver.
//!
//! Every timeout used by the registry, the strategies and the health monitor
//! lives here. None of the numbers are contracts; all of them can be tuned
//! through builders or `STREAM_RESOLVER_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration grouping every component's settings.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    pub registry: RegistryConfig,
    pub extractor: ExtractorConfig,
    pub timeouts: StrategyTimeouts,
    pub validator: ValidatorConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
}

/// Engine registry limits.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Streams (and in-flight resolutions) allowed at once, system-wide
    pub max_concurrent_streams: usize,
    /// Outer wall-clock bound for one engine's `get_stream`.
    ///
    /// The default favours a quick answer over exhausting an engine's chain.
    /// Direct-url and pipe fit inside it when the extractor answers promptly,
    /// but the temp-file fallback (`temp_file`, 45 s) only gets a real chance
    /// once this is raised to at least the chain budget
    /// (`Extractor::chain_budget`, 72 s for the YouTube chain with defaults).
    pub engine_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 8,
            engine_timeout: Duration::from_secs(12),
        }
    }
}

/// How to invoke the external extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    /// Python module yt_dlp
    Python,
    /// CLI binary yt-dlp
    Cli,
    /// Auto-select: CLI, then Python fallback
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Configuration for the external extraction and probing tools
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Extraction mode (Python, CLI, or Auto)
    pub mode: ExtractorMode,
    /// yt-dlp binary; `None` searches the usual install locations
    pub ytdlp_path: Option<String>,
    /// Python interpreter used for `python -m yt_dlp`
    pub python_path: String,
    /// Media probing binary
    pub ffprobe_path: String,
    /// SOCKS5/HTTP proxy URL, shared with the HTTP client
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// Use cookies from browser (Chrome)
    pub cookies_from_browser: bool,
    /// Socket/connect timeout handed to the extractor
    pub socket_timeout: Duration,
    /// YouTube player clients, tried by the extractor in this order
    pub player_clients: Vec<String>,
    /// Format selector for audio
    pub audio_format: String,
    /// Directory for temp-file strategy artifacts
    pub temp_dir: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            ytdlp_path: None,
            python_path: "python3".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            proxy: None,
            cookies_path: None,
            cookies_from_browser: false,
            socket_timeout: Duration::from_secs(5),
            player_clients: vec!["android".to_string(), "web".to_string()],
            audio_format: "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<String>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_cookies_from_browser(mut self, enabled: bool) -> Self {
        self.cookies_from_browser = enabled;
        self
    }

    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ytdlp_path(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_path = Some(path.into());
        self
    }

    pub fn with_ffprobe_path(mut self, path: impl Into<String>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn with_player_clients(mut self, clients: Vec<String>) -> Self {
        self.player_clients = clients;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

fn default_temp_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stream-resolver")
}

/// Per-strategy timeouts. Each one bounds a single technique, not the engine.
#[derive(Debug, Clone)]
pub struct StrategyTimeouts {
    /// Extractor run that prints a signed media URL
    pub direct_url: Duration,
    /// Extractor piping to stdout, until its first byte
    pub pipe_first_byte: Duration,
    /// Extractor download into a temp file, hard-killed when exceeded
    pub temp_file: Duration,
    /// Metadata fetch (`--dump-json`, oEmbed)
    pub metadata: Duration,
    /// ffprobe run
    pub probe: Duration,
    /// TCP connect for in-process HTTP streaming
    pub http_connect: Duration,
    /// Response headers after the connection is up
    pub http_response: Duration,
}

impl Default for StrategyTimeouts {
    fn default() -> Self {
        Self {
            direct_url: Duration::from_secs(8),
            pipe_first_byte: Duration::from_secs(8),
            temp_file: Duration::from_secs(45),
            metadata: Duration::from_secs(5),
            probe: Duration::from_secs(5),
            http_connect: Duration::from_secs(3),
            http_response: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Time a freshly opened stream gets to produce its first chunk
    pub window: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a known-good strategy is remembered per content id
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(240),
        }
    }
}

/// Health monitor thresholds.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
    /// Delay before the single follow-up check after recovery
    pub followup_delay: Duration,
    pub min_available_engines: usize,
    /// Aggregate failure rate above which performance is a warning
    pub failure_rate_threshold: f64,
    /// Attempts needed before the failure rate means anything
    pub min_samples: u64,
    pub memory_warning_bytes: u64,
    pub memory_critical_bytes: u64,
    pub concurrency_warning_ratio: f64,
    /// Per-engine: more than this many attempts before the rate is judged
    pub engine_min_attempts: u64,
    pub engine_min_success_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            followup_delay: Duration::from_secs(5),
            min_available_engines: 1,
            failure_rate_threshold: 0.5,
            min_samples: 10,
            memory_warning_bytes: 512 * 1024 * 1024,
            memory_critical_bytes: 1024 * 1024 * 1024,
            concurrency_warning_ratio: 0.9,
            engine_min_attempts: 5,
            engine_min_success_rate: 0.2,
        }
    }
}

impl ResolverConfig {
    /// Defaults with `STREAM_RESOLVER_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(max) = env_parse::<usize>("STREAM_RESOLVER_MAX_STREAMS") {
            config.registry.max_concurrent_streams = max;
        }
        if let Some(ms) = env_parse::<u64>("STREAM_RESOLVER_ENGINE_TIMEOUT_MS") {
            config.registry.engine_timeout = Duration::from_millis(ms);
        }
        if let Ok(path) = std::env::var("STREAM_RESOLVER_YTDLP") {
            config.extractor.ytdlp_path = Some(path);
        }
        // YTDLP_PYTHON is honoured for venv setups that avoid PEP 668 limitations
        if let Ok(python) = std::env::var("STREAM_RESOLVER_PYTHON")
            .or_else(|_| std::env::var("YTDLP_PYTHON"))
        {
            config.extractor.python_path = python;
        }
        if let Ok(path) = std::env::var("STREAM_RESOLVER_FFPROBE") {
            config.extractor.ffprobe_path = path;
        }
        if let Ok(proxy) = std::env::var("STREAM_RESOLVER_PROXY") {
            config.extractor.proxy = Some(proxy);
        }
        if let Ok(cookies) = std::env::var("STREAM_RESOLVER_COOKIES") {
            config.extractor.cookies_path = Some(cookies);
        }
        if let Ok(dir) = std::env::var("STREAM_RESOLVER_TEMP_DIR") {
            config.extractor.temp_dir = PathBuf::from(dir);
        }
        if let Some(ms) = env_parse::<u64>("STREAM_RESOLVER_VALIDATION_WINDOW_MS") {
            config.validator.window = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("STREAM_RESOLVER_CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("STREAM_RESOLVER_HEALTH_INTERVAL_SECS") {
            config.health.interval = Duration::from_secs(secs);
        }

        config
    }

    pub fn with_max_concurrent_streams(mut self, max: usize) -> Self {
        self.registry.max_concurrent_streams = max;
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.registry.engine_timeout = timeout;
        self
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
