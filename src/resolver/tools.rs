// External tool discovery: yt-dlp (binary or Python module) and ffprobe

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::process::{run_checked, CommandSpec};
use crate::config::{ExtractorConfig, ExtractorMode};

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    YtDlpPython,
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::YtDlpPython => "yt_dlp (python)",
            ToolType::Ffprobe => "ffprobe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    config: ExtractorConfig,
}

impl ToolManager {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let detected = match tool_type {
            ToolType::YtDlp => {
                self.detect_binary("yt-dlp", self.config.ytdlp_path.as_deref())
                    .await
            }
            ToolType::YtDlpPython => self.detect_python_module().await,
            ToolType::Ffprobe => {
                self.detect_binary("ffprobe", Some(&self.config.ffprobe_path))
                    .await
            }
        };

        let (path, version) = match detected {
            Some((path, version)) => (Some(path), Some(version)),
            None => (None, None),
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: path.is_some(),
            version,
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::YtDlpPython).await,
            self.get_tool_info(ToolType::Ffprobe).await,
        ]
    }

    /// Base extractor invocation for the configured mode, if any is usable.
    ///
    /// Auto prefers the native binary and falls back to the Python module.
    pub async fn extractor_command(&self) -> Option<CommandSpec> {
        let command = match self.config.mode {
            ExtractorMode::Cli => self.cli_command().await,
            ExtractorMode::Python => self.python_module_command().await,
            ExtractorMode::Auto => match self.cli_command().await {
                Some(command) => Some(command),
                None => self.python_module_command().await,
            },
        };

        match &command {
            Some(command) => {
                tracing::info!(mode = %self.config.mode, command = %command.display(), "extractor found")
            }
            None => tracing::warn!(mode = %self.config.mode, "no usable extractor found"),
        }
        command
    }

    /// Path of a working ffprobe binary
    pub async fn ffprobe_path(&self) -> Option<String> {
        self.detect_binary("ffprobe", Some(&self.config.ffprobe_path))
            .await
            .map(|(path, _)| path)
    }

    async fn cli_command(&self) -> Option<CommandSpec> {
        self.detect_binary("yt-dlp", self.config.ytdlp_path.as_deref())
            .await
            .map(|(path, _)| CommandSpec::new(path))
    }

    async fn python_module_command(&self) -> Option<CommandSpec> {
        self.detect_python_module()
            .await
            .map(|_| self.python_command())
    }

    fn python_command(&self) -> CommandSpec {
        CommandSpec::new(&self.config.python_path).args(["-m", "yt_dlp"])
    }

    async fn detect_python_module(&self) -> Option<(String, String)> {
        let version = get_version(self.python_command()).await?;
        Some((format!("{} -m yt_dlp", self.config.python_path), version))
    }

    async fn detect_binary(
        &self,
        binary_name: &str,
        configured: Option<&str>,
    ) -> Option<(String, String)> {
        // 1. Explicit configuration (bare names are resolved through PATH by the OS)
        if let Some(path) = configured {
            if let Some(version) = get_version(CommandSpec::new(path)).await {
                return Some((path.to_string(), version));
            }
        }

        // 2. Try common paths
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];
        for path in common_paths {
            if Path::new(&path).exists() {
                if let Some(version) = get_version(CommandSpec::new(&path)).await {
                    return Some((path, version));
                }
            }
        }

        // 3. Try PATH
        let which = CommandSpec::new("which").arg(binary_name);
        let found = run_checked(&which, VERSION_TIMEOUT, &CancellationToken::new())
            .await
            .ok()?;
        let path = String::from_utf8_lossy(&found).trim().to_string();
        if path.is_empty() {
            return None;
        }
        let version = get_version(CommandSpec::new(&path)).await?;
        Some((path, version))
    }
}

async fn get_version(command: CommandSpec) -> Option<String> {
    // ffprobe only understands -version
    let flag = if command.program.ends_with("ffprobe") {
        "-version"
    } else {
        "--version"
    };
    let command = command.arg(flag);

    match run_checked(&command, VERSION_TIMEOUT, &CancellationToken::new()).await {
        Ok(stdout) => {
            let out = String::from_utf8_lossy(&stdout);
            out.lines().next().map(|line| line.trim().to_string())
        }
        Err(err) => {
            tracing::debug!(command = %command.display(), error = %err, "tool probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_python_module_yields_no_extractor() {
        let mut config = ExtractorConfig::default().with_mode(ExtractorMode::Python);
        config.python_path = "/nonexistent/python3-test-interpreter".to_string();
        let manager = ToolManager::new(&config);

        assert!(manager.extractor_command().await.is_none());
        let info = manager.get_tool_info(ToolType::YtDlpPython).await;
        assert!(!info.is_available);
        assert!(info.version.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_binary_is_used() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("yt-dlp");
        std::fs::write(&fake, "#!/bin/sh\necho 2099.01.01\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ExtractorConfig::default()
            .with_mode(ExtractorMode::Cli)
            .with_ytdlp_path(fake.to_string_lossy());
        let manager = ToolManager::new(&config);

        let info = manager.get_tool_info(ToolType::YtDlp).await;
        assert!(info.is_available);
        assert_eq!(info.version.as_deref(), Some("2099.01.01"));

        let command = manager.extractor_command().await.unwrap();
        assert_eq!(command.program, fake.to_string_lossy());
        assert!(command.args.is_empty());
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(ToolType::YtDlp.as_str(), "yt-dlp");
        assert_eq!(ToolType::Ffprobe.as_str(), "ffprobe");
    }
}
