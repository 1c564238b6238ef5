// Engine implementations

pub mod direct;
pub mod search;
pub mod spotify;
pub mod ytdlp;

use std::sync::Arc;

pub use direct::DirectEngine;
pub use search::SearchEngine;
pub use spotify::SpotifyEngine;
pub use ytdlp::YtDlpEngine;

use super::errors::ResolveError;
use super::extractor::Extractor;
use super::traits::Engine;
use crate::config::ResolverConfig;

/// The stock engine set, in default priority order
pub fn default_engines(config: &ResolverConfig) -> Result<Vec<Arc<dyn Engine>>, ResolveError> {
    let extractor = Arc::new(Extractor::new(config)?);

    let budget = extractor.chain_budget(ytdlp::YOUTUBE_STRATEGIES);
    if budget > config.registry.engine_timeout {
        tracing::debug!(
            engine_timeout_ms = config.registry.engine_timeout.as_millis() as u64,
            chain_budget_ms = budget.as_millis() as u64,
            "engine timeout cuts the strategy chain short"
        );
    }
    Ok(engines_sharing(config, extractor))
}

/// The stock engine set over one extractor, so tool detection and the
/// HTTP client are shared.
pub fn engines_sharing(config: &ResolverConfig, extractor: Arc<Extractor>) -> Vec<Arc<dyn Engine>> {
    vec![
        Arc::new(YtDlpEngine::youtube(config, Arc::clone(&extractor))),
        Arc::new(YtDlpEngine::soundcloud(config, Arc::clone(&extractor))),
        Arc::new(SpotifyEngine::new(config, Arc::clone(&extractor))),
        Arc::new(DirectEngine::new(config, Arc::clone(&extractor))),
        Arc::new(SearchEngine::new(config, extractor)),
    ]
}

#[cfg(test)]
pub(crate) fn extractor_for_tests(
    command: Option<crate::resolver::process::CommandSpec>,
) -> Arc<Extractor> {
    let extractor = Extractor::new(&ResolverConfig::default()).unwrap();
    Arc::new(match command {
        Some(command) => extractor.with_command(command),
        None => extractor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::MediaReference;

    #[test]
    fn test_default_engines_are_in_priority_order() {
        let engines = default_engines(&ResolverConfig::default()).unwrap();
        let names: Vec<_> = engines.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["youtube", "soundcloud", "spotify", "direct", "search"]);

        let priorities: Vec<_> = engines.iter().map(|e| e.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_every_reference_kind_has_exactly_one_engine() {
        let engines = default_engines(&ResolverConfig::default()).unwrap();
        for reference in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://soundcloud.com/artist/track",
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
            "https://cdn.example.com/song.ogg",
            "some search words",
        ] {
            let reference = MediaReference::new(reference);
            let handlers = engines.iter().filter(|e| e.can_handle(&reference)).count();
            assert_eq!(handlers, 1, "{reference}");
        }
    }

    #[test]
    fn test_stock_engines_hold_one_extractor() {
        let config = ResolverConfig::default();
        let extractor = Arc::new(Extractor::new(&config).unwrap());
        let engines = engines_sharing(&config, Arc::clone(&extractor));
        assert_eq!(engines.len(), 5);
        assert_eq!(Arc::strong_count(&extractor), 6);

        drop(engines);
        assert_eq!(Arc::strong_count(&extractor), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_detection_runs_once_for_all_engines() {
        use crate::config::ExtractorMode;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let fake = dir.path().join("yt-dlp");
        std::fs::write(
            &fake,
            format!("#!/bin/sh\necho \"$*\" >> '{}'\necho 2099.01.01\n", calls.display()),
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = ResolverConfig::default();
        config.extractor = config
            .extractor
            .with_mode(ExtractorMode::Cli)
            .with_ytdlp_path(fake.to_string_lossy());

        let engines = default_engines(&config).unwrap();
        for engine in engines.iter().filter(|e| e.name() != "direct") {
            engine.initialize().await.unwrap();
            assert!(engine.is_initialized(), "{}", engine.name());
        }

        let log = std::fs::read_to_string(&calls).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), ["--version"]);
    }
}
