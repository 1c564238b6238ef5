mod common;

use std::sync::Arc;

use common::{call_log, Behavior, MockEngine};
use pretty_assertions::assert_eq;
use stream_resolver::health::FixedProbe;
use stream_resolver::logging::init_for_tests;
use stream_resolver::{EngineRegistry, HealthStatus, MediaResolver, ResolveError, ResolverConfig};
use tokio::io::AsyncReadExt;

async fn resolver_with(engines: Vec<Arc<MockEngine>>) -> MediaResolver {
    let config = ResolverConfig::default().with_max_concurrent_streams(2);
    let mut registry = EngineRegistry::new(&config.registry);
    for engine in engines {
        registry.register(engine);
    }
    registry.initialize_all().await;
    MediaResolver::with_registry(config, Arc::new(registry), Arc::new(FixedProbe(None)))
}

#[tokio::test]
async fn test_resolve_and_read_through_adapter() {
    init_for_tests();
    let calls = call_log();
    let resolver = resolver_with(vec![
        Arc::new(MockEngine::new("youtube", 10, Behavior::Fail("Sign in to confirm you're not a bot"), &calls)),
        Arc::new(MockEngine::new("soundcloud", 20, Behavior::Succeed(b"ID3audio"), &calls)),
    ])
    .await;

    let handle = resolver
        .resolve_stream("https://soundcloud.com/artist/track")
        .await
        .unwrap();
    assert_eq!(handle.engine(), "soundcloud");
    assert_eq!(handle.content_id(), "soundcloud-content");
    assert_eq!(resolver.system_status().active_streams, 1);

    let mut reader = handle.into_reader();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await.unwrap();
    assert_eq!(body, b"ID3audio");

    drop(reader);
    assert_eq!(resolver.system_status().active_streams, 0);
}

#[tokio::test]
async fn test_user_message_hides_engine_details() {
    let calls = call_log();
    let resolver = resolver_with(vec![Arc::new(MockEngine::new(
        "youtube",
        10,
        Behavior::Fail("ERROR: HTTP Error 403: Forbidden"),
        &calls,
    ))])
    .await;

    let err = resolver.resolve_stream("never gonna give you up").await.unwrap_err();
    assert!(!err.user_message().contains("403"));
    assert!(err.diagnostics().contains("403"));
}

#[tokio::test]
async fn test_health_summary_runs_a_check_on_demand() {
    let calls = call_log();
    let resolver = resolver_with(vec![Arc::new(MockEngine::new(
        "ok",
        10,
        Behavior::Succeed(b"x"),
        &calls,
    ))])
    .await;
    assert!(resolver.monitor().latest_report().is_none());

    let summary = resolver.health_summary();
    assert_eq!(summary.overall, HealthStatus::Healthy);
    assert_eq!(summary.status.initialized_engines, 1);
    assert_eq!(summary.status.max_streams, 2);
    assert!(resolver.monitor().latest_report().is_some());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["overall"], "healthy");
    assert!(json["checked_at"].is_string());
}

#[tokio::test]
async fn test_shutdown_stops_monitor_and_cancels_resolution() {
    let calls = call_log();
    let resolver = resolver_with(vec![Arc::new(MockEngine::new(
        "ok",
        10,
        Behavior::Succeed(b"x"),
        &calls,
    ))])
    .await;

    assert!(resolver.start_health_monitor());
    assert!(!resolver.start_health_monitor());

    resolver.shutdown().await;

    let err = resolver.resolve_stream("anything").await.unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
    assert!(calls.lock().is_empty());
}

#[tokio::test]
async fn test_track_info_through_service() {
    let calls = call_log();
    let resolver = resolver_with(vec![Arc::new(MockEngine::new(
        "meta",
        10,
        Behavior::Succeed(b"x"),
        &calls,
    ))])
    .await;

    let info = resolver.get_track_info("some query").await.unwrap();
    assert_eq!(info.title, "meta title");
    assert_eq!(info.origin_url, "some query");
}
