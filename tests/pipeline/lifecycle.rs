use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    detectors::{DetectorStats, GatedDetector, MarkerDetector},
    helpers::{builder_in, config_in, init_tracing, png_with_faces, wait_until, write_message},
    hosts::CountingHost,
};
use anyhow::Result;
use facerelay::{
    ContextLifecycleManager, ContextPhase, DetectionOutcome, ImageBlob, ManifestExtractor,
    PipelineConfig, ProcessingError, Runner, TaskHost, Telemetry,
};
use futures::future::join_all;
use tokio::sync::Notify;
use tokio::time::timeout;

fn marker_host(
    config: &PipelineConfig,
    stats: &Arc<DetectorStats>,
    telemetry: &Arc<Telemetry>,
) -> TaskHost {
    let factory_stats = Arc::clone(stats);
    TaskHost::from_config(
        config,
        Arc::new(move || MarkerDetector::new(Arc::clone(&factory_stats))),
        Arc::clone(telemetry),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_create_one_context() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path(), Duration::from_secs(10))?;
    let telemetry = Arc::new(Telemetry::default());
    let stats = Arc::new(DetectorStats::default());
    let host = Arc::new(
        CountingHost::new(Arc::new(marker_host(&config, &stats, &telemetry)))
            .with_delay(Duration::from_millis(50)),
    );
    let manager = Arc::new(ContextLifecycleManager::new(
        host.clone(),
        Arc::clone(&telemetry),
    ));

    let waiters = (0..16).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.ensure_context().await })
    });
    let mut ids = Vec::new();
    for joined in join_all(waiters).await {
        ids.push(joined??.id());
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "every caller must see the same context");
    assert_eq!(host.attempts(), 1);
    assert_eq!(telemetry.snapshot().contexts_created, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_teardown_recreates_context_and_reloads_models() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e5", "Idle", &[("a.png", png_with_faces(1))])?;
    let stats = Arc::new(DetectorStats::default());
    let factory_stats = Arc::clone(&stats);
    let runner = Runner::new(
        config_in(dir.path(), Duration::from_millis(100))?,
        Arc::new(ManifestExtractor::new(dir.path().join("current.json"))),
        Arc::new(move || MarkerDetector::new(Arc::clone(&factory_stats))),
    );

    runner.run_cycle().await?;
    assert_eq!(stats.loads(), 1);

    let lifecycle = Arc::clone(runner.relay().lifecycle());
    wait_until("idle teardown", Duration::from_secs(3), || {
        lifecycle.phase() == ContextPhase::Absent
    })
    .await?;

    let report = runner.run_cycle().await?;
    assert_eq!(report.detection, DetectionOutcome::Completed { faces: 1 });
    assert_eq!(stats.loads(), 2, "a recreated context loads its models again");

    let snapshot = runner.telemetry().snapshot();
    assert_eq!(snapshot.contexts_created, 2);
    assert!(snapshot.context_teardowns >= 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn teardown_mid_flight_keeps_record_with_empty_faces() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(
        dir.path(),
        "e6",
        "Disconnected",
        &[("a.png", png_with_faces(2))],
    )?;

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let stats = Arc::new(DetectorStats::default());
    let (factory_entered, factory_release) = (Arc::clone(&entered), Arc::clone(&release));
    let runner = Runner::new(
        config_in(dir.path(), Duration::from_secs(10))?,
        Arc::new(ManifestExtractor::new(dir.path().join("current.json"))),
        Arc::new(move || {
            GatedDetector::new(
                Arc::clone(&stats),
                Arc::clone(&factory_entered),
                Arc::clone(&factory_release),
            )
        }),
    );

    let orchestrator = Arc::clone(runner.orchestrator());
    let cycle = tokio::spawn(async move { orchestrator.run_cycle().await });

    timeout(Duration::from_secs(3), entered.notified()).await?;
    assert!(runner.relay().lifecycle().teardown());

    let report = timeout(Duration::from_secs(3), cycle).await???;
    assert!(matches!(
        report.detection,
        DetectionOutcome::Failed(ProcessingError::Transport { .. })
    ));
    assert!(runner.status().current().is_error());

    let records = runner.records().await?;
    assert_eq!(records.len(), 1);
    assert!(records[0].cropped_faces.is_empty());
    assert_eq!(records[0].subject.as_deref(), Some("Disconnected"));
    assert_eq!(records[0].images.len(), 1);
    release.notify_one();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_creation_is_retried_by_next_cycle() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e7", "Refused", &[("a.png", png_with_faces(1))])?;
    let config = config_in(dir.path(), Duration::from_secs(10))?;
    let telemetry = Arc::new(Telemetry::default());
    let stats = Arc::new(DetectorStats::default());
    let host = Arc::new(
        CountingHost::new(Arc::new(marker_host(&config, &stats, &telemetry))).refusing_first(1),
    );
    let runner = Runner::with_host(
        config,
        Arc::new(ManifestExtractor::new(dir.path().join("current.json"))),
        host.clone(),
        telemetry,
    );

    let first = runner.run_cycle().await?;
    assert!(matches!(
        first.detection,
        DetectionOutcome::Failed(ProcessingError::ContextCreation { .. })
    ));
    assert!(first.record.is_some_and(|record| record.cropped_faces.is_empty()));
    assert_eq!(runner.relay().lifecycle().phase(), ContextPhase::Absent);

    let second = runner.run_cycle().await?;
    assert_eq!(second.detection, DetectionOutcome::Completed { faces: 1 });
    assert_eq!(host.attempts(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn orchestrator_retry_budget_covers_refused_creation() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e8", "Retried", &[("a.png", png_with_faces(2))])?;
    let config = builder_in(dir.path(), Duration::from_secs(10))?
        .detection_attempts(2)
        .build()?;
    let telemetry = Arc::new(Telemetry::default());
    let stats = Arc::new(DetectorStats::default());
    let host = Arc::new(
        CountingHost::new(Arc::new(marker_host(&config, &stats, &telemetry))).refusing_first(1),
    );
    let runner = Runner::with_host(
        config,
        Arc::new(ManifestExtractor::new(dir.path().join("current.json"))),
        host.clone(),
        telemetry,
    );

    let report = runner.run_cycle().await?;
    assert_eq!(report.detection, DetectionOutcome::Completed { faces: 2 });
    assert_eq!(host.attempts(), 2);
    assert_eq!(runner.relay().metrics().total_errors, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relay_json_endpoint_round_trip() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let stats = Arc::new(DetectorStats::default());
    let factory_stats = Arc::clone(&stats);
    let runner = Runner::new(
        config_in(dir.path(), Duration::from_secs(10))?,
        Arc::new(ManifestExtractor::new(dir.path().join("current.json"))),
        Arc::new(move || MarkerDetector::new(Arc::clone(&factory_stats))),
    );

    let image = ImageBlob::from_bytes("image/png", &png_with_faces(2));
    let request = serde_json::json!({ "kind": "processImages", "images": [image] }).to_string();
    let response = serde_json::to_value(runner.relay().handle_json(&request).await)?;
    assert_eq!(response["success"], true);
    assert_eq!(response["croppedFaces"].as_array().map(Vec::len), Some(2));

    let rejected = serde_json::to_value(runner.relay().handle_json("{}").await)?;
    assert_eq!(rejected["success"], false);
    assert!(rejected["error"].as_str().is_some());
    Ok(())
}
