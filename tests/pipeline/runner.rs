use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    detectors::{DetectorStats, MarkerDetector},
    helpers::{config_in, init_tracing, png_with_faces, write_message},
};
use anyhow::Result;
use facerelay::{ContextPhase, ManifestExtractor, RecordId, Runner};
use tokio::time::timeout;

fn runner_in(dir: &std::path::Path, stats: &Arc<DetectorStats>) -> Result<Runner> {
    let factory_stats = Arc::clone(stats);
    Ok(Runner::new(
        config_in(dir, Duration::from_secs(10))?,
        Arc::new(ManifestExtractor::new(dir.join("current.json"))),
        Arc::new(move || MarkerDetector::new(Arc::clone(&factory_stats))),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn staged_record_survives_restart_and_is_read_once() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e9", "Handoff", &[("a.png", png_with_faces(1))])?;
    let stats = Arc::new(DetectorStats::default());

    let mut producer = runner_in(dir.path(), &stats)?;
    producer.start().await?;
    producer.run_cycle().await?;
    assert!(producer
        .stage_for_fill(&RecordId::new("e9"))
        .await?
        .is_some());
    producer.stop().await?;

    let consumer = runner_in(dir.path(), &stats)?;
    let fill = consumer
        .take_form_fill()
        .await?
        .expect("record should be staged");
    assert_eq!(fill.email.as_deref(), Some("grace@example.com"));
    assert_eq!(fill.date.as_deref(), Some("10/15/2024"));
    assert_eq!(fill.time.as_deref(), Some("09:30 AM"));
    let upload = fill.upload.expect("first face should be uploaded");
    assert_eq!(upload.filename, "face.png");
    assert!(image::load_from_memory(&upload.bytes).is_ok());

    assert!(consumer.take_form_fill().await?.is_none());
    assert_eq!(consumer.records().await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_then_start_recreates_context() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e10", "Restart", &[("a.png", png_with_faces(2))])?;
    let stats = Arc::new(DetectorStats::default());
    let mut runner = runner_in(dir.path(), &stats)?;

    runner.start().await?;
    runner.run_cycle().await?;
    assert_eq!(runner.relay().lifecycle().phase(), ContextPhase::Ready);

    timeout(Duration::from_secs(3), runner.stop()).await??;
    assert_eq!(runner.relay().lifecycle().phase(), ContextPhase::Absent);

    runner.start().await?;
    let report = runner.run_cycle().await?;
    assert_eq!(report.record.map(|r| r.cropped_faces.len()), Some(2));
    assert_eq!(stats.loads(), 2);
    runner.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_empties_persisted_store() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e11", "Clear me", &[("a.png", png_with_faces(1))])?;
    let stats = Arc::new(DetectorStats::default());
    let runner = runner_in(dir.path(), &stats)?;

    runner.run_cycle().await?;
    assert_eq!(runner.records().await?.len(), 1);

    runner.clear().await?;
    let raw = std::fs::read_to_string(dir.path().join("records.json"))?;
    let stored: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(stored, serde_json::json!([]));
    assert!(runner.stage_for_fill(&RecordId::new("e11")).await?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_token_ends_run_until_ctrl_c() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let stats = Arc::new(DetectorStats::default());
    let mut runner = runner_in(dir.path(), &stats)?;

    let token = runner.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(3), runner.run_until_ctrl_c()).await??;
    canceller.await?;
    assert_eq!(runner.relay().lifecycle().phase(), ContextPhase::Absent);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn export_writes_one_row_per_record() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_message(dir.path(), "e13", "Export me", &[("a.png", png_with_faces(2))])?;
    let stats = Arc::new(DetectorStats::default());
    let runner = runner_in(dir.path(), &stats)?;
    runner.run_cycle().await?;

    let target = dir.path().join("out").join("records.csv");
    assert_eq!(runner.export_csv(&target).await?, 1);

    let text = std::fs::read_to_string(&target)?;
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "Id,Sender,Date,Subject,Images,Faces");
    assert_eq!(
        lines[1],
        r#"e13,Grace Hopper <grace@example.com>,"Tue, Oct 15, 2024, 9:30 AM",Export me,1,2"#
    );
    Ok(())
}
