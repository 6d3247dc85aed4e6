use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use facerelay::{PipelineConfig, PipelineConfigBuilder};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use once_cell::sync::Lazy;
use serde_json::json;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Pure colors the marker detector reports as faces.
pub const MARKERS: [[u8; 3]; 3] = [[255, 0, 0], [0, 255, 0], [0, 0, 255]];

/// PNG bytes of a gray canvas with one marker patch per face.
pub fn png_with_faces(faces: usize) -> Vec<u8> {
    let mut canvas = RgbImage::from_pixel(48, 24, Rgb([120, 120, 120]));
    for (slot, marker) in MARKERS.iter().take(faces).enumerate() {
        let origin = 3 + slot as u32 * 15;
        for x in origin..origin + 8 {
            for y in 6..14 {
                canvas.put_pixel(x, y, Rgb(*marker));
            }
        }
    }

    let mut buffer = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("fixture should encode");
    buffer.into_inner()
}

/// Writes attachments next to a `current.json` manifest and returns its path.
pub fn write_message(
    dir: &Path,
    id: &str,
    subject: &str,
    attachments: &[(&str, Vec<u8>)],
) -> Result<PathBuf> {
    let mut names = Vec::with_capacity(attachments.len());
    for (name, bytes) in attachments {
        std::fs::write(dir.join(name), bytes)?;
        names.push(*name);
    }

    let manifest = json!({
        "id": id,
        "from": "Grace Hopper <grace@example.com>",
        "date": "Tue, Oct 15, 2024, 9:30 AM",
        "subject": subject,
        "attachments": names,
    });
    let path = dir.join("current.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
    Ok(path)
}

/// Config rooted in `dir`: models, store and staging files all live there.
pub fn builder_in(dir: &Path, idle: Duration) -> Result<PipelineConfigBuilder> {
    std::fs::create_dir_all(dir.join("models"))?;
    Ok(PipelineConfig::builder()
        .model_dir(dir.join("models"))
        .store_path(dir.join("records.json"))
        .staging_path(dir.join("staged.json"))
        .idle_timeout(idle)
        .request_timeout(Duration::from_secs(5))
        .retry_initial_backoff(Duration::from_millis(5))
        .retry_max_backoff(Duration::from_millis(20)))
}

pub fn config_in(dir: &Path, idle: Duration) -> Result<PipelineConfig> {
    builder_in(dir, idle)?.build()
}

pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("{what} did not happen within {timeout:?}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}
