use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use facerelay::{DetectorFuture, FaceDetector, FaceRegion};
use image::{DynamicImage, RgbImage};
use tokio::sync::Notify;

use super::helpers::MARKERS;

/// Counters shared by every detector a factory hands out.
#[derive(Default)]
pub struct DetectorStats {
    pub loads: AtomicUsize,
    pub detections: AtomicUsize,
    /// Model loads still to fail before one succeeds.
    pub load_failures: AtomicUsize,
}

impl DetectorStats {
    pub fn failing_first_loads(failures: usize) -> Self {
        let stats = Self::default();
        stats.load_failures.store(failures, Ordering::SeqCst);
        stats
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

/// Reports every pure red, green or blue patch as one face.
pub struct MarkerDetector {
    stats: Arc<DetectorStats>,
}

impl MarkerDetector {
    pub fn new(stats: Arc<DetectorStats>) -> Self {
        Self { stats }
    }
}

impl FaceDetector for MarkerDetector {
    fn load_models<'a>(&'a self, model_dir: &'a Path) -> DetectorFuture<'a, ()> {
        Box::pin(async move {
            if !model_dir.is_dir() {
                bail!("models missing from {}", model_dir.display());
            }
            self.stats.loads.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .stats
                .load_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                bail!("model weights in {} are truncated", model_dir.display());
            }
            Ok(())
        })
    }

    fn detect<'a>(&'a self, image: &'a DynamicImage) -> DetectorFuture<'a, Vec<FaceRegion>> {
        Box::pin(async move {
            self.stats.detections.fetch_add(1, Ordering::SeqCst);
            Ok(marker_regions(&image.to_rgb8()))
        })
    }
}

/// Like [`MarkerDetector`] but every detection waits for `release`, announcing
/// itself on `entered` first.
pub struct GatedDetector {
    inner: MarkerDetector,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedDetector {
    pub fn new(stats: Arc<DetectorStats>, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            inner: MarkerDetector::new(stats),
            entered,
            release,
        }
    }
}

impl FaceDetector for GatedDetector {
    fn load_models<'a>(&'a self, model_dir: &'a Path) -> DetectorFuture<'a, ()> {
        self.inner.load_models(model_dir)
    }

    fn detect<'a>(&'a self, image: &'a DynamicImage) -> DetectorFuture<'a, Vec<FaceRegion>> {
        Box::pin(async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.detect(image).await
        })
    }
}

fn marker_regions(image: &RgbImage) -> Vec<FaceRegion> {
    MARKERS
        .iter()
        .filter_map(|marker| {
            let mut bounds: Option<(u32, u32, u32, u32)> = None;
            for (x, y, pixel) in image.enumerate_pixels() {
                if pixel.0 == *marker {
                    bounds = Some(match bounds {
                        None => (x, y, x, y),
                        Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                    });
                }
            }
            bounds.map(|(x0, y0, x1, y1)| FaceRegion::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
        })
        .collect()
}
