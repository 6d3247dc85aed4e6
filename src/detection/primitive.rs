use anyhow::Result;
use futures::future::BoxFuture;
use image::DynamicImage;
use std::path::Path;

pub type DetectorFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// Pixel-space bounding box of one detected face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Face-detection primitive hosted inside a detection context.
///
/// The pipeline treats the algorithm as a black box: it only asks for models
/// to be loaded from the bundled location and for faces in a decoded image.
pub trait FaceDetector: Send + Sync + 'static {
    /// Loads detection models. Called before the first detection of a context
    /// lifetime, and again on the next request if a previous load failed.
    fn load_models<'a>(&'a self, model_dir: &'a Path) -> DetectorFuture<'a, ()>;

    /// Finds faces in `image`. Called on a runtime worker thread; an
    /// implementation doing heavy inference should run it through
    /// `tokio::task::spawn_blocking` (or its own thread pool) and await it.
    /// Cropping and encoding of the returned regions already happen off the
    /// runtime threads.
    fn detect<'a>(&'a self, image: &'a DynamicImage) -> DetectorFuture<'a, Vec<FaceRegion>>;
}

/// Builds a fresh detector for every detection context so loaded models are
/// dropped together with the context that owned them.
pub trait DetectorFactory: Send + Sync + 'static {
    fn create(&self) -> Box<dyn FaceDetector>;
}

impl<F, D> DetectorFactory for F
where
    F: Fn() -> D + Send + Sync + 'static,
    D: FaceDetector,
{
    fn create(&self) -> Box<dyn FaceDetector> {
        Box::new(self())
    }
}
