use super::codec;
use super::primitive::{FaceDetector, FaceRegion};
use crate::record::ImageBlob;
use crate::runtime::telemetry::Telemetry;
use image::DynamicImage;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug)]
pub enum DetectionError {
    ModelLoad { cause: String },
    Decode { index: usize, cause: String },
    Detect { index: usize, cause: String },
    Encode { index: usize, cause: String },
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::ModelLoad { cause } => {
                write!(f, "failed to load detection models: {cause}")
            }
            DetectionError::Decode { index, cause } => {
                write!(f, "image {index} could not be decoded: {cause}")
            }
            DetectionError::Detect { index, cause } => {
                write!(f, "face detection failed on image {index}: {cause}")
            }
            DetectionError::Encode { index, cause } => {
                write!(f, "failed to encode a face cropped from image {index}: {cause}")
            }
        }
    }
}

impl std::error::Error for DetectionError {}

/// Wraps the detection primitive for the lifetime of one detection context.
///
/// Models are loaded on the first batch. A failed load leaves
/// `models_loaded` unset, so the following batch tries again instead of the
/// worker staying broken until its context is recycled.
pub struct DetectionWorker {
    detector: Box<dyn FaceDetector>,
    model_dir: PathBuf,
    models_loaded: bool,
    telemetry: Arc<Telemetry>,
}

impl DetectionWorker {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        model_dir: impl Into<PathBuf>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            detector,
            model_dir: model_dir.into(),
            models_loaded: false,
            telemetry,
        }
    }

    pub fn models_loaded(&self) -> bool {
        self.models_loaded
    }

    /// Runs detection over every image and returns all crops as one flat list,
    /// in input order.
    ///
    /// Only a model-load failure fails the call. An image that cannot be
    /// decoded, analysed or cropped is logged and contributes no faces.
    pub async fn process_images(
        &mut self,
        images: &[ImageBlob],
    ) -> Result<Vec<ImageBlob>, DetectionError> {
        self.ensure_models().await?;

        let mut crops = Vec::new();
        for (index, blob) in images.iter().enumerate() {
            match self.process_image(index, blob).await {
                Ok(mut faces) => crops.append(&mut faces),
                Err(err) => {
                    self.telemetry.record_image_failed();
                    tracing::warn!(index, error = %err, "skipping image");
                }
            }
        }

        tracing::debug!(
            images = images.len(),
            faces = crops.len(),
            "detection batch finished"
        );
        Ok(crops)
    }

    async fn ensure_models(&mut self) -> Result<(), DetectionError> {
        if self.models_loaded {
            return Ok(());
        }

        let started = Instant::now();
        self.detector
            .load_models(&self.model_dir)
            .await
            .map_err(|err| DetectionError::ModelLoad {
                cause: format!("{err:#}"),
            })?;
        self.models_loaded = true;

        tracing::info!(
            model_dir = %self.model_dir.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detection models loaded"
        );
        Ok(())
    }

    async fn process_image(
        &self,
        index: usize,
        blob: &ImageBlob,
    ) -> Result<Vec<ImageBlob>, DetectionError> {
        let owned = blob.clone();
        let image = tokio::task::spawn_blocking(move || codec::decode_blob(&owned))
            .await
            .map_err(|err| DetectionError::Decode {
                index,
                cause: err.to_string(),
            })?
            .map_err(|err| DetectionError::Decode {
                index,
                cause: format!("{err:#}"),
            })?;

        let regions = self
            .detector
            .detect(&image)
            .await
            .map_err(|err| DetectionError::Detect {
                index,
                cause: format!("{err:#}"),
            })?;

        tokio::task::spawn_blocking(move || extract_faces(index, &image, &regions))
            .await
            .map_err(|err| DetectionError::Encode {
                index,
                cause: err.to_string(),
            })?
    }
}

/// Crops and encodes every region of one decoded image. CPU bound; runs on
/// the blocking pool.
fn extract_faces(
    index: usize,
    image: &DynamicImage,
    regions: &[FaceRegion],
) -> Result<Vec<ImageBlob>, DetectionError> {
    let mut faces = Vec::with_capacity(regions.len());
    for region in regions {
        let Some(crop) = codec::crop_region(image, region) else {
            tracing::debug!(index, ?region, "discarding face region outside the image");
            continue;
        };
        let encoded = codec::encode_png(&crop).map_err(|err| DetectionError::Encode {
            index,
            cause: format!("{err:#}"),
        })?;
        faces.push(encoded);
    }
    Ok(faces)
}
