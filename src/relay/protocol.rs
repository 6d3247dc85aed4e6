//! Typed messages exchanged between the orchestrator, the relay, and the
//! detection context.

use crate::record::ImageBlob;
use serde::{Deserialize, Serialize};

/// Orchestrator -> relay: `{ "kind": "processImages", "images": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RelayRequest {
    ProcessImages { images: Vec<ImageBlob> },
}

/// Relay -> orchestrator. Serialized as `{ "success": true, "croppedFaces": [...] }`
/// or `{ "success": false, "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    Success {
        success: Succeeded,
        #[serde(rename = "croppedFaces")]
        cropped_faces: Vec<ImageBlob>,
    },
    Failure {
        success: Failed,
        error: String,
    },
}

impl RelayResponse {
    pub fn success(cropped_faces: Vec<ImageBlob>) -> Self {
        RelayResponse::Success {
            success: Succeeded,
            cropped_faces,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        RelayResponse::Failure {
            success: Failed,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayResponse::Success { .. })
    }

    pub fn into_result(self) -> Result<Vec<ImageBlob>, String> {
        match self {
            RelayResponse::Success { cropped_faces, .. } => Ok(cropped_faces),
            RelayResponse::Failure { error, .. } => Err(error),
        }
    }
}

/// Literal `true` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Succeeded;

/// Literal `false` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failed;

macro_rules! bool_literal {
    ($ty:ident, $value:literal) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if bool::deserialize(deserializer)? == $value {
                    Ok($ty)
                } else {
                    Err(serde::de::Error::custom(concat!("expected success = ", $value)))
                }
            }
        }
    };
}

bool_literal!(Succeeded, true);
bool_literal!(Failed, false);

/// Relay -> detection context: `{ "kind": "offscreenProcess", "imageDataUrls": [...] }`.
/// The context answers with a bare list of crops, empty on internal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContextMessage {
    OffscreenProcess {
        #[serde(rename = "imageDataUrls")]
        image_data_urls: Vec<ImageBlob>,
    },
}

impl ContextMessage {
    pub fn offscreen_process(images: Vec<ImageBlob>) -> Self {
        ContextMessage::OffscreenProcess {
            image_data_urls: images,
        }
    }

    pub fn into_images(self) -> Vec<ImageBlob> {
        match self {
            ContextMessage::OffscreenProcess { image_data_urls } => image_data_urls,
        }
    }
}
