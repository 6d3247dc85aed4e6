use crate::record::RecordId;
use std::fmt;
use tokio::sync::watch;

/// Last state reached by an extraction cycle, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Extracting,
    Extracted { id: RecordId, images: usize },
    Detecting { images: usize },
    Complete { faces: usize },
    Error { message: String },
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "Ready"),
            Status::Extracting => write!(f, "Extracting email data..."),
            Status::Extracted { id, images } => {
                write!(f, "Extracted {id} with {images} image(s)")
            }
            Status::Detecting { images } => {
                write!(f, "Detecting faces in {images} image(s)...")
            }
            Status::Complete { faces } => {
                write!(f, "Extraction complete, {faces} face(s) found")
            }
            Status::Error { message } => write!(f, "Error: {message}"),
        }
    }
}

/// Publishes [`Status`] updates; any number of observers can subscribe.
#[derive(Debug)]
pub struct StatusIndicator {
    tx: watch::Sender<Status>,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::Idle);
        Self { tx }
    }

    pub fn set(&self, status: Status) {
        if status.is_error() {
            tracing::warn!(status = %status, "status changed");
        } else {
            tracing::info!(status = %status, "status changed");
        }
        self.tx.send_replace(status);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.set(Status::Error {
            message: message.into(),
        });
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }
}
