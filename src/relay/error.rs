use std::fmt;
use std::time::Duration;

/// Failure of a relay round trip. Never retried inside the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The host refused to create a detection context.
    ContextCreation { cause: String },
    /// The context disappeared before answering, or never accepted the request.
    Transport { cause: String },
    /// The context answered, but could not load its detection models.
    ModelLoad { cause: String },
    /// The context shut down before it accepted the request. The batch was
    /// never looked at, so it can be sent to a fresh context.
    Retired { context: u64 },
    Timeout { after: Duration },
}

impl ProcessingError {
    pub fn transport(cause: impl Into<String>) -> Self {
        ProcessingError::Transport {
            cause: cause.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessingError::Timeout { .. })
    }

    pub fn is_retired(&self) -> bool {
        matches!(self, ProcessingError::Retired { .. })
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingError::ContextCreation { cause } => {
                write!(f, "could not start the detection context: {cause}")
            }
            ProcessingError::Transport { cause } => {
                write!(f, "detection context did not respond: {cause}")
            }
            ProcessingError::ModelLoad { cause } => {
                write!(f, "detection models failed to load: {cause}")
            }
            ProcessingError::Retired { context } => {
                write!(f, "detection context {context} shut down before accepting the request")
            }
            ProcessingError::Timeout { after } => {
                write!(f, "detection context timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for ProcessingError {}
