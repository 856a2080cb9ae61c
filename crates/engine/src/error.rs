use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands, timeline edits and persistence.
#[derive(Debug)]
pub enum EngineError {
    /// The backend job was rejected or could not be run.
    BackendCallFailed {
        message: String,
    },
    /// An edit referenced clips that do not match the current timeline.
    InvalidTimelineState {
        reason: String,
    },
    /// A stored value failed to parse or violates timeline ordering.
    MalformedPersistedState {
        key: &'static str,
        reason: String,
    },
    InputNotSelected,
    StoreIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    StoreSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    Detector(detector_process::DetectorError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendCallFailed { message } => write!(f, "backend call failed: {message}"),
            Self::InvalidTimelineState { reason } => {
                write!(f, "invalid timeline state: {reason}")
            }
            Self::MalformedPersistedState { key, reason } => {
                write!(f, "malformed persisted state under `{key}`: {reason}")
            }
            Self::InputNotSelected => write!(f, "no input video selected"),
            Self::StoreIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::StoreSerialization { path, source } => {
                write!(
                    f,
                    "store serialization/deserialization failed at {} ({source})",
                    path.display()
                )
            }
            Self::Detector(err) => write!(f, "detector error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StoreIo { source, .. } => Some(source),
            Self::StoreSerialization { source, .. } => Some(source),
            Self::Detector(err) => Some(err),
            _ => None,
        }
    }
}

impl From<detector_process::DetectorError> for EngineError {
    fn from(value: detector_process::DetectorError) -> Self {
        Self::Detector(value)
    }
}
