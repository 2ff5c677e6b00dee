use thiserror::Error;

use crate::domain::MediaKind;

/// Detail recorded on a failed job when the request never got a response.
pub const NETWORK_FAILURE_MESSAGE: &str = "Network request failed; check the connection and retry";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaLoadError {
    #[error("failed to open {kind} source '{uri}': {reason}")]
    Open {
        kind: MediaKind,
        uri: String,
        reason: String,
    },
    #[error("load of '{uri}' was superseded by a newer request")]
    Superseded { uri: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported media type for '{uri}'")]
pub struct UnsupportedMediaType {
    pub uri: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fullscreen presentation failed: {reason}")]
pub struct FullscreenPresentationError {
    pub reason: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineCommandError {
    #[error("no media loaded")]
    NoMedia,
    #[error("media generation {requested} is no longer active (current {current})")]
    Stale { requested: u64, current: u64 },
    #[error("engine rejected command: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Network(String),
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
    #[error("invalid response from translation service: {0}")]
    InvalidResponse(String),
    #[error("could not read media '{uri}': {reason}")]
    MediaRead { uri: String, reason: String },
    #[error("invalid translation endpoint: {0}")]
    Endpoint(String),
}

impl TranslationError {
    /// Text stored as the failed job's `error`. Server bodies are kept
    /// verbatim; transport failures collapse to one generic message.
    pub fn job_detail(&self) -> String {
        match self {
            TranslationError::Server { detail, .. } => detail.clone(),
            TranslationError::Network(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
