//! Failure taxonomy for the merge pipeline.
//!
//! Each stage has its own error enum; [`MergeFailure`] is what a job terminates with.
//! Every failure carries a stable `reason_code()` for machine consumers, and trigger
//! adapters decide how much of it reaches end users.

use dubmix_core::{AppError, TrackRole};
use dubmix_db::CatalogError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Network error while fetching media: {0}")]
    NetworkError(String),

    #[error("Invalid media reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error("Failed to decode input: {0}")]
    Decode(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("Mux failed: {0}")]
    Mux(String),

    #[error("Engine did not finish within {after_secs}s")]
    Timeout { after_secs: u64 },
}

/// Errors reported by a [`crate::MuxEngine`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be started at all. An environment defect, never retried.
    #[error("Media engine unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Mux(#[from] MuxError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Publish failed after {attempts} attempt(s): {message}")]
    Exhausted { attempts: u32, message: String },

    #[error("Failed to remove published artifact {key}: {message}")]
    Unpublish { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum MergeFailure {
    #[error("Invalid merge input: {0}")]
    InvalidInput(String),

    #[error("Failed to fetch {} track: {source}", .role.as_str())]
    Fetch {
        role: TrackRole,
        #[source]
        source: FetchError,
    },

    #[error("Media engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error(transparent)]
    Mux(MuxError),

    #[error(transparent)]
    Publish(PublishError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error("Recording was already merged into entry {entry_id}")]
    AlreadyConsumed { entry_id: Uuid },

    #[error("A merge for this recording is already running")]
    InFlight,

    #[error("Merge was cancelled")]
    Cancelled,

    #[error("Internal merge error: {0}")]
    Internal(String),
}

impl From<EngineError> for MergeFailure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(msg) => MergeFailure::EngineUnavailable(msg),
            EngineError::Mux(mux) => MergeFailure::Mux(mux),
        }
    }
}

impl From<PublishError> for MergeFailure {
    fn from(err: PublishError) -> Self {
        MergeFailure::Publish(err)
    }
}

impl From<CatalogError> for MergeFailure {
    fn from(err: CatalogError) -> Self {
        MergeFailure::Catalog(err)
    }
}

impl MergeFailure {
    pub fn fetch(role: TrackRole, source: FetchError) -> Self {
        MergeFailure::Fetch { role, source }
    }

    /// Stable machine-readable reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            MergeFailure::InvalidInput(_) => "INVALID_INPUT",
            MergeFailure::Fetch { source, .. } => match source {
                FetchError::NotFound(_) => "FETCH_NOT_FOUND",
                FetchError::NetworkError(_) => "FETCH_NETWORK_ERROR",
                FetchError::InvalidReference(_) => "FETCH_INVALID_REFERENCE",
            },
            MergeFailure::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            MergeFailure::Mux(mux) => match mux {
                MuxError::Decode(_) => "MUX_DECODE",
                MuxError::Encode(_) => "MUX_ENCODE",
                MuxError::Mux(_) => "MUX_FAILED",
                MuxError::Timeout { .. } => "MUX_TIMEOUT",
            },
            MergeFailure::Publish(_) => "PUBLISH_FAILED",
            MergeFailure::Catalog(CatalogError::Duplicate { .. }) => "CATALOG_DUPLICATE",
            MergeFailure::Catalog(_) => "CATALOG_WRITE_FAILED",
            MergeFailure::AlreadyConsumed { .. } => "ALREADY_CONSUMED",
            MergeFailure::InFlight => "IN_FLIGHT",
            MergeFailure::Cancelled => "CANCELLED",
            MergeFailure::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller may retry the same request later with a chance of success.
    pub fn is_retryable(&self) -> bool {
        match self {
            MergeFailure::Fetch { source, .. } => {
                matches!(source, FetchError::NetworkError(_))
            }
            MergeFailure::Publish(_) | MergeFailure::InFlight => true,
            MergeFailure::Catalog(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<MergeFailure> for AppError {
    fn from(err: MergeFailure) -> Self {
        let message = err.to_string();
        match err {
            MergeFailure::InvalidInput(_) => AppError::InvalidInput(message),
            MergeFailure::Fetch { source, .. } => match source {
                FetchError::NotFound(_) => AppError::NotFound(message),
                FetchError::InvalidReference(_) => AppError::InvalidInput(message),
                FetchError::NetworkError(_) => AppError::Storage(message),
            },
            MergeFailure::EngineUnavailable(_) => AppError::EngineUnavailable(message),
            MergeFailure::Mux(MuxError::Timeout { .. }) => AppError::Timeout(message),
            MergeFailure::Mux(_) => AppError::MediaProcessing(message),
            MergeFailure::Publish(_) => AppError::Storage(message),
            MergeFailure::Catalog(err) => err.into(),
            MergeFailure::AlreadyConsumed { .. } | MergeFailure::InFlight => {
                AppError::Conflict(message)
            }
            MergeFailure::Cancelled | MergeFailure::Internal(_) => AppError::Internal(message),
        }
    }
}
