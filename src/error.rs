//! Error types shared by the coordinators and the file manager service

use crate::model::{ItemId, JobId};
use thiserror::Error;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The server rejected the session (401). The session provider has
    /// already been invalidated when this is returned.
    #[error("session rejected by server")]
    Unauthorized,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("server returned an empty response")]
    EmptyResponse,

    #[error("bundle request did not return a bundle name")]
    EmptyBundle,

    #[error("service does not support {0}")]
    Unsupported(&'static str),

    #[error("an upload is already in progress")]
    UploadInProgress,

    #[error("no pending files to upload")]
    NothingToUpload,

    #[error("no files selected")]
    EmptySelection,

    #[error("unknown transfer item {0}")]
    UnknownItem(ItemId),

    #[error("transfer item {0} has not finished")]
    ItemInFlight(ItemId),

    #[error("unknown download job {0}")]
    UnknownJob(JobId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransferError::Unauthorized)
    }
}
