//! Upload item and event types

use crate::model::{FileSource, ItemId, RequestId};
use crate::service::{ByteProgress, UploadFile};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "uploaded")]
    Uploaded,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "errored")]
    Errored,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Uploaded | ItemStatus::Cancelled | ItemStatus::Errored
        )
    }

    fn can_become(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::Uploading)
                | (ItemStatus::Pending, ItemStatus::Cancelled)
                | (ItemStatus::Uploading, ItemStatus::Uploaded)
                | (ItemStatus::Uploading, ItemStatus::Errored)
                | (ItemStatus::Uploading, ItemStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Uploading => write!(f, "uploading"),
            ItemStatus::Uploaded => write!(f, "uploaded"),
            ItemStatus::Cancelled => write!(f, "cancelled"),
            ItemStatus::Errored => write!(f, "errored"),
        }
    }
}

/// One file selected for upload
#[derive(Debug, Clone)]
pub struct TransferItem {
    id: ItemId,
    name: String,
    source: FileSource,
    folder_id: Option<String>,
    status: ItemStatus,
    loaded: u64,
    total: Option<u64>,
    request: Option<RequestId>,
    error: Option<String>,
    created_at: i64,
}

impl TransferItem {
    pub fn new(name: impl Into<String>, source: FileSource) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            source,
            folder_id: None,
            status: ItemStatus::Pending,
            loaded: 0,
            total: None,
            request: None,
            error: None,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Item reading from a file on disk, named after the file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self::new(name, FileSource::Path(path))
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::new(name, FileSource::Memory(bytes.into()))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn percent(&self) -> Option<u32> {
        ByteProgress {
            loaded: self.loaded,
            total: self.total,
        }
        .percent()
    }

    /// Request currently (or last) carrying this item
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Still waiting for, or taking part in, a request
    pub fn is_pending_upload(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Apply a status change. Returns `false` and leaves the item untouched
    /// when the change is not allowed, e.g. from a terminal status.
    pub(crate) fn transition(&mut self, next: ItemStatus) -> bool {
        if !self.status.can_become(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn attach(&mut self, request: RequestId, folder_id: Option<String>) {
        self.request = Some(request);
        self.folder_id = folder_id;
    }

    pub(crate) fn record_progress(&mut self, progress: ByteProgress) {
        self.loaded = progress.loaded;
        self.total = progress.total;
    }

    pub(crate) fn record_error(&mut self, error: String) {
        self.error = Some(error);
    }

    pub(crate) fn upload_file(&self) -> UploadFile {
        UploadFile {
            name: self.name.clone(),
            source: self.source.clone(),
        }
    }
}

/// Event emitted on the receiver returned by `UploadCoordinator::upload`.
///
/// Every request produces zero or more `Progress` events followed by exactly
/// one of the other variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    Progress {
        request: RequestId,
        loaded: u64,
        total: Option<u64>,
        percent: Option<u32>,
    },
    Uploaded {
        request: RequestId,
        items: Vec<ItemId>,
        response: Value,
    },
    Failed {
        request: RequestId,
        items: Vec<ItemId>,
        error: String,
    },
    Cancelled {
        request: RequestId,
        items: Vec<ItemId>,
    },
    SessionExpired {
        request: RequestId,
        items: Vec<ItemId>,
    },
}

impl UploadEvent {
    pub fn request(&self) -> RequestId {
        match self {
            UploadEvent::Progress { request, .. }
            | UploadEvent::Uploaded { request, .. }
            | UploadEvent::Failed { request, .. }
            | UploadEvent::Cancelled { request, .. }
            | UploadEvent::SessionExpired { request, .. } => *request,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress { .. })
    }
}
