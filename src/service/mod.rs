//! File manager service contract
//!
//! The coordinators only talk to the server through these traits:
//! - `FileManagerService`: queries, uploads, deletes and folder inserts
//! - `DownloadCapability`: optional, single file and bundle downloads
//! - `RenameCapability`: optional, file renames
//!
//! Optional capabilities are discovered through `downloads()` / `renames()`
//! returning `Some`.

mod http;

pub use http::HttpFileManagerService;

use crate::error::TransferResult;
use crate::model::{FileEntry, FileSource, QueryFilter};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Byte counters reported while a request body or response is transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl ByteProgress {
    /// `round(loaded * 100 / total)`, only when the total is known
    pub fn percent(&self) -> Option<u32> {
        match self.total {
            Some(total) if total > 0 => {
                Some(((self.loaded as f64 * 100.0) / total as f64).round() as u32)
            }
            _ => None,
        }
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ByteProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ByteProgress>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// One file part of an upload request
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub source: FileSource,
}

#[async_trait]
pub trait FileManagerService: Send + Sync {
    async fn query_files(
        &self,
        workspace_id: &str,
        filter: &QueryFilter,
        columns: &[String],
    ) -> TransferResult<Vec<FileEntry>>;

    /// Send `files` in a single request, reporting body progress on `progress`
    async fn upload(
        &self,
        workspace_id: &str,
        folder_id: Option<&str>,
        files: Vec<UploadFile>,
        progress: ProgressSender,
    ) -> TransferResult<Value>;

    async fn delete_files(&self, workspace_id: &str, files: &[FileEntry]) -> TransferResult<Value>;

    async fn insert_folder(
        &self,
        workspace_id: &str,
        name: &str,
        attributes: &QueryFilter,
    ) -> TransferResult<Value>;

    fn downloads(&self) -> Option<&dyn DownloadCapability> {
        None
    }

    fn renames(&self) -> Option<&dyn RenameCapability> {
        None
    }
}

#[async_trait]
pub trait DownloadCapability: Send + Sync {
    /// Fetch one plain file into `destination` (a directory); returns the saved path
    async fn fetch_file(
        &self,
        file: &FileEntry,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf>;

    /// Ask the server to bundle `files`; returns the bundle name if one was produced
    async fn create_bundle(
        &self,
        workspace_id: &str,
        files: &[FileEntry],
    ) -> TransferResult<Option<String>>;

    async fn fetch_bundle(
        &self,
        bundle_name: &str,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf>;
}

#[async_trait]
pub trait RenameCapability: Send + Sync {
    async fn change_file_name(&self, new_name: &str, file: &FileEntry) -> TransferResult<Value>;
}

/// Drive one service call to completion.
///
/// Progress is forwarded to `on_progress` in emission order, including any
/// still buffered when the call returns. Returns `None` when `token` is
/// cancelled first; the call future is dropped, which aborts the request.
pub(crate) async fn drive<T, F>(
    call: F,
    token: &CancellationToken,
    progress: &mut ProgressReceiver,
    mut on_progress: impl FnMut(ByteProgress),
) -> Option<TransferResult<T>>
where
    F: Future<Output = TransferResult<T>>,
{
    tokio::pin!(call);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            Some(update) = progress.recv() => on_progress(update),
            result = &mut call => {
                while let Ok(update) = progress.try_recv() {
                    on_progress(update);
                }
                return Some(result);
            }
        }
    }
}
