//! Folder browsing on top of the service and the navigation stack

use crate::download::{DownloadCoordinator, DownloadEvent};
use crate::error::{TransferError, TransferResult};
use crate::model::{FileEntry, JobId, QueryFilter, TargetContext};
use crate::navigation::NavigationStateStack;
use crate::service::FileManagerService;
use crate::upload::{UploadCoordinator, UploadEvent};
use log::info;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The file table of one workspace.
///
/// Mutations reload the current folder once the server accepted them.
pub struct FileBrowser {
    service: Arc<dyn FileManagerService>,
    workspace_id: String,
    columns: Vec<String>,
    navigation: NavigationStateStack,
    entries: Vec<FileEntry>,
}

impl FileBrowser {
    pub fn new(service: Arc<dyn FileManagerService>, workspace_id: impl Into<String>) -> Self {
        Self {
            service,
            workspace_id: workspace_id.into(),
            columns: Vec::new(),
            navigation: NavigationStateStack::new(),
            entries: Vec::new(),
        }
    }

    /// Columns requested with every query
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn navigation(&self) -> &NavigationStateStack {
        &self.navigation
    }

    /// Rows of the last successful query
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Workspace and folder currently displayed
    pub fn target(&self) -> TargetContext {
        TargetContext {
            workspace_id: self.workspace_id.clone(),
            folder_id: self.navigation.current_folder_id(),
        }
    }

    pub async fn query(&mut self, filter: QueryFilter) -> TransferResult<Vec<FileEntry>> {
        let entries = self
            .service
            .query_files(&self.workspace_id, &filter, &self.columns)
            .await?;
        self.entries = entries.clone();
        Ok(entries)
    }

    pub async fn reload(&mut self) -> TransferResult<Vec<FileEntry>> {
        self.query(self.navigation.current()).await
    }

    /// Enter `entry` and list its children. `None` for plain files.
    pub async fn open_folder(&mut self, entry: &FileEntry) -> TransferResult<Option<Vec<FileEntry>>> {
        if !entry.directory {
            return Ok(None);
        }
        let filter = self
            .navigation
            .push(entry.children_filter(), Some(entry.clone()));
        match self.query(filter).await {
            Ok(entries) => Ok(Some(entries)),
            Err(err) => {
                self.step_back();
                Err(err)
            }
        }
    }

    /// Drop the frame pushed for a folder that could not be listed
    fn step_back(&self) {
        match self.navigation.len() {
            0 | 1 => self.navigation.reset(),
            depth => {
                self.navigation.truncate_to(depth - 2);
            }
        }
    }

    /// Breadcrumb click. `None` when `index` is not on the trail.
    pub async fn go_to(&mut self, index: usize) -> TransferResult<Option<Vec<FileEntry>>> {
        match self.navigation.truncate_to(index) {
            Some(filter) => self.query(filter).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn go_home(&mut self) -> TransferResult<Vec<FileEntry>> {
        self.navigation.reset();
        self.reload().await
    }

    pub async fn rename(&mut self, file: &FileEntry, new_name: &str) -> TransferResult<Value> {
        let renames = self
            .service
            .renames()
            .ok_or(TransferError::Unsupported("rename"))?;
        info!("rename: {} -> {}", file.name, new_name);
        let response = renames.change_file_name(new_name, file).await?;
        self.reload().await?;
        Ok(response)
    }

    pub async fn delete(&mut self, files: &[FileEntry]) -> TransferResult<Value> {
        info!("delete: {} file(s)", files.len());
        let response = self.service.delete_files(&self.workspace_id, files).await?;
        self.reload().await?;
        Ok(response)
    }

    /// Create a folder inside the current one
    pub async fn create_folder(&mut self, name: &str) -> TransferResult<Value> {
        info!("create_folder: {}", name);
        let attributes = self.navigation.current();
        let response = self
            .service
            .insert_folder(&self.workspace_id, name, &attributes)
            .await?;
        self.reload().await?;
        Ok(response)
    }

    /// Upload every pending item into the current folder
    pub fn upload_pending(
        &self,
        uploads: &UploadCoordinator,
    ) -> TransferResult<mpsc::UnboundedReceiver<UploadEvent>> {
        uploads.upload(&self.target())
    }

    /// Drain the events of an upload started with `upload_pending`,
    /// reloading the current folder after every uploaded request
    pub async fn follow_upload(
        &mut self,
        mut events: mpsc::UnboundedReceiver<UploadEvent>,
    ) -> TransferResult<Vec<UploadEvent>> {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            if matches!(event, UploadEvent::Uploaded { .. }) {
                self.reload().await?;
            }
            seen.push(event);
        }
        Ok(seen)
    }

    pub fn download_selection(
        &self,
        downloads: &DownloadCoordinator,
        selected: Vec<FileEntry>,
    ) -> TransferResult<(JobId, mpsc::UnboundedReceiver<DownloadEvent>)> {
        downloads.download(&self.target(), selected)
    }
}
