//! File manager client: browse a workspace's file table, upload into the
//! current folder and download single files or server side bundles.
//!
//! Uploads and downloads run in spawned Tokio tasks, each under its own
//! cancellation token, and report progress on per-call event receivers.

pub mod auth;
pub mod browser;
pub mod config;
pub mod download;
pub mod error;
pub mod model;
pub mod navigation;
pub mod panel;
pub mod service;
pub mod upload;

pub use auth::{SessionProvider, StaticSession};
pub use browser::FileBrowser;
pub use config::{build_config, ConfigInput, FileManagerConfig};
pub use download::{DownloadCoordinator, DownloadEvent, DownloadJob, JobPhase};
pub use error::{TransferError, TransferResult};
pub use model::{
    FileEntry, FileSource, ItemId, JobId, QueryFilter, RequestId, TargetContext,
    FOLDER_PARENT_KEY,
};
pub use navigation::{Breadcrumbs, NavigationStateStack, StateFrame};
pub use panel::{confirm_discard, request_close, AutoHide, CloseRequest, StatusPanel};
pub use service::{
    ByteProgress, DownloadCapability, FileManagerService, HttpFileManagerService,
    ProgressSender, RenameCapability, UploadFile,
};
pub use upload::{ItemStatus, TransferItem, UploadCoordinator, UploadEvent};
