#![allow(dead_code)]

use async_trait::async_trait;
use filemanager::{
    ByteProgress, DownloadCapability, FileEntry, FileManagerService, ProgressSender,
    QueryFilter, RenameCapability, TransferError, TransferResult, UploadFile,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub enum Step {
    /// Report `loaded` of `total` bytes
    Progress(u64, u64),
    /// Block until the sender fires or is dropped
    Wait(oneshot::Receiver<()>),
    /// Never finish; only cancellation gets out of this
    Hang,
    /// Run a side effect from inside the call
    Run(Box<dyn FnOnce() + Send>),
}

pub enum Reply {
    /// Upload response, bundle name (string or null) or saved file content
    Value(Value),
    Unauthorized,
    Status(u16, String),
}

pub struct Script {
    pub steps: Vec<Step>,
    pub reply: Reply,
}

impl Script {
    pub fn reply(value: Value) -> Self {
        Self {
            steps: Vec::new(),
            reply: Reply::Value(value),
        }
    }

    pub fn hang() -> Self {
        Self {
            steps: vec![Step::Hang],
            reply: Reply::Value(Value::Null),
        }
    }

    pub fn failing(reply: Reply) -> Self {
        Self {
            steps: Vec::new(),
            reply,
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }
}

/// Counts calls dropped before they finished
struct AbortGuard<'a> {
    aborted: &'a AtomicUsize,
    finished: bool,
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// In-process service replaying scripted replies.
///
/// Upload scripts are keyed by the first file name of the request, fetch
/// scripts by file or bundle name and the bundle script by `"bundle"`.
/// Unscripted calls succeed immediately.
pub struct ScriptedService {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    entries: Mutex<Vec<FileEntry>>,
    filters: Mutex<Vec<QueryFilter>>,
    downloads: bool,
    renames: bool,
    fail_query: AtomicBool,
    pub bundle_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub aborted: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
            downloads: true,
            renames: true,
            fail_query: AtomicBool::new(false),
            bundle_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
        }
    }

    pub fn without_capabilities(mut self) -> Self {
        self.downloads = false;
        self.renames = false;
        self
    }

    pub fn script(&self, key: &str, script: Script) {
        self.scripts.lock().unwrap().insert(key.to_string(), script);
    }

    /// The next query answers with a server error
    pub fn fail_next_query(&self) {
        self.fail_query.store(true, Ordering::SeqCst);
    }

    pub fn set_entries(&self, entries: Vec<FileEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<QueryFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub fn bundle_count(&self) -> usize {
        self.bundle_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn aborted_count(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take(&self, key: &str) -> Option<Script> {
        self.scripts.lock().unwrap().remove(key)
    }

    async fn play(&self, key: &str, progress: Option<&ProgressSender>) -> TransferResult<Value> {
        let Some(script) = self.take(key) else {
            return Ok(json!({ "ok": true }));
        };
        let mut guard = AbortGuard {
            aborted: &self.aborted,
            finished: false,
        };
        for step in script.steps {
            match step {
                Step::Progress(loaded, total) => {
                    if let Some(progress) = progress {
                        let _ = progress.send(ByteProgress {
                            loaded,
                            total: Some(total),
                        });
                    }
                    tokio::task::yield_now().await;
                }
                Step::Wait(rx) => {
                    let _ = rx.await;
                }
                Step::Hang => std::future::pending::<()>().await,
                Step::Run(effect) => effect(),
            }
        }
        guard.finished = true;
        match script.reply {
            Reply::Value(value) => Ok(value),
            Reply::Unauthorized => Err(TransferError::Unauthorized),
            Reply::Status(status, body) => Err(TransferError::Status { status, body }),
        }
    }

    async fn save(
        &self,
        name: &str,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let content = self.play(name, Some(&progress)).await?;
        let path = destination.join(name);
        let body = content.as_str().unwrap_or("content").to_string();
        tokio::fs::write(&path, body.as_bytes()).await?;
        Ok(path)
    }
}

#[async_trait]
impl FileManagerService for ScriptedService {
    async fn query_files(
        &self,
        workspace_id: &str,
        filter: &QueryFilter,
        _columns: &[String],
    ) -> TransferResult<Vec<FileEntry>> {
        self.record(format!("query:{}", workspace_id));
        self.filters.lock().unwrap().push(filter.clone());
        if self.fail_query.swap(false, Ordering::SeqCst) {
            return Err(TransferError::Status {
                status: 500,
                body: "query failed".to_string(),
            });
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn upload(
        &self,
        workspace_id: &str,
        folder_id: Option<&str>,
        files: Vec<UploadFile>,
        progress: ProgressSender,
    ) -> TransferResult<Value> {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        self.record(format!(
            "upload:{}:{}@{}",
            workspace_id,
            names.join(","),
            folder_id.unwrap_or("root")
        ));
        let key = names.first().copied().unwrap_or_default().to_string();
        self.play(&key, Some(&progress)).await
    }

    async fn delete_files(&self, workspace_id: &str, files: &[FileEntry]) -> TransferResult<Value> {
        self.record(format!("delete:{}:{}", workspace_id, files.len()));
        Ok(json!({ "deleted": files.len() }))
    }

    async fn insert_folder(
        &self,
        workspace_id: &str,
        name: &str,
        attributes: &QueryFilter,
    ) -> TransferResult<Value> {
        self.record(format!(
            "insert_folder:{}:{}:{}",
            workspace_id,
            name,
            Value::Object(attributes.clone())
        ));
        Ok(json!({ "name": name }))
    }

    fn downloads(&self) -> Option<&dyn DownloadCapability> {
        if self.downloads {
            Some(self)
        } else {
            None
        }
    }

    fn renames(&self) -> Option<&dyn RenameCapability> {
        if self.renames {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl DownloadCapability for ScriptedService {
    async fn fetch_file(
        &self,
        file: &FileEntry,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf> {
        self.record(format!("fetch_file:{}", file.name));
        self.save(&file.name, destination, progress).await
    }

    async fn create_bundle(
        &self,
        workspace_id: &str,
        files: &[FileEntry],
    ) -> TransferResult<Option<String>> {
        self.bundle_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("create_bundle:{}:{}", workspace_id, files.len()));
        if !self.scripts.lock().unwrap().contains_key("bundle") {
            return Ok(Some("bundle.zip".to_string()));
        }
        match self.play("bundle", None).await? {
            Value::String(name) if !name.is_empty() => Ok(Some(name)),
            _ => Ok(None),
        }
    }

    async fn fetch_bundle(
        &self,
        bundle_name: &str,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf> {
        self.record(format!("fetch_bundle:{}", bundle_name));
        self.save(bundle_name, destination, progress).await
    }
}

#[async_trait]
impl RenameCapability for ScriptedService {
    async fn change_file_name(&self, new_name: &str, file: &FileEntry) -> TransferResult<Value> {
        self.record(format!("rename:{}->{}", file.name, new_name));
        Ok(json!({ "name": new_name }))
    }
}

pub fn service() -> Arc<ScriptedService> {
    Arc::new(ScriptedService::new())
}

/// Read events until the sender side closes
pub async fn collect<T>(mut rx: mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
    })
    .await
    .expect("event stream did not close");
    events
}

/// Yield until `check` holds
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
