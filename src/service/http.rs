//! HTTP implementation of the file manager service

use super::{
    ByteProgress, DownloadCapability, FileManagerService, ProgressSender, RenameCapability,
    UploadFile,
};
use crate::auth::{bearer_token, SessionProvider};
use crate::config::FileManagerConfig;
use crate::error::{TransferError, TransferResult};
use crate::model::{FileEntry, FileSource, QueryFilter};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Write buffer size for downloads (256 KB) - reduces I/O operations
const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Chunk size used when streaming in-memory files
const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpFileManagerService {
    client: Client,
    config: FileManagerConfig,
    session: Arc<dyn SessionProvider>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileListBody {
    Entries(Vec<FileEntry>),
    Wrapped { data: Vec<FileEntry> },
}

#[derive(Deserialize)]
struct BundleBody {
    #[serde(default)]
    file: Option<String>,
}

impl HttpFileManagerService {
    pub fn new(
        config: FileManagerConfig,
        session: Arc<dyn SessionProvider>,
    ) -> TransferResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn config(&self) -> &FileManagerConfig {
        &self.config
    }

    /// Attach the bearer token, send, and map 401 / non-2xx responses
    async fn send(&self, request: RequestBuilder) -> TransferResult<Response> {
        let token = bearer_token(self.session.as_ref()).ok_or(TransferError::Unauthorized)?;
        let response = request.header(AUTHORIZATION, token).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(
                "Request to {} rejected with 401, invalidating session",
                response.url().path()
            );
            self.session.invalidate();
            return Err(TransferError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> TransferResult<Response> {
        let body = serde_json::to_vec(body)?;
        self.send(
            self.client
                .post(url)
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body),
        )
        .await
    }

    async fn get(&self, url: &str) -> TransferResult<Response> {
        self.send(self.client.get(url)).await
    }
}

async fn read_json(response: Response) -> TransferResult<Value> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

async fn source_stream(source: FileSource) -> io::Result<BoxStream<'static, io::Result<Bytes>>> {
    match source {
        FileSource::Path(path) => {
            let file = File::open(&path).await?;
            Ok(ReaderStream::new(file).boxed())
        }
        FileSource::Memory(bytes) => {
            let chunks: Vec<io::Result<Bytes>> = (0..bytes.len())
                .step_by(MEMORY_CHUNK_SIZE)
                .map(|start| Ok(bytes.slice(start..(start + MEMORY_CHUNK_SIZE).min(bytes.len()))))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }
}

/// Count bytes as the request body is consumed; `sent` is shared by every part
fn counted(
    chunks: BoxStream<'static, io::Result<Bytes>>,
    sent: Arc<AtomicU64>,
    total: u64,
    progress: ProgressSender,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    chunks.map(move |chunk| {
        let chunk = chunk?;
        let loaded = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
        let _ = progress.send(ByteProgress {
            loaded,
            total: Some(total),
        });
        Ok(chunk)
    })
}

/// Give up looking for a free name after this many candidates
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Keep only the final path component of a server supplied name
fn safe_file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download")
}

/// `name`, then `stem (1).ext`, `stem (2).ext`, ...
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], attempt, &name[dot..]),
        _ => format!("{} ({})", name, attempt),
    }
}

/// Create a file under `dir` that did not exist before, so no other
/// download ever writes to or removes it
async fn create_unique(dir: &Path, name: &str) -> io::Result<(File, PathBuf)> {
    let name = safe_file_name(name);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(candidate_name(name, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {} in {}", name, dir.display()),
    ))
}

/// Removes a partially written download unless `keep` is set
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stream the response body to a new file named after `name` in `dir`,
/// with buffered writes and progress
async fn save_response(
    response: Response,
    dir: &Path,
    name: &str,
    progress: &ProgressSender,
) -> TransferResult<PathBuf> {
    let total = response.content_length();

    tokio::fs::create_dir_all(dir).await?;
    let (mut file, path) = create_unique(dir, name).await?;
    let mut partial = PartialFile {
        path: path.clone(),
        keep: false,
    };
    let mut loaded: u64 = 0;
    let mut write_buffer = Vec::with_capacity(WRITE_BUFFER_SIZE);
    let mut stream = response.bytes_stream();

    let _ = progress.send(ByteProgress { loaded, total });

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        write_buffer.extend_from_slice(&chunk);
        loaded += chunk.len() as u64;
        let _ = progress.send(ByteProgress { loaded, total });

        if write_buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&write_buffer).await?;
            write_buffer.clear();
        }
    }

    if !write_buffer.is_empty() {
        file.write_all(&write_buffer).await?;
    }
    file.flush().await?;
    drop(file);

    debug!("download saved: {} ({} bytes)", path.display(), loaded);
    partial.keep = true;
    Ok(path)
}

#[async_trait]
impl FileManagerService for HttpFileManagerService {
    async fn query_files(
        &self,
        workspace_id: &str,
        filter: &QueryFilter,
        columns: &[String],
    ) -> TransferResult<Vec<FileEntry>> {
        let url = self.config.endpoint(&["queryFiles", workspace_id]);
        let response = self
            .post_json(&url, &json!({ "filter": filter, "columns": columns }))
            .await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(TransferError::EmptyResponse);
        }
        let body: FileListBody = serde_json::from_str(&text)?;
        match body {
            FileListBody::Entries(entries) | FileListBody::Wrapped { data: entries } => {
                Ok(entries)
            }
        }
    }

    async fn upload(
        &self,
        workspace_id: &str,
        folder_id: Option<&str>,
        files: Vec<UploadFile>,
        progress: ProgressSender,
    ) -> TransferResult<Value> {
        let url = self.config.endpoint(&["insertFile", workspace_id]);

        let mut sizes = Vec::with_capacity(files.len());
        for file in &files {
            sizes.push(file.source.byte_len().await?);
        }
        let total: u64 = sizes.iter().sum();
        let count = files.len();
        let sent = Arc::new(AtomicU64::new(0));

        let mut form = Form::new();
        for (file, size) in files.into_iter().zip(sizes) {
            let chunks = source_stream(file.source).await?;
            let body = Body::wrap_stream(counted(chunks, sent.clone(), total, progress.clone()));
            let part = Part::stream_with_length(body, size).file_name(file.name.clone());
            form = form.text("name", file.name).part("file", part);
        }
        if let Some(folder_id) = folder_id {
            form = form.text("folderId", folder_id.to_string());
        }

        info!(
            "upload_start: {} file(s) total_bytes={} folder={:?}",
            count, total, folder_id
        );
        let response = self.send(self.client.post(&url).multipart(form)).await?;
        match read_json(response).await? {
            Value::Null => Err(TransferError::EmptyResponse),
            body => Ok(body),
        }
    }

    async fn delete_files(&self, workspace_id: &str, files: &[FileEntry]) -> TransferResult<Value> {
        let url = self.config.endpoint(&["deleteFiles", workspace_id]);
        let response = self.post_json(&url, &json!({ "fileList": files })).await?;
        read_json(response).await
    }

    async fn insert_folder(
        &self,
        workspace_id: &str,
        name: &str,
        attributes: &QueryFilter,
    ) -> TransferResult<Value> {
        let url = self.config.endpoint(&["insertFolder", workspace_id, name]);
        let response = self.post_json(&url, &json!({ "data": attributes })).await?;
        read_json(response).await
    }

    fn downloads(&self) -> Option<&dyn DownloadCapability> {
        Some(self)
    }

    fn renames(&self) -> Option<&dyn RenameCapability> {
        Some(self)
    }
}

#[async_trait]
impl DownloadCapability for HttpFileManagerService {
    async fn fetch_file(
        &self,
        file: &FileEntry,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf> {
        let url = self.config.endpoint(&["getFile", file.id.as_str()]);
        info!("download_start: {} ({})", file.name, file.id);
        let response = self.get(&url).await?;
        save_response(response, destination, &file.name, &progress).await
    }

    async fn create_bundle(
        &self,
        workspace_id: &str,
        files: &[FileEntry],
    ) -> TransferResult<Option<String>> {
        let url = self.config.endpoint(&["getFiles", workspace_id]);
        info!("bundle_request: {} file(s)", files.len());
        let response = self.post_json(&url, files).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let body: BundleBody = serde_json::from_str(&text)?;
        Ok(body.file.filter(|name| !name.trim().is_empty()))
    }

    async fn fetch_bundle(
        &self,
        bundle_name: &str,
        destination: &Path,
        progress: ProgressSender,
    ) -> TransferResult<PathBuf> {
        let stem = bundle_name
            .rfind('.')
            .map(|dot| &bundle_name[..dot])
            .filter(|stem| !stem.is_empty())
            .unwrap_or(bundle_name);
        let url = self.config.endpoint(&["getZipFile", stem]);
        info!("bundle_download_start: {}", bundle_name);
        let response = self.get(&url).await?;
        save_response(response, destination, bundle_name, &progress).await
    }
}

#[async_trait]
impl RenameCapability for HttpFileManagerService {
    async fn change_file_name(&self, new_name: &str, file: &FileEntry) -> TransferResult<Value> {
        let url = self.config.endpoint(&["fileUpdate"]);
        let response = self
            .post_json(&url, &json!({ "file": file, "params": { "name": new_name } }))
            .await?;
        read_json(response).await
    }
}
