use crate::error::{TransferError, TransferResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service path appended to the base URL when none is configured
pub const DEFAULT_SERVICE_PATH: &str = "/filemanager";

/// Delay before a settled status panel hides itself
pub const DEFAULT_AUTO_HIDE_TIMEOUT_MS: u64 = 20_000;

/// Raw configuration, as supplied by the host application
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInput {
    pub base_url: String,
    pub file_manager_path: Option<String>,
    pub split_upload: Option<bool>,
    pub auto_hide: Option<bool>,
    pub auto_hide_timeout_ms: Option<u64>,
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FileManagerConfig {
    pub base_url: String,
    pub path: String,
    /// Send one request per file instead of a single multipart request
    pub split_upload: bool,
    pub auto_hide: bool,
    pub auto_hide_timeout_ms: u64,
    pub download_dir: PathBuf,
}

impl FileManagerConfig {
    pub fn new(base_url: impl Into<String>) -> TransferResult<Self> {
        build_config(ConfigInput {
            base_url: base_url.into(),
            ..ConfigInput::default()
        })
    }

    pub fn from_json(raw: &str) -> TransferResult<Self> {
        let input: ConfigInput = serde_json::from_str(raw)
            .map_err(|e| TransferError::Config(format!("Failed to parse config: {}", e)))?;
        build_config(input)
    }

    pub fn auto_hide_timeout(&self) -> Duration {
        Duration::from_millis(self.auto_hide_timeout_ms)
    }

    /// Build an endpoint URL, percent-encoding each segment
    pub(crate) fn endpoint(&self, segments: &[&str]) -> String {
        let encoded = segments
            .iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}/{}", self.base_url, self.path, encoded)
    }
}

pub fn build_config(input: ConfigInput) -> TransferResult<FileManagerConfig> {
    let base_url = input.base_url.trim_end_matches('/').to_string();
    if base_url.is_empty() {
        return Err(TransferError::Config("base URL is required".to_string()));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(TransferError::Config(format!(
            "base URL must be http or https: {}",
            base_url
        )));
    }

    let path = input
        .file_manager_path
        .map(|p| p.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SERVICE_PATH.to_string());
    let path = if path.is_empty() || path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };

    Ok(FileManagerConfig {
        base_url,
        path,
        split_upload: input.split_upload.unwrap_or(false),
        auto_hide: input.auto_hide.unwrap_or(true),
        auto_hide_timeout_ms: input
            .auto_hide_timeout_ms
            .unwrap_or(DEFAULT_AUTO_HIDE_TIMEOUT_MS),
        download_dir: input.download_dir.unwrap_or_else(std::env::temp_dir),
    })
}
