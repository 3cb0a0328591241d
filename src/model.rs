//! Core types shared across the crate: identifiers, file entries and request targets

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Filter key carrying the id of the folder being browsed.
pub const FOLDER_PARENT_KEY: &str = "FM_FOLDER_PARENT_KEY";

/// Key/value filter sent with queries and folder inserts.
pub type QueryFilter = Map<String, Value>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifies a queued upload item
    ItemId
);
uuid_id!(
    /// Identifies one network request carrying one or more upload items
    RequestId
);
uuid_id!(
    /// Identifies one logical download, whatever the number of phases
    JobId
);

/// A row of the file table, as returned by `queryFiles`.
///
/// Attributes the crate does not interpret are kept in `attributes` and sent
/// back untouched in delete, bundle and rename requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FileEntry {
    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            directory: false,
            size: None,
            attributes: Map::new(),
        }
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            directory: true,
            ..Self::file(id, name)
        }
    }

    /// Filter selecting the children of this entry
    pub fn children_filter(&self) -> QueryFilter {
        let mut filter = QueryFilter::new();
        filter.insert(FOLDER_PARENT_KEY.to_string(), Value::String(self.id.clone()));
        filter
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Workspace and folder a transfer is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetContext {
    pub workspace_id: String,
    pub folder_id: Option<String>,
}

impl TargetContext {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            folder_id: None,
        }
    }

    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }
}

/// Content of a file selected for upload
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

impl FileSource {
    pub async fn byte_len(&self) -> std::io::Result<u64> {
        match self {
            FileSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            FileSource::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_entry_accepts_numeric_ids_and_keeps_extra_attributes() {
        let entry: FileEntry = serde_json::from_value(json!({
            "id": 42,
            "name": "reports",
            "directory": true,
            "workspaceId": "ws-1"
        }))
        .unwrap();

        assert_eq!(entry.id, "42");
        assert!(entry.directory);
        assert_eq!(entry.size, None);
        assert_eq!(entry.attributes.get("workspaceId"), Some(&json!("ws-1")));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["workspaceId"], json!("ws-1"));
        assert_eq!(back["id"], json!("42"));
    }

    #[test]
    fn file_entry_rejects_object_ids() {
        let result: Result<FileEntry, _> =
            serde_json::from_value(json!({ "id": { "a": 1 }, "name": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn children_filter_points_at_entry() {
        let filter = FileEntry::folder("7", "docs").children_filter();
        assert_eq!(filter.get(FOLDER_PARENT_KEY), Some(&json!("7")));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_ne!(ItemId::new().to_string(), ItemId::new().to_string());
    }
}
