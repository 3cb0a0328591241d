//! Download job and event types

use crate::model::{FileEntry, JobId};
use crate::service::ByteProgress;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Initiating,
    Bundling,
    Fetching,
    Done,
    Cancelled,
    Errored,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Cancelled | JobPhase::Errored)
    }

    /// Done or cancelled; an errored job still needs attention
    pub fn is_resolved(self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Cancelled)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Initiating => write!(f, "initiating"),
            JobPhase::Bundling => write!(f, "bundling"),
            JobPhase::Fetching => write!(f, "fetching"),
            JobPhase::Done => write!(f, "done"),
            JobPhase::Cancelled => write!(f, "cancelled"),
            JobPhase::Errored => write!(f, "errored"),
        }
    }
}

/// One logical download: a single file, or a server side bundle of several
#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    id: JobId,
    workspace_id: String,
    files: Vec<FileEntry>,
    phase: JobPhase,
    loaded: u64,
    total: Option<u64>,
    bundle_name: Option<String>,
    path: Option<PathBuf>,
    error: Option<String>,
    created_at: i64,
}

impl DownloadJob {
    pub(crate) fn new(workspace_id: impl Into<String>, files: Vec<FileEntry>) -> Self {
        Self {
            id: JobId::new(),
            workspace_id: workspace_id.into(),
            files,
            phase: JobPhase::Initiating,
            loaded: 0,
            total: None,
            bundle_name: None,
            path: None,
            error: None,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
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

    pub fn bundle_name(&self) -> Option<&str> {
        self.bundle_name.as_deref()
    }

    /// Where the file was saved, once done
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn needs_bundle(&self) -> bool {
        needs_bundle(&self.files)
    }

    /// Move to `phase` unless the job already stopped
    pub(crate) fn set_phase(&mut self, phase: JobPhase) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        true
    }

    pub(crate) fn record_progress(&mut self, progress: ByteProgress) {
        self.loaded = progress.loaded;
        self.total = progress.total;
    }

    pub(crate) fn record_bundle(&mut self, name: String) {
        self.bundle_name = Some(name);
    }

    pub(crate) fn record_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub(crate) fn record_error(&mut self, error: String) {
        self.error = Some(error);
    }
}

/// Anything but a single plain file goes through a bundle
pub fn needs_bundle(selected: &[FileEntry]) -> bool {
    !matches!(selected, [file] if !file.directory)
}

/// Event emitted on the receiver returned by `DownloadCoordinator::download`.
///
/// A job ends with exactly one of `Downloaded`, `Cancelled`, `Failed` or
/// `SessionExpired`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Phase {
        job: JobId,
        phase: JobPhase,
    },
    Progress {
        job: JobId,
        loaded: u64,
        total: Option<u64>,
        percent: Option<u32>,
    },
    BundleReady {
        job: JobId,
        name: String,
    },
    Downloaded {
        job: JobId,
        path: PathBuf,
    },
    Cancelled {
        job: JobId,
    },
    Failed {
        job: JobId,
        error: String,
    },
    SessionExpired {
        job: JobId,
    },
}

impl DownloadEvent {
    pub fn job(&self) -> JobId {
        match self {
            DownloadEvent::Phase { job, .. }
            | DownloadEvent::Progress { job, .. }
            | DownloadEvent::BundleReady { job, .. }
            | DownloadEvent::Downloaded { job, .. }
            | DownloadEvent::Cancelled { job }
            | DownloadEvent::Failed { job, .. }
            | DownloadEvent::SessionExpired { job } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Downloaded { .. }
                | DownloadEvent::Cancelled { .. }
                | DownloadEvent::Failed { .. }
                | DownloadEvent::SessionExpired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_plain_file_is_fetched_directly() {
        assert!(!needs_bundle(&[FileEntry::file("1", "a.txt")]));
        assert!(needs_bundle(&[FileEntry::folder("2", "docs")]));
        assert!(needs_bundle(&[
            FileEntry::file("1", "a.txt"),
            FileEntry::file("3", "b.txt")
        ]));
        assert!(needs_bundle(&[]));
    }

    #[test]
    fn terminal_phase_is_never_overwritten() {
        let mut job = DownloadJob::new("ws", vec![FileEntry::file("1", "a.txt")]);
        assert!(job.set_phase(JobPhase::Fetching));
        assert!(job.set_phase(JobPhase::Cancelled));
        assert!(!job.set_phase(JobPhase::Done));
        assert_eq!(job.phase(), JobPhase::Cancelled);
    }

    #[test]
    fn only_done_and_cancelled_are_resolved() {
        assert!(JobPhase::Done.is_resolved());
        assert!(JobPhase::Cancelled.is_resolved());
        assert!(!JobPhase::Errored.is_resolved());
        assert!(JobPhase::Errored.is_terminal());
        assert!(!JobPhase::Fetching.is_terminal());
    }

    #[test]
    fn phase_serializes_lowercase() {
        let event = DownloadEvent::Phase {
            job: JobId::new(),
            phase: JobPhase::Bundling,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "phase");
        assert_eq!(value["phase"], "bundling");
        assert_eq!(JobPhase::Bundling.to_string(), "bundling");
    }
}
