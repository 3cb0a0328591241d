use super::types::{DownloadEvent, DownloadJob, JobPhase};
use super::worker::{lock, run_download_job, DownloadRequest, DownloadState, JobEntry};
use crate::config::FileManagerConfig;
use crate::error::{TransferError, TransferResult};
use crate::model::{FileEntry, JobId, TargetContext};
use crate::service::FileManagerService;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Starts download jobs and tracks them until they are dismissed.
///
/// Dropping the coordinator cancels every job still running.
pub struct DownloadCoordinator {
    service: Arc<dyn FileManagerService>,
    download_dir: PathBuf,
    state: Arc<Mutex<DownloadState>>,
    shutdown: CancellationToken,
}

impl DownloadCoordinator {
    pub fn new(service: Arc<dyn FileManagerService>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            download_dir: download_dir.into(),
            state: Arc::new(Mutex::new(DownloadState::default())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(service: Arc<dyn FileManagerService>, config: &FileManagerConfig) -> Self {
        Self::new(service, config.download_dir.clone())
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn state(&self) -> MutexGuard<'_, DownloadState> {
        lock(&self.state)
    }

    /// Start downloading `selected` from the workspace in `target`.
    ///
    /// Must be called from within a Tokio runtime. The receiver closes after
    /// the job's terminal event.
    pub fn download(
        &self,
        target: &TargetContext,
        selected: Vec<FileEntry>,
    ) -> TransferResult<(JobId, mpsc::UnboundedReceiver<DownloadEvent>)> {
        if selected.is_empty() {
            return Err(TransferError::EmptySelection);
        }
        if self.service.downloads().is_none() {
            return Err(TransferError::Unsupported("download"));
        }

        let job = DownloadJob::new(target.workspace_id.clone(), selected.clone());
        let id = job.id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(DownloadEvent::Phase {
            job: id,
            phase: JobPhase::Initiating,
        });

        self.state().jobs.push(JobEntry {
            job,
            token: self.shutdown.child_token(),
            phase_token: None,
        });

        let request = DownloadRequest {
            id,
            workspace_id: target.workspace_id.clone(),
            files: selected,
            destination: self.download_dir.clone(),
        };
        tokio::spawn(run_download_job(
            self.service.clone(),
            self.state.clone(),
            request,
            events_tx,
        ));

        Ok((id, events_rx))
    }

    /// Cancel a job; a job that already stopped is left as is
    pub fn cancel(&self, id: JobId) -> TransferResult<()> {
        let mut state = self.state();
        if state.entry(id).is_none() {
            return Err(TransferError::UnknownJob(id));
        }
        state.cancel(id);
        Ok(())
    }

    pub fn cancel_all(&self) {
        let mut state = self.state();
        let ids: Vec<JobId> = state.jobs.iter().map(|entry| entry.job.id()).collect();
        for id in ids {
            state.cancel(id);
        }
    }

    /// Done or cancelled. Unknown jobs are not complete.
    pub fn is_complete(&self, id: JobId) -> bool {
        self.state()
            .entry(id)
            .is_some_and(|entry| entry.job.phase().is_resolved())
    }

    pub fn all_resolved(&self) -> bool {
        self.state()
            .jobs
            .iter()
            .all(|entry| entry.job.phase().is_resolved())
    }

    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.state()
            .jobs
            .iter()
            .map(|entry| entry.job.clone())
            .collect()
    }

    pub fn job(&self, id: JobId) -> Option<DownloadJob> {
        self.state().entry(id).map(|entry| entry.job.clone())
    }

    /// Drop every job that stopped running, errored ones included; returns
    /// how many were removed
    pub fn remove_resolved(&self) -> usize {
        let mut state = self.state();
        let before = state.jobs.len();
        state.jobs.retain(|entry| !entry.job.phase().is_terminal());
        before - state.jobs.len()
    }
}

impl Drop for DownloadCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
