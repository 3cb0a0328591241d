//! Download worker - runs one job through its bundle and fetch phases

use super::types::{needs_bundle, DownloadEvent, DownloadJob, JobPhase};
use crate::error::{TransferError, TransferResult};
use crate::model::{FileEntry, JobId};
use crate::service::{
    drive, progress_channel, DownloadCapability, FileManagerService, ProgressReceiver,
};
use log::{debug, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct JobEntry {
    pub job: DownloadJob,
    /// Cancels the whole job, whatever phase it is in
    pub token: CancellationToken,
    /// Child of `token` for the phase currently running
    pub phase_token: Option<CancellationToken>,
}

#[derive(Default)]
pub(crate) struct DownloadState {
    pub jobs: Vec<JobEntry>,
}

impl DownloadState {
    pub fn entry(&self, id: JobId) -> Option<&JobEntry> {
        self.jobs.iter().find(|entry| entry.job.id() == id)
    }

    pub fn entry_mut(&mut self, id: JobId) -> Option<&mut JobEntry> {
        self.jobs.iter_mut().find(|entry| entry.job.id() == id)
    }

    /// Mark the job cancelled and abort whatever phase is running
    pub fn cancel(&mut self, id: JobId) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        if !entry.job.set_phase(JobPhase::Cancelled) {
            return false;
        }
        info!("download_status: {} -> cancelled", id);
        if let Some(phase) = entry.phase_token.take() {
            phase.cancel();
        }
        entry.token.cancel();
        true
    }
}

pub(crate) fn lock(state: &Mutex<DownloadState>) -> MutexGuard<'_, DownloadState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct DownloadRequest {
    pub id: JobId,
    pub workspace_id: String,
    pub files: Vec<FileEntry>,
    pub destination: PathBuf,
}

enum Outcome {
    Saved(PathBuf),
    Cancelled,
    Failed(TransferError),
}

struct JobRunner {
    id: JobId,
    state: Arc<Mutex<DownloadState>>,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl JobRunner {
    /// Enter `phase` and hand out its token, or `None` if the job was
    /// cancelled in the meantime
    fn begin_phase(&self, phase: JobPhase) -> Option<CancellationToken> {
        let token = {
            let mut state = lock(&self.state);
            let entry = state.entry_mut(self.id)?;
            if entry.token.is_cancelled() || !entry.job.set_phase(phase) {
                return None;
            }
            let token = entry.token.child_token();
            entry.phase_token = Some(token.clone());
            token
        };
        info!("download_phase: {} -> {}", self.id, phase);
        let _ = self.events.send(DownloadEvent::Phase { job: self.id, phase });
        Some(token)
    }

    async fn fetch<F>(
        &self,
        call: F,
        token: CancellationToken,
        mut progress: ProgressReceiver,
    ) -> Outcome
    where
        F: Future<Output = TransferResult<PathBuf>>,
    {
        let outcome = drive(call, &token, &mut progress, |update| {
            debug!(
                "download_progress: {} loaded={} total={:?}",
                self.id, update.loaded, update.total
            );
            if let Some(entry) = lock(&self.state).entry_mut(self.id) {
                entry.job.record_progress(update);
            }
            let _ = self.events.send(DownloadEvent::Progress {
                job: self.id,
                loaded: update.loaded,
                total: update.total,
                percent: update.percent(),
            });
        })
        .await;

        match outcome {
            None => Outcome::Cancelled,
            Some(Ok(path)) => Outcome::Saved(path),
            Some(Err(err)) => Outcome::Failed(err),
        }
    }

    async fn run(&self, downloads: &dyn DownloadCapability, request: &DownloadRequest) -> Outcome {
        let files = &request.files;
        let (progress_tx, progress_rx) = progress_channel();

        if !needs_bundle(files) {
            let Some(token) = self.begin_phase(JobPhase::Fetching) else {
                return Outcome::Cancelled;
            };
            let call = downloads.fetch_file(&files[0], &request.destination, progress_tx);
            return self.fetch(call, token, progress_rx).await;
        }

        let Some(token) = self.begin_phase(JobPhase::Bundling) else {
            return Outcome::Cancelled;
        };
        let (_, mut no_progress) = progress_channel();
        let call = downloads.create_bundle(&request.workspace_id, files);
        let bundle = match drive(call, &token, &mut no_progress, |_| {}).await {
            None => return Outcome::Cancelled,
            Some(Err(err)) => return Outcome::Failed(err),
            Some(Ok(None)) => return Outcome::Failed(TransferError::EmptyBundle),
            Some(Ok(Some(name))) => name,
        };
        // cancelled while the bundle call was returning
        if token.is_cancelled() {
            return Outcome::Cancelled;
        }

        info!("bundle_ready: {} name={}", self.id, bundle);
        if let Some(entry) = lock(&self.state).entry_mut(self.id) {
            entry.job.record_bundle(bundle.clone());
        }
        let _ = self.events.send(DownloadEvent::BundleReady {
            job: self.id,
            name: bundle.clone(),
        });

        let Some(token) = self.begin_phase(JobPhase::Fetching) else {
            return Outcome::Cancelled;
        };
        let call = downloads.fetch_bundle(&bundle, &request.destination, progress_tx);
        self.fetch(call, token, progress_rx).await
    }

    /// Record the outcome and build the single terminal event. A job
    /// cancelled from outside stays cancelled whatever the worker saw.
    async fn finish(&self, outcome: Outcome) -> DownloadEvent {
        let (event, discard) = {
            let mut state = lock(&self.state);
            let Some(entry) = state.entry_mut(self.id) else {
                return DownloadEvent::Cancelled { job: self.id };
            };
            entry.phase_token = None;
            let job = &mut entry.job;

            if job.phase() == JobPhase::Cancelled {
                let discard = match outcome {
                    Outcome::Saved(path) => Some(path),
                    _ => None,
                };
                (DownloadEvent::Cancelled { job: self.id }, discard)
            } else {
                match outcome {
                    Outcome::Cancelled => {
                        job.set_phase(JobPhase::Cancelled);
                        info!("download_status: {} -> cancelled", self.id);
                        (DownloadEvent::Cancelled { job: self.id }, None)
                    }
                    Outcome::Saved(path) => {
                        job.set_phase(JobPhase::Done);
                        job.record_path(path.clone());
                        info!("download_status: {} -> done ({})", self.id, path.display());
                        (DownloadEvent::Downloaded { job: self.id, path }, None)
                    }
                    Outcome::Failed(err) => {
                        let error = err.to_string();
                        job.set_phase(JobPhase::Errored);
                        job.record_error(error.clone());
                        warn!("download_status: {} -> errored: {}", self.id, error);
                        if err.is_unauthorized() {
                            (DownloadEvent::SessionExpired { job: self.id }, None)
                        } else {
                            (DownloadEvent::Failed { job: self.id, error }, None)
                        }
                    }
                }
            }
        };

        if let Some(path) = discard {
            let _ = tokio::fs::remove_file(&path).await;
        }
        event
    }
}

pub(crate) async fn run_download_job(
    service: Arc<dyn FileManagerService>,
    state: Arc<Mutex<DownloadState>>,
    request: DownloadRequest,
    events: mpsc::UnboundedSender<DownloadEvent>,
) {
    info!(
        "download_job_start: {} files={} bundle={}",
        request.id,
        request.files.len(),
        needs_bundle(&request.files)
    );

    let runner = JobRunner {
        id: request.id,
        state,
        events,
    };
    let outcome = match service.downloads() {
        Some(downloads) => runner.run(downloads, &request).await,
        None => Outcome::Failed(TransferError::Unsupported("download")),
    };
    let event = runner.finish(outcome).await;
    let _ = runner.events.send(event);
}
