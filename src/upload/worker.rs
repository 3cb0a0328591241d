//! Upload worker - runs one request and reports its outcome

use super::state::UploadState;
use super::types::{ItemStatus, UploadEvent};
use crate::error::TransferError;
use crate::model::{ItemId, RequestId};
use crate::service::{drive, progress_channel, FileManagerService, UploadFile};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct UploadRequest {
    pub id: RequestId,
    pub workspace_id: String,
    pub folder_id: Option<String>,
    pub members: Vec<ItemId>,
    pub files: Vec<UploadFile>,
    pub token: CancellationToken,
}

pub(crate) fn lock(state: &Mutex<UploadState>) -> MutexGuard<'_, UploadState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) async fn run_upload_request(
    service: Arc<dyn FileManagerService>,
    state: Arc<Mutex<UploadState>>,
    request: UploadRequest,
    events: mpsc::UnboundedSender<UploadEvent>,
) {
    info!(
        "upload_request_start: {} items={} folder={:?}",
        request.id,
        request.members.len(),
        request.folder_id
    );

    let (progress_tx, mut progress_rx) = progress_channel();
    let call = service.upload(
        &request.workspace_id,
        request.folder_id.as_deref(),
        request.files,
        progress_tx,
    );

    let outcome = drive(call, &request.token, &mut progress_rx, |progress| {
        debug!(
            "upload_progress: {} loaded={} total={:?}",
            request.id, progress.loaded, progress.total
        );
        {
            let mut state = lock(&state);
            for id in &request.members {
                if let Some(item) = state.item_mut(*id) {
                    item.record_progress(progress);
                }
            }
        }
        let _ = events.send(UploadEvent::Progress {
            request: request.id,
            loaded: progress.loaded,
            total: progress.total,
            percent: progress.percent(),
        });
    })
    .await;

    let event = {
        let mut state = lock(&state);
        match outcome {
            None => {
                info!("upload_request_cancelled: {}", request.id);
                let items = state.finish_request(request.id, ItemStatus::Cancelled, None);
                UploadEvent::Cancelled {
                    request: request.id,
                    items,
                }
            }
            Some(Ok(response)) => {
                let items = state.finish_request(request.id, ItemStatus::Uploaded, None);
                UploadEvent::Uploaded {
                    request: request.id,
                    items,
                    response,
                }
            }
            Some(Err(TransferError::Unauthorized)) => {
                warn!("upload_request_unauthorized: {}", request.id);
                let error = TransferError::Unauthorized.to_string();
                let items = state.finish_request(request.id, ItemStatus::Errored, Some(&error));
                UploadEvent::SessionExpired {
                    request: request.id,
                    items,
                }
            }
            Some(Err(err)) => {
                let error = err.to_string();
                let items = state.finish_request(request.id, ItemStatus::Errored, Some(&error));
                UploadEvent::Failed {
                    request: request.id,
                    items,
                    error,
                }
            }
        }
    };
    let _ = events.send(event);
}
