use super::state::{InFlightRequest, UploadState};
use super::types::{ItemStatus, TransferItem, UploadEvent};
use super::worker::{lock, run_upload_request, UploadRequest};
use crate::config::FileManagerConfig;
use crate::error::{TransferError, TransferResult};
use crate::model::{ItemId, RequestId, TargetContext};
use crate::service::FileManagerService;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Owns the upload queue and every request in flight for it.
///
/// Dropping the coordinator cancels all of its requests.
pub struct UploadCoordinator {
    service: Arc<dyn FileManagerService>,
    split_upload: bool,
    state: Arc<Mutex<UploadState>>,
    shutdown: CancellationToken,
}

impl UploadCoordinator {
    pub fn new(service: Arc<dyn FileManagerService>, split_upload: bool) -> Self {
        Self {
            service,
            split_upload,
            state: Arc::new(Mutex::new(UploadState::default())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(service: Arc<dyn FileManagerService>, config: &FileManagerConfig) -> Self {
        Self::new(service, config.split_upload)
    }

    pub fn split_upload(&self) -> bool {
        self.split_upload
    }

    fn state(&self) -> MutexGuard<'_, UploadState> {
        lock(&self.state)
    }

    /// Queue an item; it stays `pending` until the next `upload`
    pub fn add_file(&self, item: TransferItem) -> ItemId {
        let id = item.id();
        self.state().items.push(item);
        id
    }

    /// Send every pending item to `target`.
    ///
    /// Must be called from within a Tokio runtime. The returned receiver
    /// closes once every request started by this call has reported its
    /// terminal event.
    pub fn upload(
        &self,
        target: &TargetContext,
    ) -> TransferResult<mpsc::UnboundedReceiver<UploadEvent>> {
        let mut state = self.state();
        if state.has_live_request() {
            return Err(TransferError::UploadInProgress);
        }

        let pending: Vec<ItemId> = state
            .items
            .iter()
            .filter(|item| item.status() == ItemStatus::Pending)
            .map(|item| item.id())
            .collect();
        if pending.is_empty() {
            return Err(TransferError::NothingToUpload);
        }

        let groups: Vec<Vec<ItemId>> = if self.split_upload {
            pending.into_iter().map(|id| vec![id]).collect()
        } else {
            vec![pending]
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        for members in groups {
            let request_id = RequestId::new();
            let token = self.shutdown.child_token();
            let mut files = Vec::with_capacity(members.len());
            for id in &members {
                state.set_status(*id, ItemStatus::Uploading, None);
                if let Some(item) = state.item_mut(*id) {
                    item.attach(request_id, target.folder_id.clone());
                    files.push(item.upload_file());
                }
            }
            state.requests.insert(
                request_id,
                InFlightRequest {
                    members: members.clone(),
                    token: token.clone(),
                },
            );

            let request = UploadRequest {
                id: request_id,
                workspace_id: target.workspace_id.clone(),
                folder_id: target.folder_id.clone(),
                members,
                files,
                token,
            };
            tokio::spawn(run_upload_request(
                self.service.clone(),
                self.state.clone(),
                request,
                events_tx.clone(),
            ));
        }

        Ok(events_rx)
    }

    /// Cancel one item. Its request is aborted once no other member is
    /// still uploading on it.
    pub fn cancel_item(&self, id: ItemId) -> TransferResult<()> {
        let mut state = self.state();
        let item = state.item(id).ok_or(TransferError::UnknownItem(id))?;
        let request = item.request();

        if !state.set_status(id, ItemStatus::Cancelled, None) {
            return Ok(());
        }
        if let Some(request) = request {
            if state.live_members(request) == 0 {
                if let Some(in_flight) = state.requests.get(&request) {
                    info!("upload_request_abort: {} (no live members)", request);
                    in_flight.token.cancel();
                }
            }
        }
        Ok(())
    }

    /// Abort every request and cancel every item that has not finished
    pub fn cancel(&self) {
        self.state().cancel_all();
    }

    /// Remove a finished item from the queue
    pub fn remove_file(&self, id: ItemId) -> TransferResult<TransferItem> {
        let mut state = self.state();
        let index = state
            .items
            .iter()
            .position(|item| item.id() == id)
            .ok_or(TransferError::UnknownItem(id))?;
        if state.items[index].is_pending_upload() {
            return Err(TransferError::ItemInFlight(id));
        }
        Ok(state.items.remove(index))
    }

    /// Remove every finished item; returns how many were removed
    pub fn remove_finished(&self) -> usize {
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|item| item.is_pending_upload());
        before - state.items.len()
    }

    /// Abort what is in flight and empty the queue
    pub fn clear(&self) {
        let mut state = self.state();
        state.cancel_all();
        state.items.clear();
    }

    pub fn files(&self) -> Vec<TransferItem> {
        self.state().items.clone()
    }

    pub fn item(&self, id: ItemId) -> Option<TransferItem> {
        self.state().item(id).cloned()
    }

    /// True when no item is pending or uploading
    pub fn is_settled(&self) -> bool {
        self.state().items.iter().all(|item| !item.is_pending_upload())
    }
}

impl Drop for UploadCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
