use super::types::{ItemStatus, TransferItem};
use crate::model::{ItemId, RequestId};
use log::{info, warn};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// A request on the wire; every member shares its token
pub(crate) struct InFlightRequest {
    pub members: Vec<ItemId>,
    pub token: CancellationToken,
}

#[derive(Default)]
pub(crate) struct UploadState {
    pub items: Vec<TransferItem>,
    pub requests: HashMap<RequestId, InFlightRequest>,
}

impl UploadState {
    pub fn item(&self, id: ItemId) -> Option<&TransferItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut TransferItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn set_status(&mut self, id: ItemId, status: ItemStatus, error: Option<&str>) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        if !item.transition(status) {
            return false;
        }
        match error {
            Some(err) => {
                warn!("upload_status: {} -> {} error={}", id, status, err);
                item.record_error(err.to_string());
            }
            None => info!("upload_status: {} -> {}", id, status),
        }
        true
    }

    /// A request that has not been cancelled is still on the wire. Cancelled
    /// ones only wait for their worker to report.
    pub fn has_live_request(&self) -> bool {
        self.requests
            .values()
            .any(|request| !request.token.is_cancelled())
    }

    /// Members of `request` that are still uploading
    pub fn live_members(&self, request: RequestId) -> usize {
        self.requests
            .get(&request)
            .map(|r| {
                r.members
                    .iter()
                    .filter(|id| {
                        self.item(**id)
                            .is_some_and(|item| item.status() == ItemStatus::Uploading)
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop the request and move its members to `status`. Returns the members
    /// that end up in `status`, including those already there.
    pub fn finish_request(
        &mut self,
        request: RequestId,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Vec<ItemId> {
        let Some(finished) = self.requests.remove(&request) else {
            return Vec::new();
        };
        for id in &finished.members {
            self.set_status(*id, status, error);
        }
        finished
            .members
            .into_iter()
            .filter(|id| self.item(*id).is_some_and(|item| item.status() == status))
            .collect()
    }

    /// Cancel every in-flight token and every item not yet terminal
    pub fn cancel_all(&mut self) {
        for request in self.requests.values() {
            request.token.cancel();
        }
        let ids: Vec<ItemId> = self
            .items
            .iter()
            .filter(|item| item.is_pending_upload())
            .map(|item| item.id())
            .collect();
        for id in ids {
            self.set_status(id, ItemStatus::Cancelled, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_request(count: usize) -> (UploadState, RequestId, Vec<ItemId>) {
        let mut state = UploadState::default();
        let request = RequestId::new();
        let mut members = Vec::new();
        for n in 0..count {
            let mut item = TransferItem::from_bytes(format!("f{}.txt", n), &b"data"[..]);
            item.transition(ItemStatus::Uploading);
            item.attach(request, None);
            members.push(item.id());
            state.items.push(item);
        }
        state.requests.insert(
            request,
            InFlightRequest {
                members: members.clone(),
                token: CancellationToken::new(),
            },
        );
        (state, request, members)
    }

    #[test]
    fn finish_request_reports_only_members_in_final_status() {
        let (mut state, request, members) = state_with_request(3);
        state.set_status(members[1], ItemStatus::Cancelled, None);
        assert_eq!(state.live_members(request), 2);

        let uploaded = state.finish_request(request, ItemStatus::Uploaded, None);
        assert_eq!(uploaded, vec![members[0], members[2]]);
        assert_eq!(state.item(members[1]).unwrap().status(), ItemStatus::Cancelled);
        assert!(state.requests.is_empty());
    }

    #[test]
    fn cancel_all_cancels_tokens_and_items() {
        let (mut state, request, members) = state_with_request(2);
        let token = state.requests[&request].token.clone();
        state.cancel_all();

        assert!(token.is_cancelled());
        assert!(!state.has_live_request());
        for id in members {
            assert_eq!(state.item(id).unwrap().status(), ItemStatus::Cancelled);
        }
    }

    #[test]
    fn errors_are_recorded_on_items() {
        let (mut state, request, members) = state_with_request(1);
        let failed = state.finish_request(request, ItemStatus::Errored, Some("boom"));
        assert_eq!(failed, members);
        assert_eq!(state.item(members[0]).unwrap().error(), Some("boom"));
    }
}
