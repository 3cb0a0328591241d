//! Breadcrumb stack of folder filters
//!
//! Every frame pairs the filter used to query the table with the folder entry
//! that produced it. The top frame is the folder currently displayed; its
//! filter scopes queries, uploads and folder inserts.

use crate::model::{FileEntry, QueryFilter, FOLDER_PARENT_KEY};
use log::debug;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct StateFrame {
    pub filter: QueryFilter,
    pub parent_item: Option<FileEntry>,
}

#[derive(Debug, Default)]
struct StackState {
    base: QueryFilter,
    frames: Vec<StateFrame>,
}

/// Cheaply cloneable handle; clones share the same stack.
#[derive(Debug, Clone)]
pub struct NavigationStateStack {
    state: Arc<watch::Sender<StackState>>,
}

impl Default for NavigationStateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationStateStack {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StackState::default());
        Self {
            state: Arc::new(sender),
        }
    }

    /// Filter merged under every frame, e.g. the parent keys of the host form
    pub fn set_base_filter(&self, base: QueryFilter) {
        self.state.send_modify(|state| state.base = base);
    }

    /// Enter a folder. Returns the new current filter.
    pub fn push(&self, filter: QueryFilter, parent_item: Option<FileEntry>) -> QueryFilter {
        self.state.send_modify(|state| {
            state.frames.push(StateFrame {
                filter,
                parent_item,
            })
        });
        debug!("navigation: pushed frame, depth={}", self.len());
        self.current()
    }

    pub fn current(&self) -> QueryFilter {
        let state = self.state.borrow();
        let mut filter = state.base.clone();
        if let Some(top) = state.frames.last() {
            filter.extend(top.filter.clone());
        }
        filter
    }

    /// Id of the folder currently displayed, `None` at the root
    pub fn current_folder_id(&self) -> Option<String> {
        match self.current().get(FOLDER_PARENT_KEY)? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Drop every frame after `index`. Out-of-range indexes change nothing.
    pub fn truncate_to(&self, index: usize) -> Option<QueryFilter> {
        let changed = self.state.send_if_modified(|state| {
            if index >= state.frames.len() {
                return false;
            }
            state.frames.truncate(index + 1);
            true
        });
        if changed {
            debug!("navigation: truncated to frame {}", index);
            Some(self.current())
        } else {
            None
        }
    }

    /// Back to the root folder
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            let had_frames = !state.frames.is_empty();
            state.frames.clear();
            had_frames
        });
    }

    pub fn frames(&self) -> Vec<StateFrame> {
        self.state.borrow().frames.clone()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver notified on every mutation, yielding the breadcrumb frames
    pub fn subscribe(&self) -> Breadcrumbs {
        Breadcrumbs {
            receiver: self.state.subscribe(),
        }
    }
}

/// Live view of the breadcrumb trail
#[derive(Debug)]
pub struct Breadcrumbs {
    receiver: watch::Receiver<StackState>,
}

impl Breadcrumbs {
    /// Wait for the next mutation and return the frames after it
    pub async fn changed(&mut self) -> Option<Vec<StateFrame>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().frames.clone())
    }

    pub fn frames(&self) -> Vec<StateFrame> {
        self.receiver.borrow().frames.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(folder: &str) -> QueryFilter {
        let mut filter = QueryFilter::new();
        filter.insert(FOLDER_PARENT_KEY.to_string(), json!(folder));
        filter
    }

    #[test]
    fn truncate_returns_filter_pushed_at_index() {
        let stack = NavigationStateStack::new();
        stack.push(filter("f1"), None);
        stack.push(filter("f2"), Some(FileEntry::folder("f2", "two")));

        assert_eq!(stack.truncate_to(0), Some(filter("f1")));
        assert_eq!(stack.current(), filter("f1"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn truncate_out_of_range_is_a_no_op() {
        let stack = NavigationStateStack::new();
        stack.push(filter("f1"), None);
        assert_eq!(stack.truncate_to(3), None);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn root_has_no_folder_and_base_filter_is_merged() {
        let stack = NavigationStateStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.current_folder_id(), None);

        let mut base = QueryFilter::new();
        base.insert("workspaceId".to_string(), json!(9));
        stack.set_base_filter(base);
        stack.push(filter("f1"), None);

        let current = stack.current();
        assert_eq!(current.get("workspaceId"), Some(&json!(9)));
        assert_eq!(stack.current_folder_id().as_deref(), Some("f1"));

        stack.reset();
        assert!(stack.is_empty());
        assert_eq!(stack.current_folder_id(), None);
    }

    #[test]
    fn clones_share_the_same_stack() {
        let stack = NavigationStateStack::new();
        let other = stack.clone();
        other.push(filter("f1"), None);
        assert_eq!(stack.current_folder_id().as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let stack = NavigationStateStack::new();
        let mut crumbs = stack.subscribe();

        stack.push(filter("f1"), None);
        let frames = crumbs.changed().await.unwrap();
        assert_eq!(frames.len(), 1);

        stack.push(filter("f2"), None);
        stack.truncate_to(0);
        let frames = crumbs.changed().await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].filter, filter("f1"));
        assert_eq!(crumbs.frames().len(), 1);
    }
}
