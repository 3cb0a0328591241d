//! Session access for outgoing requests

use log::info;
use std::sync::{Mutex, PoisonError};

/// Source of the session identifier sent as a bearer token.
///
/// `invalidate` is called once for every 401 response; implementations
/// typically log the user out.
pub trait SessionProvider: Send + Sync {
    fn session_id(&self) -> Option<String>;
    fn invalidate(&self);
}

pub(crate) fn bearer_token(session: &dyn SessionProvider) -> Option<String> {
    session
        .session_id()
        .filter(|id| !id.is_empty())
        .map(|id| format!("Bearer {}", id))
}

/// Session holding a fixed identifier until invalidated
#[derive(Debug, Default)]
pub struct StaticSession {
    id: Mutex<Option<String>>,
}

impl StaticSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Mutex::new(Some(id.into())),
        }
    }
}

impl SessionProvider for StaticSession {
    fn session_id(&self) -> Option<String> {
        self.id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn invalidate(&self) {
        info!("session invalidated");
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
