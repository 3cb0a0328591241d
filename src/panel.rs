//! Closing and auto-hiding the upload and download status panels

use crate::config::FileManagerConfig;
use crate::download::DownloadCoordinator;
use crate::upload::UploadCoordinator;
use log::debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A panel listing transfers that the user may close
pub trait StatusPanel {
    /// Nothing left running or awaiting attention
    fn is_settled(&self) -> bool;

    /// Cancel everything still running
    fn discard(&self);

    /// Drop finished entries from the panel
    fn dismiss(&self);
}

impl StatusPanel for UploadCoordinator {
    fn is_settled(&self) -> bool {
        UploadCoordinator::is_settled(self)
    }

    fn discard(&self) {
        self.cancel();
    }

    fn dismiss(&self) {
        self.remove_finished();
    }
}

impl StatusPanel for DownloadCoordinator {
    fn is_settled(&self) -> bool {
        self.all_resolved()
    }

    fn discard(&self) {
        self.cancel_all();
    }

    fn dismiss(&self) {
        self.remove_resolved();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    /// The panel was settled and has been emptied
    Closed,
    /// Transfers are still running; ask before calling `confirm_discard`
    NeedsConfirmation,
}

pub fn request_close(panel: &dyn StatusPanel) -> CloseRequest {
    if panel.is_settled() {
        panel.dismiss();
        CloseRequest::Closed
    } else {
        CloseRequest::NeedsConfirmation
    }
}

/// Close anyway: cancel what is running, then empty the panel
pub fn confirm_discard(panel: &dyn StatusPanel) {
    panel.discard();
    panel.dismiss();
}

/// Hides a settled panel after a delay unless cancelled first.
///
/// Dropping the handle does not cancel the timer.
#[derive(Debug, Clone)]
pub struct AutoHide {
    delay: Duration,
    token: CancellationToken,
}

impl AutoHide {
    /// Run `hide` after `delay`. Must be called from within a Tokio runtime.
    pub fn schedule<F>(delay: Duration, hide: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => debug!("auto_hide: cancelled"),
                _ = tokio::time::sleep(delay) => {
                    debug!("auto_hide: firing after {:?}", delay);
                    hide();
                }
            }
        });
        Self { delay, token }
    }

    /// `None` when auto-hide is turned off
    pub fn from_config<F>(config: &FileManagerConfig, hide: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        config
            .auto_hide
            .then(|| Self::schedule(config.auto_hide_timeout(), hide))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
