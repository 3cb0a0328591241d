//! File download coordination
//!
//! A download job covers one logical download:
//! - a single plain file is fetched directly
//! - anything else is bundled by the server first, then the bundle is fetched
//!
//! Each phase runs under its own cancellation token, a child of the job's
//! token, so cancelling a job aborts whichever phase is running.

mod coordinator;
mod types;
mod worker;

pub use coordinator::DownloadCoordinator;
pub use types::{needs_bundle, DownloadEvent, DownloadJob, JobPhase};
