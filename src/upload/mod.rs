//! Upload queue and request coordination
//!
//! Items are queued as `pending` and sent by `UploadCoordinator::upload`,
//! either grouped in one multipart request or one request per item. Each
//! request owns a cancellation token shared by all of its items and reports
//! progress and a single terminal event on the receiver returned by `upload`.

mod coordinator;
mod state;
mod types;
mod worker;

pub use coordinator::UploadCoordinator;
pub use types::{ItemStatus, TransferItem, UploadEvent};
