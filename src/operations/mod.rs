//! Actions a user (or the REST layer in front of this crate) triggers. They
//! validate against the store and hand the long-running work to the scheduler.

pub mod batch;
pub mod project;
pub mod recovery;
pub mod redo;

use thiserror::Error;

use crate::background::scheduler::JobIdentity;

pub use batch::{
    create_batch, mark_batch_failed, reset_batch, set_default_batch, start_batch,
    start_post_processing,
};
pub use project::{create_project, delete_project, export_project, import_dataset};
pub use recovery::{RecoveryReport, recover_interrupted_images};
pub use redo::{redo_image_download, redo_image_pre_processing};

#[derive(Debug, Error)]
pub enum OperationError {
    /// A job for the entity is running and cannot be interrupted.
    #[error("{0} is busy; wait for its running job to finish")]
    Busy(JobIdentity),
    #[error("{what} cannot start while in {status}")]
    NotReady { what: String, status: String },
    #[error("image {0} was never downloaded; redo the download instead")]
    NotDownloaded(String),
}
