use anyhow::Result;
use log::{info, warn};

use crate::background::scheduler::JobIdentity;
use crate::context::AppContext;
use crate::models::{Batch, BatchStatus};

pub const INTERRUPTED_MESSAGE: &str = "interrupted: no worker owned the image at startup";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub failed_images: usize,
    pub failed_batches: usize,
}

/// Images left in an in-flight status by a previous process are failed so
/// they can be redone. Batches caught mid-search are failed too.
pub fn recover_interrupted_images(ctx: &AppContext) -> Result<RecoveryReport> {
    let store = &ctx.services.store;
    let mut report = RecoveryReport::default();

    for image in store.images_with_status(|status| status.is_in_flight())? {
        if ctx.scheduler.is_active(&JobIdentity::Image(image.id())) {
            continue;
        }
        store.update_image(&image.id(), |image| Ok(image.fail(INTERRUPTED_MESSAGE)?))?;
        warn!(
            "Image {} was left in {:?}; marked failed",
            image.base.identifier,
            image.status()
        );
        report.failed_images += 1;
    }

    for batch in store.batches_with_status(BatchStatus::MetadataSearching)? {
        if ctx.scheduler.is_active(&JobIdentity::Batch(batch.id)) {
            continue;
        }
        store.update::<Batch, _>(&batch.id, |batch| Ok(batch.transition(BatchStatus::Failed)?))?;
        warn!("Batch {} was interrupted during metadata search; marked failed", batch.name);
        report.failed_batches += 1;
    }

    info!(
        "Recovery finished: {} image(s) and {} batch(es) marked failed",
        report.failed_images, report.failed_batches
    );
    Ok(report)
}
