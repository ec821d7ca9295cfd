use anyhow::Result;
use log::{info, warn};

use super::PipelineActors;
use crate::background::scheduler::{Priority, Scheduler};
use crate::models::{Batch, BatchStatus, EntityId, ImageStatus, ItemSchema};

impl PipelineActors {
    /// Moves the batch into post-processing (unless an earlier fan-out already
    /// did) and queues one job per pre-processed image matching `schema`.
    pub(super) fn post_process_batch(
        &self,
        batch_id: &EntityId,
        schema: &ItemSchema,
        scheduler: &Scheduler,
    ) -> Result<()> {
        let store = &self.services.store;
        store.update::<Batch, _>(batch_id, |batch| {
            if batch.status() != BatchStatus::ImagePostProcessing {
                batch.transition(BatchStatus::ImagePostProcessing)?;
            }
            Ok(())
        })?;

        let mut queued = 0usize;
        let mut other_schema = 0usize;
        for image in store.images_of_batch(batch_id)? {
            if image.status() != ImageStatus::PreProcessed {
                continue;
            }
            if schema.matches(&image.base) {
                scheduler.post_process_image(image.id(), schema.clone(), Priority::Default);
                queued += 1;
            } else {
                other_schema += 1;
            }
        }

        if other_schema > 0 {
            warn!(
                "Batch {}: {} pre-processed image(s) do not match schema `{}`; \
                 start post-processing with their schema to finish the batch",
                batch_id, other_schema, schema.name
            );
        }
        info!("Batch {}: queued post-processing for {} image(s)", batch_id, queued);
        Ok(())
    }
}
