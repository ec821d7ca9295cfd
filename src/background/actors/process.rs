use anyhow::{Result, anyhow};
use log::info;

use super::PipelineActors;
use crate::background::processor::ProcessOutcome;
use crate::background::scheduler::Scheduler;
use crate::models::{EntityId, ItemSchema};

impl PipelineActors {
    pub(super) fn pre_process_image(
        &self,
        image_id: &EntityId,
        scheduler: &Scheduler,
    ) -> Result<()> {
        let batch_id = match self
            .pre_processor
            .run(image_id, &self.settings.default_schema)?
        {
            ProcessOutcome::Completed {
                batch_advanced: false,
                ..
            } => return Ok(()),
            ProcessOutcome::Completed { batch_id, .. } => batch_id,
            // An error keeps a chained post-processing job from running.
            ProcessOutcome::Failed(failure) => return Err(anyhow!("{}", failure)),
        };

        if self.settings.auto_post_process {
            info!("Batch {} finished pre-processing; queueing post-processing", batch_id);
            scheduler.post_process_images_in_batch(batch_id, self.settings.default_schema.clone());
        }
        Ok(())
    }

    pub(super) fn post_process_image(
        &self,
        image_id: &EntityId,
        schema: &ItemSchema,
        scheduler: &Scheduler,
    ) -> Result<()> {
        let batch_id = match self.post_processor.run(image_id, schema)? {
            ProcessOutcome::Completed {
                batch_advanced: false,
                ..
            } => return Ok(()),
            ProcessOutcome::Completed { batch_id, .. } => batch_id,
            ProcessOutcome::Failed(failure) => return Err(anyhow!("{}", failure)),
        };

        let store = &self.services.store;
        let batch = store.complete_batch(&batch_id)?;
        info!("Batch {} completed", batch.id);
        if self.settings.auto_export && store.live_batches_completed(&batch.project_id)? {
            info!("Every batch of project {} is complete; queueing export", batch.project_id);
            scheduler.metadata_project_export(batch.project_id);
        }
        Ok(())
    }
}
