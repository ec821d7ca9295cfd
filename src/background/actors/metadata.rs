use anyhow::{Context, Result};
use log::{error, info};

use super::PipelineActors;
use crate::background::scheduler::{Priority, Scheduler};
use crate::models::{
    Batch, BatchStatus, Dataset, EntityId, Project, ProjectStatus, SearchParameters,
};

impl PipelineActors {
    pub(super) fn metadata_batch_import(
        &self,
        batch_id: &EntityId,
        parameters: &SearchParameters,
        scheduler: &Scheduler,
    ) -> Result<()> {
        let store = &self.services.store;
        let batch = store.update::<Batch, _>(batch_id, |batch| {
            Ok(batch.transition(BatchStatus::MetadataSearching)?)
        })?;

        match self.search_batch(&batch, parameters) {
            Ok(batch) => {
                let images = store.images_of_batch(&batch.id)?;
                info!(
                    "Batch {} found {} image(s); queueing downloads",
                    batch.id,
                    images.len()
                );
                for image in images {
                    scheduler.download_and_pre_process_image(image.id(), Priority::Default);
                }
                Ok(())
            }
            Err(err) => {
                if let Err(fail_err) = store.update::<Batch, _>(batch_id, |batch| {
                    Ok(batch.transition(BatchStatus::Failed)?)
                }) {
                    error!("Could not mark batch {} failed: {}", batch_id, fail_err);
                }
                Err(err)
            }
        }
    }

    fn search_batch(&self, batch: &Batch, parameters: &SearchParameters) -> Result<Batch> {
        let store = &self.services.store;
        let project = store.fetch::<Project>(&batch.project_id)?;
        let dataset = store.fetch::<Dataset>(&project.dataset_id)?;
        let items = self
            .services
            .search
            .search(batch, &dataset, parameters)
            .with_context(|| format!("metadata search failed for batch {}", batch.id))?;
        Ok(store.record_search_results(&batch.id, &items)?)
    }

    pub(super) fn metadata_project_export(&self, project_id: &EntityId) -> Result<()> {
        let store = &self.services.store;
        let project = store.update::<Project, _>(project_id, |project| {
            Ok(project.transition(ProjectStatus::Exporting)?)
        })?;

        let exported = store
            .fetch::<Dataset>(&project.dataset_id)
            .map_err(anyhow::Error::from)
            .and_then(|dataset| self.services.exporter.export(&project, &dataset));

        let next = match exported {
            Ok(()) => ProjectStatus::ExportComplete,
            Err(_) => ProjectStatus::Failed,
        };
        store.update::<Project, _>(project_id, |project| Ok(project.transition(next)?))?;

        exported.with_context(|| format!("export of project {} failed", project.name))?;
        info!("Exported project {}", project.name);
        Ok(())
    }
}
