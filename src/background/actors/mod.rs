//! Job bodies. [`PipelineActors`] turns each [`JobKind`] into calls on the
//! store, the collaborators and the two image processors.

mod dataset;
mod download;
mod fan_out;
mod metadata;
mod process;

use anyhow::Result;

use super::processor::{ImageProcessor, Phase};
use super::scheduler::{JobExecutor, JobKind, Scheduler};
use super::steps::ProcessingStep;
use crate::context::{PipelineSettings, Services};

pub struct PipelineActors {
    services: Services,
    pre_processor: ImageProcessor,
    post_processor: ImageProcessor,
    settings: PipelineSettings,
}

impl PipelineActors {
    pub fn new(
        services: Services,
        pre_steps: Vec<Box<dyn ProcessingStep>>,
        post_steps: Vec<Box<dyn ProcessingStep>>,
        settings: PipelineSettings,
    ) -> Self {
        let pre_processor = ImageProcessor::new(
            Phase::PreProcessing,
            pre_steps,
            services.store.clone(),
            services.storage.clone(),
        );
        let post_processor = ImageProcessor::new(
            Phase::PostProcessing,
            post_steps,
            services.store.clone(),
            services.storage.clone(),
        );
        Self {
            services,
            pre_processor,
            post_processor,
            settings,
        }
    }
}

impl JobExecutor for PipelineActors {
    fn execute(&self, job: &JobKind, scheduler: &Scheduler) -> Result<()> {
        match job {
            JobKind::DownloadImage { image_id } => self.download_image(image_id),
            JobKind::PreProcessImage { image_id } => self.pre_process_image(image_id, scheduler),
            JobKind::PostProcessImage { image_id, schema } => {
                self.post_process_image(image_id, schema, scheduler)
            }
            JobKind::PostProcessBatch { batch_id, schema } => {
                self.post_process_batch(batch_id, schema, scheduler)
            }
            JobKind::MetadataBatchImport {
                batch_id,
                parameters,
            } => self.metadata_batch_import(batch_id, parameters, scheduler),
            JobKind::MetadataProjectExport { project_id } => {
                self.metadata_project_export(project_id)
            }
            JobKind::DatasetImport { path } => self.dataset_import(path),
        }
    }
}
