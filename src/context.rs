//! The service bundle handed to every job and operation.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::background::actors::PipelineActors;
use crate::background::scheduler::Scheduler;
use crate::background::steps::{ProcessingStep, build_pipeline};
use crate::config::AppConfig;
use crate::database::Store;
use crate::integrations::{
    DatasetSource, DirectoryDatasetSource, FileSystemStorage, HttpImporter, ImageImporter,
    JsonExporter, LocalFolderImporter, ManifestSearch, MetadataExporter, MetadataSearch, Storage,
};
use crate::models::ItemSchema;

/// Collaborators the pipeline talks to. Cloning shares them.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<Store>,
    pub storage: Arc<dyn Storage>,
    pub importer: Arc<dyn ImageImporter>,
    pub search: Arc<dyn MetadataSearch>,
    pub exporter: Arc<dyn MetadataExporter>,
    pub datasets: Arc<dyn DatasetSource>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Queue post-processing when a batch finishes pre-processing.
    pub auto_post_process: bool,
    /// Queue the project export when its last live batch completes.
    pub auto_export: bool,
    pub default_schema: ItemSchema,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_post_process: true,
            auto_export: true,
            default_schema: ItemSchema::new("image"),
        }
    }
}

pub struct AppContext {
    pub services: Services,
    pub scheduler: Scheduler,
    pub settings: PipelineSettings,
}

impl AppContext {
    pub fn new(
        services: Services,
        pre_steps: Vec<Box<dyn ProcessingStep>>,
        post_steps: Vec<Box<dyn ProcessingStep>>,
        settings: PipelineSettings,
        default_workers: usize,
        high_workers: usize,
    ) -> Result<Self> {
        let actors = PipelineActors::new(services.clone(), pre_steps, post_steps, settings.clone());
        let scheduler = Scheduler::new(Arc::new(actors), default_workers, high_workers)?;
        Ok(Self {
            services,
            scheduler,
            settings,
        })
    }

    /// Builds the reference collaborators described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path)?);
        let storage: Arc<dyn Storage> = Arc::new(FileSystemStorage::new(&config.storage_root));
        let importer: Arc<dyn ImageImporter> = match &config.source_url_template {
            Some(template) => {
                info!("Downloading images over http from {}", template);
                Arc::new(HttpImporter::new(template.as_str(), &config.working_root)?)
            }
            None => {
                info!("Copying images from {}", config.source_root.display());
                Arc::new(LocalFolderImporter::new(
                    &config.source_root,
                    &config.working_root,
                    config.copy_retries,
                ))
            }
        };
        let services = Services {
            storage: storage.clone(),
            importer,
            search: Arc::new(ManifestSearch::new(config.search_manifest.clone())),
            exporter: Arc::new(JsonExporter::new(store.clone(), storage)),
            datasets: Arc::new(DirectoryDatasetSource),
            store,
        };

        let step_settings = config.step_settings()?;
        let pre_steps = build_pipeline(&config.pre_processing_steps, &step_settings)
            .context("invalid pre-processing pipeline")?;
        let post_steps = build_pipeline(&config.post_processing_steps, &step_settings)
            .context("invalid post-processing pipeline")?;
        let settings = PipelineSettings {
            auto_post_process: config.auto_post_process,
            auto_export: config.auto_export,
            default_schema: config.schema(),
        };

        Self::new(
            services,
            pre_steps,
            post_steps,
            settings,
            config.default_workers,
            config.high_workers,
        )
    }
}
