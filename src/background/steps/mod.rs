//! Units of work in an image pipeline.
//!
//! Steps hold configuration only. Everything produced for one image lives in
//! the [`Image`] being threaded through the pipeline or under its working
//! directory, so a single step value serves every worker at once.

pub mod artifact_storage;
pub mod finish;
pub mod format_conversion;
pub mod prepare;
pub mod thumbnail;

use std::fs::read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::config::ConfigError;
use crate::integrations::Storage;
use crate::models::{Image, ItemSchema, Project};

pub use artifact_storage::ArtifactStorage;
pub use finish::Finish;
pub use format_conversion::{ExternalConverter, FormatConversion, TargetFormat};
pub use prepare::Preparation;
pub use thumbnail::ThumbnailGeneration;

/// Per-run inputs shared by every step of one pipeline pass.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub schema: &'a ItemSchema,
    pub storage: &'a dyn Storage,
    pub project: &'a Project,
}

pub trait ProcessingStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Works under `working_path` and returns the working path for the next step.
    /// Must not change the image status.
    fn run(
        &self,
        ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf>;

    /// Called once per pipeline run whether or not `run` was reached.
    fn cleanup(&self, _project: &Project, _image: &Image) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StepSettings {
    pub thumbnail_size: u32,
    pub target_format: TargetFormat,
    pub converter: Option<ExternalConverter>,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            thumbnail_size: crate::common::DEFAULT_THUMBNAIL_SIZE,
            target_format: TargetFormat::Png,
            converter: None,
        }
    }
}

pub fn build_step(
    name: &str,
    settings: &StepSettings,
) -> Result<Box<dyn ProcessingStep>, ConfigError> {
    let step: Box<dyn ProcessingStep> = match name {
        prepare::NAME => Box::new(Preparation),
        format_conversion::NAME => Box::new(FormatConversion::new(
            settings.target_format,
            settings.converter.clone(),
        )),
        thumbnail::NAME => Box::new(ThumbnailGeneration::new(settings.thumbnail_size)),
        artifact_storage::NAME => Box::new(ArtifactStorage),
        finish::NAME => Box::new(Finish),
        other => return Err(ConfigError::UnknownStep(other.to_string())),
    };
    Ok(step)
}

pub fn build_pipeline<S: AsRef<str>>(
    names: &[S],
    settings: &StepSettings,
) -> Result<Vec<Box<dyn ProcessingStep>>, ConfigError> {
    names
        .iter()
        .map(|name| build_step(name.as_ref().trim(), settings))
        .collect()
}

pub(crate) fn decode_image(path: &Path) -> Result<DynamicImage> {
    let bytes =
        read(path).with_context(|| format!("failed to read file into memory: {:?}", path))?;
    image::load_from_memory(&bytes)
        .with_context(|| format!("failed to decode image: {:?}", path))
}
