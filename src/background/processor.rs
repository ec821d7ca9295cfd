//! Drives one image through an ordered list of [`ProcessingStep`]s.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use thiserror::Error;

use super::steps::{ProcessingStep, StepContext};
use crate::common::errors::panic_message;
use crate::common::utils::PathExt;
use crate::database::{Store, StoreError};
use crate::integrations::Storage;
use crate::models::{
    Batch, BatchStatus, EntityId, EntityKind, Image, ImageStatus, InvalidTransition, ItemSchema,
    Project,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreProcessing,
    PostProcessing,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::PreProcessing => "pre-processing",
            Phase::PostProcessing => "post-processing",
        }
    }

    pub fn processing(self) -> ImageStatus {
        match self {
            Phase::PreProcessing => ImageStatus::PreProcessing,
            Phase::PostProcessing => ImageStatus::PostProcessing,
        }
    }

    pub fn complete(self) -> ImageStatus {
        match self {
            Phase::PreProcessing => ImageStatus::PreProcessed,
            Phase::PostProcessing => ImageStatus::PostProcessed,
        }
    }

    pub fn batch_processing(self) -> BatchStatus {
        match self {
            Phase::PreProcessing => BatchStatus::ImagePreProcessing,
            Phase::PostProcessing => BatchStatus::ImagePostProcessing,
        }
    }

    pub fn batch_complete(self) -> BatchStatus {
        match self {
            Phase::PreProcessing => BatchStatus::ImagePreProcessingComplete,
            Phase::PostProcessing => BatchStatus::ImagePostProcessingComplete,
        }
    }
}

/// Errors that abort a run before or around the steps. Step failures are not
/// errors; they are reported through [`ProcessOutcome::Failed`].
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("image {image_id} has no working directory; it was never downloaded")]
    MissingWorkingDirectory { image_id: EntityId },
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("item {0} is not an image")]
    NotAnImage(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProcessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidTransition(transition) => {
                ProcessError::InvalidTransition(transition)
            }
            StoreError::NotFound { kind, id } => ProcessError::NotFound { kind, id },
            StoreError::NotAnImage(id) => ProcessError::NotAnImage(id),
            other => ProcessError::Store(other),
        }
    }
}

impl From<InvalidTransition> for ProcessError {
    fn from(err: InvalidTransition) -> Self {
        ProcessError::InvalidTransition(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub image_id: EntityId,
    pub message: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step `{}` failed for image {}: {}",
            self.step, self.image_id, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed {
        batch_id: EntityId,
        /// This run was the one that moved the batch to its phase-complete status.
        batch_advanced: bool,
    },
    Failed(StepFailure),
}

pub struct ImageProcessor {
    phase: Phase,
    steps: Vec<Box<dyn ProcessingStep>>,
    store: Arc<Store>,
    storage: Arc<dyn Storage>,
}

impl ImageProcessor {
    pub fn new(
        phase: Phase,
        steps: Vec<Box<dyn ProcessingStep>>,
        store: Arc<Store>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            phase,
            steps,
            store,
            storage,
        }
    }

    pub fn run(
        &self,
        image_id: &str,
        schema: &ItemSchema,
    ) -> Result<ProcessOutcome, ProcessError> {
        let image = self.store.image(image_id)?;
        let folder_path = image
            .folder_path
            .clone()
            .ok_or(ProcessError::MissingWorkingDirectory {
                image_id: image.id(),
            })?;
        let batch = self.store.fetch::<Batch>(&image.base.batch_id)?;
        let project = self.store.fetch::<Project>(&batch.project_id)?;

        let image = self
            .store
            .update_image(image_id, |image| Ok(image.transition(self.phase.processing())?))?;

        let start = Instant::now();
        let ctx = StepContext {
            schema,
            storage: self.storage.as_ref(),
            project: &project,
        };
        let mut working = image.clone();
        let result = self.run_steps(&ctx, &mut working, PathBuf::from(folder_path));
        self.cleanup_all(&project, &image);

        match result {
            Ok(final_path) => {
                working.folder_path = Some(final_path.lossy_string());
                self.store.update_image(image_id, |stored| {
                    stored.transition(self.phase.complete())?;
                    stored.absorb_pipeline_fields(working);
                    Ok(())
                })?;
                let batch_advanced = self.store.advance_batch_if_complete(
                    &batch.id,
                    self.phase.batch_processing(),
                    self.phase.batch_complete(),
                    self.phase.complete(),
                )?;

                info!(
                    duration = &*format!("{:?}", start.elapsed());
                    "Finished {} of image {}", self.phase.name(), image.base.identifier
                );
                if batch_advanced {
                    info!("Batch {} reached {:?}", batch.id, self.phase.batch_complete());
                }
                Ok(ProcessOutcome::Completed {
                    batch_id: batch.id,
                    batch_advanced,
                })
            }
            Err(failure) => {
                let message = failure.to_string();
                self.store
                    .update_image(image_id, |stored| Ok(stored.fail(message)?))?;
                warn!(
                    duration = &*format!("{:?}", start.elapsed());
                    "Failed {} of image {}: {}", self.phase.name(), image.base.identifier, failure
                );
                Ok(ProcessOutcome::Failed(failure))
            }
        }
    }

    /// Runs steps in order and stops at the first failure. A panic counts as a failure.
    fn run_steps(
        &self,
        ctx: &StepContext<'_>,
        image: &mut Image,
        mut working_path: PathBuf,
    ) -> Result<PathBuf, StepFailure> {
        for step in &self.steps {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| step.run(ctx, image, &working_path)));
            working_path = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(err)) => {
                    return Err(StepFailure {
                        step: step.name(),
                        image_id: image.id(),
                        message: format!("{:#}", err),
                    });
                }
                Err(payload) => {
                    return Err(StepFailure {
                        step: step.name(),
                        image_id: image.id(),
                        message: format!("panicked: {}", panic_message(payload.as_ref())),
                    });
                }
            };
        }
        Ok(working_path)
    }

    /// Every step is cleaned up, in order, including those that never ran.
    fn cleanup_all(&self, project: &Project, image: &Image) {
        for step in &self.steps {
            match panic::catch_unwind(AssertUnwindSafe(|| step.cleanup(project, image))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    "Cleanup of step `{}` failed for image {}: {:#}",
                    step.name(),
                    image.base.identifier,
                    err
                ),
                Err(payload) => warn!(
                    "Cleanup of step `{}` panicked for image {}: {}",
                    step.name(),
                    image.base.identifier,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}
