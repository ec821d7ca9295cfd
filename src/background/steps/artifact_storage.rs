use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::{ProcessingStep, StepContext};
use crate::integrations::{ArtifactTarget, NamedStream};
use crate::models::Image;

pub const NAME: &str = "artifact_storage";

/// Hands converted files and the thumbnail to the storage collaborator.
pub struct ArtifactStorage;

impl ProcessingStep for ArtifactStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        let mut streams = image
            .converted_files()
            .map(|file| NamedStream::open(Path::new(&file.path)))
            .collect::<Result<Vec<_>>>()?;
        if let Some(thumbnail) = &image.thumbnail_path {
            streams.push(NamedStream::open(Path::new(thumbnail))?);
        }
        if streams.is_empty() {
            bail!("image {} has no artifacts to store", image.base.identifier);
        }

        ctx.storage.store_artifact(
            &ArtifactTarget::Image {
                project_id: ctx.project.id,
                image_id: image.id(),
            },
            streams,
        )?;
        Ok(working_path.to_path_buf())
    }
}
