use anyhow::{Context, Result};
use log::info;

use super::PipelineActors;
use crate::common::utils::PathExt;
use crate::models::{Batch, EntityId, ImageFile, ImageStatus, Project};

impl PipelineActors {
    pub(super) fn download_image(&self, image_id: &EntityId) -> Result<()> {
        let store = &self.services.store;
        let image = store.image(image_id)?;
        let batch = store.fetch::<Batch>(&image.base.batch_id)?;
        let project = store.fetch::<Project>(&batch.project_id)?;

        let image = store
            .update_image(image_id, |image| Ok(image.transition(ImageStatus::Downloading)?))
            .context("failed to start download")?;

        match self.services.importer.download(&image, &project) {
            Ok(downloaded) => {
                let count = downloaded.files.len();
                store.update_image(image_id, |image| {
                    image.folder_path = Some(downloaded.folder_path.lossy_string());
                    image.files = downloaded
                        .files
                        .iter()
                        .map(|path| ImageFile::source(path.lossy_string()))
                        .collect();
                    Ok(image.transition(ImageStatus::Downloaded)?)
                })?;
                info!("Downloaded image {} ({} file(s))", image.base.identifier, count);
                Ok(())
            }
            Err(err) => {
                let message = format!("download failed: {:#}", err);
                store.update_image(image_id, |image| Ok(image.fail(message)?))?;
                Err(err.context(format!("failed to download image {}", image.base.identifier)))
            }
        }
    }
}
