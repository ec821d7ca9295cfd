//! Redo of a failed image. The image is reset through the back-transitions of
//! its status machine and the matching jobs are queued on the high priority
//! class.

use anyhow::Result;
use log::info;

use super::OperationError;
use super::project::ensure_idle;
use crate::background::scheduler::{JobIdentity, Priority};
use crate::context::AppContext;
use crate::models::{Batch, BatchStatus, Image, ImageStatus};

/// `Failed -> NotStarted`, then download and pre-processing again.
pub fn redo_image_download(ctx: &AppContext, image_id: &str) -> Result<Image> {
    let store = &ctx.services.store;
    let image = store.image(image_id)?;
    ensure_idle(ctx, &[JobIdentity::Image(image.id())])?;

    let image = store.update_image(image_id, |image| {
        image.transition(ImageStatus::NotStarted)?;
        image.clear_download();
        Ok(())
    })?;

    if batch_in_post_processing(ctx, &image)? {
        ctx.scheduler.download_and_process_image(
            image.id(),
            ctx.settings.default_schema.clone(),
            Priority::High,
        );
    } else {
        ctx.scheduler
            .download_and_pre_process_image(image.id(), Priority::High);
    }
    info!("Redoing download of image {}", image.base.identifier);
    Ok(image)
}

/// `Failed -> Downloaded`, then pre-processing again on the files already downloaded.
pub fn redo_image_pre_processing(ctx: &AppContext, image_id: &str) -> Result<Image> {
    let store = &ctx.services.store;
    let image = store.image(image_id)?;
    if image.folder_path.is_none() {
        return Err(OperationError::NotDownloaded(image.base.identifier.clone()).into());
    }
    ensure_idle(ctx, &[JobIdentity::Image(image.id())])?;

    let image = store.update_image(image_id, |image| {
        Ok(image.transition(ImageStatus::Downloaded)?)
    })?;

    if batch_in_post_processing(ctx, &image)? {
        ctx.scheduler.pre_and_post_process_image(
            image.id(),
            ctx.settings.default_schema.clone(),
            Priority::High,
        );
    } else {
        ctx.scheduler.pre_process_image(image.id(), Priority::High);
    }
    info!("Redoing pre-processing of image {}", image.base.identifier);
    Ok(image)
}

/// The batch fan-out already ran, so the image has to be post-processed on its own.
fn batch_in_post_processing(ctx: &AppContext, image: &Image) -> Result<bool> {
    let batch = ctx.services.store.fetch::<Batch>(&image.base.batch_id)?;
    Ok(batch.status() == BatchStatus::ImagePostProcessing)
}
