use anyhow::Result;
use log::{info, warn};

use super::OperationError;
use super::project::{ensure_idle, image_identities};
use crate::background::scheduler::JobIdentity;
use crate::context::AppContext;
use crate::models::{
    Batch, BatchStatus, ItemSchema, Project, SearchParameters, StatusMachine,
};

/// Adds a non-default batch. An exported project goes back to `InProgress`.
pub fn create_batch(ctx: &AppContext, project_id: &str, name: &str) -> Result<Batch> {
    let store = &ctx.services.store;
    let project = store.fetch::<Project>(project_id)?;
    let batch = Batch::new(name, project.id, false);
    store.insert_batch(&batch)?;
    info!("Created batch {} ({}) in project {}", batch.name, batch.id, project.name);
    Ok(batch)
}

pub fn set_default_batch(ctx: &AppContext, batch_id: &str) -> Result<Batch> {
    Ok(ctx.services.store.set_default_batch(batch_id)?)
}

/// Queues the metadata search that fills the batch with items.
pub fn start_batch(ctx: &AppContext, batch_id: &str, parameters: SearchParameters) -> Result<()> {
    let batch = ctx.services.store.fetch::<Batch>(batch_id)?;
    require(&batch, BatchStatus::MetadataSearching, "metadata search")?;
    parameters.compile()?;
    ctx.scheduler.metadata_batch_import(batch.id, parameters);
    Ok(())
}

/// Drops the batch's items so the metadata search can run again.
pub fn reset_batch(ctx: &AppContext, batch_id: &str) -> Result<Batch> {
    let store = &ctx.services.store;
    let batch = store.fetch::<Batch>(batch_id)?;
    require(&batch, BatchStatus::Initialized, "reset")?;

    let mut identities = vec![JobIdentity::Batch(batch.id)];
    identities.extend(image_identities(
        store.items_of_batch(batch_id)?.iter().map(|item| item.id()),
    ));
    ensure_idle(ctx, &identities)?;

    let (batch, removed) = store.reset_batch(batch_id)?;
    info!("Reset batch {}; removed {} item(s)", batch.name, removed.len());
    Ok(batch)
}

/// Fans post-processing out over the images matching `schema`. A batch already
/// in post-processing accepts another run, which picks up the pre-processed
/// images an earlier schema left behind.
pub fn start_post_processing(ctx: &AppContext, batch_id: &str, schema: ItemSchema) -> Result<()> {
    let batch = ctx.services.store.fetch::<Batch>(batch_id)?;
    if batch.status() != BatchStatus::ImagePostProcessing {
        require(&batch, BatchStatus::ImagePostProcessing, "post-processing")?;
    }
    ctx.scheduler.post_process_images_in_batch(batch.id, schema);
    Ok(())
}

/// Gives up on a batch, typically one stuck with permanently failed images.
pub fn mark_batch_failed(ctx: &AppContext, batch_id: &str) -> Result<Batch> {
    let batch = ctx
        .services
        .store
        .update::<Batch, _>(batch_id, |batch| Ok(batch.transition(BatchStatus::Failed)?))?;
    warn!("Batch {} ({}) marked failed", batch.name, batch.id);
    Ok(batch)
}

fn require(batch: &Batch, next: BatchStatus, what: &str) -> Result<(), OperationError> {
    if batch.status().can_transition_to(next) {
        Ok(())
    } else {
        Err(OperationError::NotReady {
            what: format!("{} of batch {}", what, batch.name),
            status: format!("{:?}", batch.status()),
        })
    }
}
