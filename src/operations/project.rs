use std::path::PathBuf;

use anyhow::Result;
use log::info;

use super::OperationError;
use crate::background::scheduler::JobIdentity;
use crate::context::AppContext;
use crate::models::{Batch, Dataset, EntityId, Project, ProjectStatus, StatusMachine};

/// Creates a project with its default batch.
pub fn create_project(ctx: &AppContext, name: &str, dataset_id: &str) -> Result<Project> {
    let store = &ctx.services.store;
    let dataset = store.fetch::<Dataset>(dataset_id)?;
    let project = Project::new(name, dataset.id);
    let batch = Batch::new("default", project.id, true);
    store.create_project(&project, &batch)?;
    info!("Created project {} ({}) on dataset {}", project.name, project.id, dataset.name);
    Ok(project)
}

pub fn export_project(ctx: &AppContext, project_id: &str) -> Result<()> {
    let project = ctx.services.store.fetch::<Project>(project_id)?;
    if !project.status().can_transition_to(ProjectStatus::Exporting) {
        return Err(OperationError::NotReady {
            what: format!("export of project {}", project.name),
            status: format!("{:?}", project.status()),
        }
        .into());
    }
    ctx.scheduler.metadata_project_export(project.id);
    Ok(())
}

pub fn import_dataset(ctx: &AppContext, path: impl Into<PathBuf>) {
    ctx.scheduler.dataset_import(path.into());
}

/// Tombstones the project and its batches and removes their items. Pending
/// jobs are cancelled first; a running job makes the call fail.
pub fn delete_project(ctx: &AppContext, project_id: &str) -> Result<()> {
    let store = &ctx.services.store;
    let project = store.fetch::<Project>(project_id)?;

    let mut identities = vec![JobIdentity::Project(project.id)];
    for batch in store.batches_of_project(project_id)? {
        identities.push(JobIdentity::Batch(batch.id));
        for item in store.items_of_batch(&batch.id)? {
            identities.push(JobIdentity::Image(item.id()));
        }
    }
    ensure_idle(ctx, &identities)?;

    let removed = store.delete_project_cascade(project_id)?;
    info!("Deleted project {} and {} item(s)", project.name, removed.len());
    Ok(())
}

/// Cancels whatever is pending for `identities` and fails on the first one still running.
pub(super) fn ensure_idle(ctx: &AppContext, identities: &[JobIdentity]) -> Result<()> {
    for identity in identities {
        ctx.scheduler.cancel(identity);
    }
    match identities
        .iter()
        .find(|identity| ctx.scheduler.is_active(identity))
    {
        Some(identity) => Err(OperationError::Busy(identity.clone()).into()),
        None => Ok(()),
    }
}

pub(super) fn image_identities(ids: impl IntoIterator<Item = EntityId>) -> Vec<JobIdentity> {
    ids.into_iter().map(JobIdentity::Image).collect()
}
