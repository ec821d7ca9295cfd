use crate::database::schema::{BATCH_TABLE, PROJECT_BATCHES_TABLE, PROJECT_TABLE};
use crate::database::{Store, StoreError, read_record, related_ids, write_record};
use crate::models::{Batch, BatchStatus, EntityKind, Project, ProjectStatus, StatusMachine};

use super::remove_items;

impl Store {
    pub fn create_project(
        &self,
        project: &Project,
        default_batch: &Batch,
    ) -> Result<(), StoreError> {
        let txn = self.begin_write()?;
        {
            let mut projects = txn.open_table(PROJECT_TABLE)?;
            write_record(&mut projects, project)?;
            let mut batches = txn.open_table(BATCH_TABLE)?;
            write_record(&mut batches, default_batch)?;
            let mut relation = txn.open_table(PROJECT_BATCHES_TABLE)?;
            relation.insert((project.id.as_str(), default_batch.id.as_str()), ())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Batches of a project, oldest first. Tombstoned batches are included.
    pub fn batches_of_project(&self, project_id: &str) -> Result<Vec<Batch>, StoreError> {
        let txn = self.begin_read()?;
        let relation = txn.open_table(PROJECT_BATCHES_TABLE)?;
        let table = txn.open_table(BATCH_TABLE)?;
        let mut batches: Vec<Batch> = Vec::new();
        for id in related_ids(&relation, project_id)? {
            if let Some(batch) = read_record(&table, &id)? {
                batches.push(batch);
            }
        }
        batches.sort_by_key(|batch| batch.created_time);
        Ok(batches)
    }

    /// Adds a batch to its project. A project that already exported goes back to `InProgress`.
    pub fn insert_batch(&self, batch: &Batch) -> Result<Project, StoreError> {
        let txn = self.begin_write()?;
        let project = {
            let mut projects = txn.open_table(PROJECT_TABLE)?;
            let mut project: Project = read_record(&projects, &batch.project_id)?
                .ok_or_else(|| {
                    StoreError::not_found(EntityKind::Project, batch.project_id.as_str())
                })?;
            if project.status() != ProjectStatus::InProgress {
                project.transition(ProjectStatus::InProgress)?;
                write_record(&mut projects, &project)?;
            }

            let mut batches = txn.open_table(BATCH_TABLE)?;
            write_record(&mut batches, batch)?;
            let mut relation = txn.open_table(PROJECT_BATCHES_TABLE)?;
            relation.insert((batch.project_id.as_str(), batch.id.as_str()), ())?;
            project
        };
        txn.commit()?;
        Ok(project)
    }

    /// Makes `batch_id` the only default batch of its project.
    pub fn set_default_batch(&self, batch_id: &str) -> Result<Batch, StoreError> {
        let txn = self.begin_write()?;
        let chosen = {
            let mut batches = txn.open_table(BATCH_TABLE)?;
            let chosen: Batch = read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?;
            let relation = txn.open_table(PROJECT_BATCHES_TABLE)?;
            for id in related_ids(&relation, &chosen.project_id)? {
                let Some(mut batch) = read_record::<Batch>(&batches, &id)? else {
                    continue;
                };
                let is_default = id == batch_id;
                if batch.is_default != is_default {
                    batch.is_default = is_default;
                    write_record(&mut batches, &batch)?;
                }
            }
            read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?
        };
        txn.commit()?;
        Ok(chosen)
    }

    /// Whether the project has at least one live batch and every live batch is `Completed`.
    pub fn live_batches_completed(&self, project_id: &str) -> Result<bool, StoreError> {
        let live: Vec<Batch> = self
            .batches_of_project(project_id)?
            .into_iter()
            .filter(|batch| !batch.status().is_terminal())
            .collect();
        Ok(!live.is_empty()
            && live
                .iter()
                .all(|batch| batch.status() == BatchStatus::Completed))
    }

    /// Tombstones the project and its live batches and removes every item.
    /// Returns the ids of the removed items.
    pub fn delete_project_cascade(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        let txn = self.begin_write()?;
        let mut removed = Vec::new();
        {
            let mut projects = txn.open_table(PROJECT_TABLE)?;
            let mut project: Project = read_record(&projects, project_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Project, project_id))?;
            project.transition(ProjectStatus::Deleted)?;
            write_record(&mut projects, &project)?;

            let batch_ids = {
                let relation = txn.open_table(PROJECT_BATCHES_TABLE)?;
                related_ids(&relation, project_id)?
            };
            for batch_id in batch_ids {
                {
                    let mut batches = txn.open_table(BATCH_TABLE)?;
                    if let Some(mut batch) = read_record::<Batch>(&batches, &batch_id)? {
                        if !batch.status().is_terminal() {
                            batch.transition(BatchStatus::Deleted)?;
                            write_record(&mut batches, &batch)?;
                        }
                    }
                }
                removed.extend(remove_items(&txn, &batch_id)?);
            }
        }
        txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_id;

    fn project_with_default(store: &Store) -> (Project, Batch) {
        let project = Project::new("lung", entity_id("dataset").unwrap());
        let batch = Batch::new("default", project.id, true);
        store.create_project(&project, &batch).unwrap();
        (project, batch)
    }

    #[test]
    fn only_one_batch_stays_default() {
        let store = Store::in_memory().unwrap();
        let (project, first) = project_with_default(&store);
        let second = Batch::new("second", project.id, false);
        store.insert_batch(&second).unwrap();

        store.set_default_batch(&second.id).unwrap();

        let defaults: Vec<_> = store
            .batches_of_project(&project.id)
            .unwrap()
            .into_iter()
            .filter(|batch| batch.is_default)
            .map(|batch| batch.id)
            .collect();
        assert_eq!(defaults, vec![second.id]);
        assert!(!store.fetch::<Batch>(&first.id).unwrap().is_default);
    }

    #[test]
    fn new_batch_reopens_exported_project() {
        let store = Store::in_memory().unwrap();
        let (project, _) = project_with_default(&store);
        store
            .update::<Project, _>(&project.id, |project| {
                project.transition(ProjectStatus::Exporting)?;
                project.transition(ProjectStatus::ExportComplete)?;
                Ok(())
            })
            .unwrap();

        let reopened = store
            .insert_batch(&Batch::new("more", project.id, false))
            .unwrap();
        assert_eq!(reopened.status(), ProjectStatus::InProgress);
    }

    #[test]
    fn delete_cascade_tombstones_everything() {
        let store = Store::in_memory().unwrap();
        let (project, batch) = project_with_default(&store);

        store.delete_project_cascade(&project.id).unwrap();

        assert_eq!(
            store.fetch::<Project>(&project.id).unwrap().status(),
            ProjectStatus::Deleted
        );
        assert_eq!(
            store.fetch::<Batch>(&batch.id).unwrap().status(),
            BatchStatus::Deleted
        );
        assert!(store.delete_project_cascade(&project.id).is_err());
    }
}
