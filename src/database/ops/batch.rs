use crate::database::schema::{BATCH_ITEMS_TABLE, BATCH_TABLE, ITEM_TABLE};
use crate::database::{Store, StoreError, read_record, related_ids, write_record};
use crate::models::{Batch, BatchStatus, EntityKind, Image, ImageStatus, Item};

use super::remove_items;

impl Store {
    pub fn items_of_batch(&self, batch_id: &str) -> Result<Vec<Item>, StoreError> {
        let txn = self.begin_read()?;
        let relation = txn.open_table(BATCH_ITEMS_TABLE)?;
        let table = txn.open_table(ITEM_TABLE)?;
        let mut items = Vec::new();
        for id in related_ids(&relation, batch_id)? {
            if let Some(item) = read_record(&table, &id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub fn images_of_batch(&self, batch_id: &str) -> Result<Vec<Image>, StoreError> {
        Ok(self
            .items_of_batch(batch_id)?
            .into_iter()
            .filter_map(Item::into_image)
            .collect())
    }

    /// Stores the items a metadata search found and moves the batch out of
    /// `MetadataSearching`. A batch that found images continues straight into
    /// `ImagePreProcessing`.
    pub fn record_search_results(
        &self,
        batch_id: &str,
        items: &[Item],
    ) -> Result<Batch, StoreError> {
        let txn = self.begin_write()?;
        let batch = {
            let mut batches = txn.open_table(BATCH_TABLE)?;
            let mut batch: Batch = read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?;
            batch.transition(BatchStatus::MetadataSearchComplete)?;
            if items.iter().any(|item| item.as_image().is_some()) {
                batch.transition(BatchStatus::ImagePreProcessing)?;
            }
            write_record(&mut batches, &batch)?;

            let mut table = txn.open_table(ITEM_TABLE)?;
            let mut relation = txn.open_table(BATCH_ITEMS_TABLE)?;
            for item in items {
                write_record(&mut table, item)?;
                relation.insert((batch_id, item.id().as_str()), ())?;
            }
            batch
        };
        txn.commit()?;
        Ok(batch)
    }

    /// Sends the batch back to `Initialized` and deletes its items, in one
    /// transaction. Returns the batch and the removed item ids.
    pub fn reset_batch(&self, batch_id: &str) -> Result<(Batch, Vec<String>), StoreError> {
        let txn = self.begin_write()?;
        let batch = {
            let mut batches = txn.open_table(BATCH_TABLE)?;
            let mut batch: Batch = read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?;
            batch.transition(BatchStatus::Initialized)?;
            write_record(&mut batches, &batch)?;
            batch
        };
        let removed = remove_items(&txn, batch_id)?;
        txn.commit()?;
        Ok((batch, removed))
    }

    /// Moves the batch from `from` to `to` when every image of the batch is in
    /// `required`. The check and the write share one write transaction, so of
    /// two images finishing together exactly one observes the advance.
    pub fn advance_batch_if_complete(
        &self,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
        required: ImageStatus,
    ) -> Result<bool, StoreError> {
        let txn = self.begin_write()?;
        let advanced = {
            let mut batches = txn.open_table(BATCH_TABLE)?;
            let mut batch: Batch = read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?;
            if batch.status() != from {
                false
            } else {
                let relation = txn.open_table(BATCH_ITEMS_TABLE)?;
                let items = txn.open_table(ITEM_TABLE)?;
                let mut images = 0usize;
                let mut complete = true;
                for id in related_ids(&relation, batch_id)? {
                    let Some(Item::Image(image)) = read_record::<Item>(&items, &id)? else {
                        continue;
                    };
                    images += 1;
                    if image.status() != required {
                        complete = false;
                        break;
                    }
                }
                if complete && images > 0 {
                    batch.transition(to)?;
                    write_record(&mut batches, &batch)?;
                    true
                } else {
                    false
                }
            }
        };
        txn.commit()?;
        Ok(advanced)
    }

    /// Finalizes a post-processed batch: `PostProcessed` images become
    /// `Completed`, then the batch itself.
    pub fn complete_batch(&self, batch_id: &str) -> Result<Batch, StoreError> {
        let txn = self.begin_write()?;
        let batch = {
            let relation = txn.open_table(BATCH_ITEMS_TABLE)?;
            let mut items = txn.open_table(ITEM_TABLE)?;
            for id in related_ids(&relation, batch_id)? {
                let Some(Item::Image(mut image)) = read_record::<Item>(&items, &id)? else {
                    continue;
                };
                if image.status() == ImageStatus::PostProcessed {
                    image.transition(ImageStatus::Completed)?;
                    write_record(&mut items, &Item::Image(image))?;
                }
            }

            let mut batches = txn.open_table(BATCH_TABLE)?;
            let mut batch: Batch = read_record(&batches, batch_id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Batch, batch_id))?;
            batch.transition(BatchStatus::Completed)?;
            write_record(&mut batches, &batch)?;
            batch
        };
        txn.commit()?;
        Ok(batch)
    }

    pub fn batches_with_status(&self, status: BatchStatus) -> Result<Vec<Batch>, StoreError> {
        Ok(self
            .all::<Batch>()?
            .into_iter()
            .filter(|batch| batch.status() == status)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemBase, Project, Sample, entity_id};

    fn setup(images: usize) -> (Store, Batch, Vec<Image>) {
        let store = Store::in_memory().unwrap();
        let project = Project::new("p", entity_id("d").unwrap());
        let batch = Batch::new("default", project.id, true);
        store.create_project(&project, &batch).unwrap();
        store
            .update::<Batch, _>(&batch.id, |batch| {
                Ok(batch.transition(BatchStatus::MetadataSearching)?)
            })
            .unwrap();

        let mut items: Vec<Item> = (0..images)
            .map(|n| {
                Item::Image(Image::new(ItemBase::new(
                    format!("img-{n}"),
                    project.dataset_id,
                    batch.id,
                    "image",
                )))
            })
            .collect();
        items.push(Item::Sample(Sample {
            base: ItemBase::new("sample", project.dataset_id, batch.id, "sample"),
        }));
        let batch = store.record_search_results(&batch.id, &items).unwrap();
        let images = store.images_of_batch(&batch.id).unwrap();
        (store, batch, images)
    }

    fn force_status(store: &Store, image: &Image, path: &[ImageStatus]) {
        store
            .update_image(&image.id(), |image| {
                for status in path {
                    image.transition(*status)?;
                }
                Ok(())
            })
            .unwrap();
    }

    const TO_PRE_PROCESSED: [ImageStatus; 4] = [
        ImageStatus::Downloading,
        ImageStatus::Downloaded,
        ImageStatus::PreProcessing,
        ImageStatus::PreProcessed,
    ];

    #[test]
    fn search_results_move_batch_into_pre_processing() {
        let (store, batch, images) = setup(2);
        assert_eq!(batch.status(), BatchStatus::ImagePreProcessing);
        assert_eq!(images.len(), 2);
        assert_eq!(store.items_of_batch(&batch.id).unwrap().len(), 3);
    }

    #[test]
    fn batch_advances_only_when_every_image_is_done() {
        let (store, batch, images) = setup(2);
        force_status(&store, &images[0], &TO_PRE_PROCESSED);
        let advance = || {
            store
                .advance_batch_if_complete(
                    &batch.id,
                    BatchStatus::ImagePreProcessing,
                    BatchStatus::ImagePreProcessingComplete,
                    ImageStatus::PreProcessed,
                )
                .unwrap()
        };
        assert!(!advance());

        force_status(&store, &images[1], &TO_PRE_PROCESSED);
        assert!(advance());
        // Second observer sees the batch already advanced.
        assert!(!advance());
    }

    #[test]
    fn reset_removes_items_only_from_a_resettable_state() {
        let (store, batch, images) = setup(2);
        assert!(matches!(
            store.reset_batch(&batch.id),
            Err(StoreError::InvalidTransition(_))
        ));
        assert_eq!(store.items_of_batch(&batch.id).unwrap().len(), 3);

        for image in &images {
            force_status(&store, image, &TO_PRE_PROCESSED);
        }
        assert!(
            store
                .advance_batch_if_complete(
                    &batch.id,
                    BatchStatus::ImagePreProcessing,
                    BatchStatus::ImagePreProcessingComplete,
                    ImageStatus::PreProcessed,
                )
                .unwrap()
        );

        let (batch, removed) = store.reset_batch(&batch.id).unwrap();
        assert_eq!(batch.status(), BatchStatus::Initialized);
        assert_eq!(removed.len(), 3);
        assert!(store.items_of_batch(&batch.id).unwrap().is_empty());
    }
}
