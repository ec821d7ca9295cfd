use bitcode::{DecodeOwned, Encode};
use redb::TableDefinition;

use crate::models::{Batch, Dataset, EntityId, EntityKind, Item, Project};

pub const PROJECT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("project");

pub const BATCH_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("batch");

pub const ITEM_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("item");

pub const DATASET_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dataset");

// (ProjectId, BatchId) -> ()
pub const PROJECT_BATCHES_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("rel_project_batches");

// (BatchId, ItemId) -> ()
pub const BATCH_ITEMS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("rel_batch_items");

/// An entity stored bitcode-encoded under its id.
pub trait Record: Encode + DecodeOwned {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;
    const KIND: EntityKind;

    fn id(&self) -> EntityId;
}

impl Record for Project {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = PROJECT_TABLE;
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Record for Batch {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = BATCH_TABLE;
    const KIND: EntityKind = EntityKind::Batch;

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Record for Item {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = ITEM_TABLE;
    const KIND: EntityKind = EntityKind::Item;

    fn id(&self) -> EntityId {
        self.base().id
    }
}

impl Record for Dataset {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = DATASET_TABLE;
    const KIND: EntityKind = EntityKind::Dataset;

    fn id(&self) -> EntityId {
        self.id
    }
}
