pub mod batch;
pub mod dataset;
pub mod image;
pub mod item;
pub mod project;
pub mod schema;
pub mod status;

pub use batch::Batch;
pub use dataset::Dataset;
pub use image::{FileRole, Image, ImageFile};
pub use item::{Annotation, Item, ItemBase, ItemKind, Observation, Sample};
pub use project::Project;
pub use schema::{CompiledSearch, ItemSchema, SearchParameters};
pub use status::{
    BatchStatus, EntityKind, ImageStatus, InvalidTransition, ProjectStatus, StatusMachine,
};

use anyhow::{Result, anyhow};
use arrayvec::ArrayString;

/// Identifier of every persisted entity. Generated ids are uuid v4 strings.
pub type EntityId = ArrayString<64>;

pub fn new_id() -> EntityId {
    let mut id = EntityId::new();
    id.push_str(&uuid::Uuid::new_v4().to_string());
    id
}

pub fn entity_id(value: impl AsRef<str>) -> Result<EntityId> {
    let value = value.as_ref();
    ArrayString::from(value).map_err(|_| anyhow!("entity id longer than 64 bytes: {value}"))
}
