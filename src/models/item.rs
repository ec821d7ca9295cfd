use std::collections::BTreeMap;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::image::Image;
use super::{EntityId, new_id};
use crate::common::utils::now_ms;

/// Fields every item kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ItemBase {
    pub id: EntityId,
    pub identifier: String,
    pub dataset_id: EntityId,
    pub batch_id: EntityId,
    /// Name of the attribute schema the item was discovered under.
    pub schema: String,
    pub attributes: BTreeMap<String, String>,
    pub created_time: i64,
}

impl ItemBase {
    pub fn new(
        identifier: impl Into<String>,
        dataset_id: EntityId,
        batch_id: EntityId,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            identifier: identifier.into(),
            dataset_id,
            batch_id,
            schema: schema.into(),
            attributes: BTreeMap::new(),
            created_time: now_ms(),
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(flatten)]
    pub base: ItemBase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(flatten)]
    pub base: ItemBase,
    pub image_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(flatten)]
    pub base: ItemBase,
    pub sample_id: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Sample,
    Image,
    Annotation,
    Observation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Sample(Sample),
    Image(Image),
    Annotation(Annotation),
    Observation(Observation),
}

impl Item {
    pub fn base(&self) -> &ItemBase {
        match self {
            Item::Sample(sample) => &sample.base,
            Item::Image(image) => &image.base,
            Item::Annotation(annotation) => &annotation.base,
            Item::Observation(observation) => &observation.base,
        }
    }

    pub fn id(&self) -> EntityId {
        self.base().id
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Sample(_) => ItemKind::Sample,
            Item::Image(_) => ItemKind::Image,
            Item::Annotation(_) => ItemKind::Annotation,
            Item::Observation(_) => ItemKind::Observation,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Item::Image(image) => Some(image),
            Item::Sample(_) | Item::Annotation(_) | Item::Observation(_) => None,
        }
    }

    pub fn into_image(self) -> Option<Image> {
        match self {
            Item::Image(image) => Some(image),
            Item::Sample(_) | Item::Annotation(_) | Item::Observation(_) => None,
        }
    }
}

impl From<Image> for Item {
    fn from(image: Image) -> Self {
        Item::Image(image)
    }
}
