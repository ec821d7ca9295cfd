use bitcode::{Decode, Encode};
use serde::Serialize;

use super::{EntityId, new_id};
use crate::common::utils::now_ms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: EntityId,
    pub name: String,
    pub source_path: String,
    pub image_count: u64,
    pub created_time: i64,
}

impl Dataset {
    pub fn new(name: impl Into<String>, source_path: impl Into<String>, image_count: u64) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            source_path: source_path.into(),
            image_count,
            created_time: now_ms(),
        }
    }
}
