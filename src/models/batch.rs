use bitcode::{Decode, Encode};
use serde::Serialize;

use super::status::{BatchStatus, InvalidTransition, apply_transition};
use super::{EntityId, new_id};
use crate::common::utils::now_ms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: EntityId,
    pub name: String,
    pub project_id: EntityId,
    status: BatchStatus,
    /// Exactly one batch per project carries the flag. Only the store flips it.
    pub is_default: bool,
    pub created_time: i64,
}

impl Batch {
    pub fn new(name: impl Into<String>, project_id: EntityId, is_default: bool) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            project_id,
            status: BatchStatus::Initialized,
            is_default,
            created_time: now_ms(),
        }
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn transition(&mut self, to: BatchStatus) -> Result<(), InvalidTransition> {
        apply_transition(&mut self.status, self.id, to)
    }
}
