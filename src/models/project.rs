use bitcode::{Decode, Encode};
use serde::Serialize;

use super::status::{InvalidTransition, ProjectStatus, apply_transition};
use super::{EntityId, new_id};
use crate::common::utils::now_ms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    pub dataset_id: EntityId,
    status: ProjectStatus,
    pub created_time: i64,
}

impl Project {
    pub fn new(name: impl Into<String>, dataset_id: EntityId) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            dataset_id,
            status: ProjectStatus::InProgress,
            created_time: now_ms(),
        }
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn transition(&mut self, to: ProjectStatus) -> Result<(), InvalidTransition> {
        apply_transition(&mut self.status, self.id, to)
    }
}
