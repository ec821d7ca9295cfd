//! Status machines for projects, batches and images.
//!
//! Every entity kind owns a finite set of states and a transition table. The
//! only way a status field changes is [`apply_transition`], which rejects
//! moves the table does not list.

use std::fmt;

use bitcode::{Decode, Encode};
use serde::Serialize;
use thiserror::Error;

use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Batch,
    Item,
    Image,
    Dataset,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Project => "project",
            EntityKind::Batch => "batch",
            EntityKind::Item => "item",
            EntityKind::Image => "image",
            EntityKind::Dataset => "dataset",
        };
        f.write_str(name)
    }
}

/// A transition the table does not allow. This is a consistency bug in the
/// caller and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} transition for {id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub entity: EntityKind,
    pub id: EntityId,
    pub from: String,
    pub to: String,
}

pub trait StatusMachine: Copy + Eq + fmt::Debug + 'static {
    const ENTITY: EntityKind;

    /// States reachable in one move from `self`.
    fn allowed_next(self) -> &'static [Self];

    /// Whether the state ends the lifecycle of the entity.
    fn is_terminal(self) -> bool;

    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }
}

pub(crate) fn apply_transition<S: StatusMachine>(
    current: &mut S,
    id: EntityId,
    next: S,
) -> Result<(), InvalidTransition> {
    if !current.can_transition_to(next) {
        return Err(InvalidTransition {
            entity: S::ENTITY,
            id,
            from: format!("{:?}", current),
            to: format!("{:?}", next),
        });
    }
    *current = next;
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// Image
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    NotStarted,
    Downloading,
    Downloaded,
    PreProcessing,
    PreProcessed,
    PostProcessing,
    PostProcessed,
    Completed,
    Failed,
}

impl StatusMachine for ImageStatus {
    const ENTITY: EntityKind = EntityKind::Image;

    fn allowed_next(self) -> &'static [Self] {
        use ImageStatus::*;
        match self {
            NotStarted => &[Downloading, Failed],
            Downloading => &[Downloaded, Failed],
            Downloaded => &[PreProcessing, Failed],
            PreProcessing => &[PreProcessed, Failed],
            PreProcessed => &[PostProcessing, Failed],
            PostProcessing => &[PostProcessed, Completed, Failed],
            PostProcessed => &[Completed, Failed],
            Completed => &[],
            // Redo: back to the start of the download or of pre-processing.
            Failed => &[NotStarted, Downloaded],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, ImageStatus::Completed | ImageStatus::Failed)
    }
}

impl ImageStatus {
    /// A worker is expected to own the image while it sits in this state.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ImageStatus::Downloading | ImageStatus::PreProcessing | ImageStatus::PostProcessing
        )
    }
}

// ────────────────────────────────────────────────────────────────
// Batch
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Initialized,
    MetadataSearching,
    MetadataSearchComplete,
    ImagePreProcessing,
    ImagePreProcessingComplete,
    ImagePostProcessing,
    ImagePostProcessingComplete,
    Completed,
    Failed,
    Deleted,
}

impl StatusMachine for BatchStatus {
    const ENTITY: EntityKind = EntityKind::Batch;

    fn allowed_next(self) -> &'static [Self] {
        use BatchStatus::*;
        match self {
            Initialized => &[MetadataSearching, Failed, Deleted],
            MetadataSearching => &[MetadataSearchComplete, Failed, Deleted],
            MetadataSearchComplete => &[ImagePreProcessing, Initialized, Failed, Deleted],
            ImagePreProcessing => &[ImagePreProcessingComplete, Failed, Deleted],
            ImagePreProcessingComplete => &[ImagePostProcessing, Initialized, Failed, Deleted],
            ImagePostProcessing => &[ImagePostProcessingComplete, Failed, Deleted],
            ImagePostProcessingComplete => &[Completed, Failed, Deleted],
            Completed => &[Failed, Deleted],
            Failed | Deleted => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Failed | BatchStatus::Deleted)
    }
}

// ────────────────────────────────────────────────────────────────
// Project
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    InProgress,
    Exporting,
    ExportComplete,
    Failed,
    Deleted,
}

impl StatusMachine for ProjectStatus {
    const ENTITY: EntityKind = EntityKind::Project;

    fn allowed_next(self) -> &'static [Self] {
        use ProjectStatus::*;
        match self {
            InProgress => &[Exporting, Failed, Deleted],
            Exporting => &[ExportComplete, Failed, Deleted],
            ExportComplete => &[Exporting, InProgress, Failed, Deleted],
            Failed | Deleted => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Failed | ProjectStatus::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_id;

    const ALL_IMAGE: [ImageStatus; 9] = [
        ImageStatus::NotStarted,
        ImageStatus::Downloading,
        ImageStatus::Downloaded,
        ImageStatus::PreProcessing,
        ImageStatus::PreProcessed,
        ImageStatus::PostProcessing,
        ImageStatus::PostProcessed,
        ImageStatus::Completed,
        ImageStatus::Failed,
    ];

    const ALL_BATCH: [BatchStatus; 10] = [
        BatchStatus::Initialized,
        BatchStatus::MetadataSearching,
        BatchStatus::MetadataSearchComplete,
        BatchStatus::ImagePreProcessing,
        BatchStatus::ImagePreProcessingComplete,
        BatchStatus::ImagePostProcessing,
        BatchStatus::ImagePostProcessingComplete,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Deleted,
    ];

    #[test]
    fn image_happy_path_is_allowed() {
        let id = entity_id("img-1").unwrap();
        let mut status = ImageStatus::NotStarted;
        for next in &ALL_IMAGE[1..8] {
            apply_transition(&mut status, id, *next).unwrap();
        }
        assert_eq!(status, ImageStatus::Completed);
    }

    #[test]
    fn every_non_terminal_image_state_can_fail() {
        for status in ALL_IMAGE {
            assert_eq!(
                status.can_transition_to(ImageStatus::Failed),
                !status.is_terminal(),
                "{status:?}"
            );
        }
    }

    #[test]
    fn failed_image_only_goes_back_through_redo_states() {
        assert_eq!(
            ImageStatus::Failed.allowed_next(),
            &[ImageStatus::NotStarted, ImageStatus::Downloaded]
        );
        assert!(ImageStatus::Completed.allowed_next().is_empty());
    }

    #[test]
    fn invalid_transition_reports_both_states_and_entity() {
        let id = entity_id("img-1").unwrap();
        let mut status = ImageStatus::NotStarted;
        let err = apply_transition(&mut status, id, ImageStatus::PostProcessing).unwrap_err();
        assert_eq!(err.entity, EntityKind::Image);
        assert_eq!(err.from, "NotStarted");
        assert_eq!(err.to, "PostProcessing");
        assert_eq!(
            err.to_string(),
            "invalid image transition for img-1: NotStarted -> PostProcessing"
        );
        assert_eq!(status, ImageStatus::NotStarted);
    }

    #[test]
    fn batch_failed_and_deleted_are_absorbing_and_reachable_everywhere() {
        for status in ALL_BATCH {
            if status.is_terminal() {
                assert!(status.allowed_next().is_empty(), "{status:?}");
            } else {
                assert!(status.can_transition_to(BatchStatus::Failed), "{status:?}");
                assert!(status.can_transition_to(BatchStatus::Deleted), "{status:?}");
            }
        }
    }

    #[test]
    fn batch_cannot_skip_phases() {
        assert!(!BatchStatus::Initialized.can_transition_to(BatchStatus::ImagePreProcessing));
        assert!(
            !BatchStatus::ImagePreProcessing.can_transition_to(BatchStatus::ImagePostProcessing)
        );
        assert!(!BatchStatus::ImagePostProcessing.can_transition_to(BatchStatus::Completed));
    }

    #[test]
    fn project_can_export_again_after_completion() {
        let id = entity_id("p").unwrap();
        let mut status = ProjectStatus::InProgress;
        apply_transition(&mut status, id, ProjectStatus::Exporting).unwrap();
        apply_transition(&mut status, id, ProjectStatus::ExportComplete).unwrap();
        apply_transition(&mut status, id, ProjectStatus::Exporting).unwrap();
        assert!(apply_transition(&mut status, id, ProjectStatus::InProgress).is_err());
    }
}
