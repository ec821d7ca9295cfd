use bitcode::{Decode, Encode};
use serde::Serialize;

use super::item::ItemBase;
use super::status::{ImageStatus, InvalidTransition, apply_transition};
use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// As delivered by the importer.
    Source,
    /// Produced by format conversion.
    Converted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    pub path: String,
    pub role: FileRole,
    pub size: u64,
    pub checksum: Option<String>,
    pub format: Option<String>,
}

impl ImageFile {
    pub fn source(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            role: FileRole::Source,
            size: 0,
            checksum: None,
            format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(flatten)]
    pub base: ItemBase,
    status: ImageStatus,
    /// Working directory of the pipeline. Set by the download job.
    pub folder_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub thumbhash: Option<Vec<u8>>,
    pub files: Vec<ImageFile>,
    status_message: Option<String>,
    pub sample_ids: Vec<EntityId>,
}

impl Image {
    pub fn new(base: ItemBase) -> Self {
        Self {
            base,
            status: ImageStatus::NotStarted,
            folder_path: None,
            thumbnail_path: None,
            thumbhash: None,
            files: Vec::new(),
            status_message: None,
            sample_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.base.id
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Leaving `Failed` clears the diagnostic message of the previous run.
    pub fn transition(&mut self, to: ImageStatus) -> Result<(), InvalidTransition> {
        let from = self.status;
        apply_transition(&mut self.status, self.base.id, to)?;
        if from == ImageStatus::Failed {
            self.status_message = None;
        }
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(ImageStatus::Failed)?;
        self.status_message = Some(message.into());
        Ok(())
    }

    pub fn source_files(&self) -> impl Iterator<Item = &ImageFile> {
        self.files.iter().filter(|file| file.role == FileRole::Source)
    }

    pub fn converted_files(&self) -> impl Iterator<Item = &ImageFile> {
        self.files
            .iter()
            .filter(|file| file.role == FileRole::Converted)
    }

    /// Takes over the fields a pipeline run may have changed. Status is left alone.
    pub fn absorb_pipeline_fields(&mut self, processed: Image) {
        self.folder_path = processed.folder_path;
        self.thumbnail_path = processed.thumbnail_path;
        self.thumbhash = processed.thumbhash;
        self.files = processed.files;
    }

    /// Drops everything a download produced. Used before downloading again.
    pub fn clear_download(&mut self) {
        self.folder_path = None;
        self.thumbnail_path = None;
        self.thumbhash = None;
        self.files.clear();
    }
}
