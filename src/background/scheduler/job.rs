use std::fmt;
use std::path::PathBuf;

use crate::models::{EntityId, ItemSchema, SearchParameters};

/// The logical thing a job works on. At most one job per identity is pending
/// or running at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobIdentity {
    Image(EntityId),
    Batch(EntityId),
    Project(EntityId),
    Dataset(String),
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobIdentity::Image(id) => write!(f, "image {id}"),
            JobIdentity::Batch(id) => write!(f, "batch {id}"),
            JobIdentity::Project(id) => write!(f, "project {id}"),
            JobIdentity::Dataset(path) => write!(f, "dataset {path}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Default,
    /// Served by its own pool so single-image retries never wait behind a batch fan-out.
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    DownloadImage {
        image_id: EntityId,
    },
    PreProcessImage {
        image_id: EntityId,
    },
    PostProcessImage {
        image_id: EntityId,
        schema: ItemSchema,
    },
    PostProcessBatch {
        batch_id: EntityId,
        schema: ItemSchema,
    },
    MetadataBatchImport {
        batch_id: EntityId,
        parameters: SearchParameters,
    },
    MetadataProjectExport {
        project_id: EntityId,
    },
    DatasetImport {
        path: PathBuf,
    },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::DownloadImage { .. } => "download_image",
            JobKind::PreProcessImage { .. } => "pre_process_image",
            JobKind::PostProcessImage { .. } => "post_process_image",
            JobKind::PostProcessBatch { .. } => "post_process_batch",
            JobKind::MetadataBatchImport { .. } => "metadata_batch_import",
            JobKind::MetadataProjectExport { .. } => "metadata_project_export",
            JobKind::DatasetImport { .. } => "dataset_import",
        }
    }

    pub fn identity(&self) -> JobIdentity {
        match self {
            JobKind::DownloadImage { image_id }
            | JobKind::PreProcessImage { image_id }
            | JobKind::PostProcessImage { image_id, .. } => JobIdentity::Image(*image_id),
            JobKind::PostProcessBatch { batch_id, .. }
            | JobKind::MetadataBatchImport { batch_id, .. } => JobIdentity::Batch(*batch_id),
            JobKind::MetadataProjectExport { project_id } => JobIdentity::Project(*project_id),
            JobKind::DatasetImport { path } => {
                JobIdentity::Dataset(path.to_string_lossy().into_owned())
            }
        }
    }
}

/// A unit of background work plus the job to enqueue once it succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    pub kind: JobKind,
    pub priority: Priority,
    pub then: Option<Box<JobDescriptor>>,
}

impl JobDescriptor {
    pub fn new(kind: JobKind, priority: Priority) -> Self {
        Self {
            kind,
            priority,
            then: None,
        }
    }

    pub fn then(mut self, next: JobDescriptor) -> Self {
        self.then = Some(Box::new(next));
        self
    }

    pub fn identity(&self) -> JobIdentity {
        self.kind.identity()
    }
}
