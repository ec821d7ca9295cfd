//! Collaborators the pipeline calls through traits, with the reference
//! implementation of each.

pub mod dataset;
pub mod importer;
pub mod metadata;
pub mod storage;

pub use dataset::{DatasetSource, DirectoryDatasetSource};
pub use importer::{
    DownloadedImage, HttpImporter, ImageImporter, LocalFolderImporter, SourceNotFound,
};
pub use metadata::{JsonExporter, ManifestSearch, MetadataExporter, MetadataSearch};
pub use storage::{ArtifactTarget, FileSystemStorage, NamedStream, Storage};
