use std::path::Path;

use anyhow::{Context, Result, bail};
use log::info;
use walkdir::WalkDir;

use crate::common::is_known_image_extension;
use crate::common::utils::PathExt;
use crate::models::Dataset;

pub trait DatasetSource: Send + Sync {
    fn import(&self, path: &Path) -> Result<Dataset>;
}

/// Treats a directory as a dataset named after it.
pub struct DirectoryDatasetSource;

impl DatasetSource for DirectoryDatasetSource {
    fn import(&self, path: &Path) -> Result<Dataset> {
        if !path.is_dir() {
            bail!("dataset path is not a directory: {:?}", path);
        }
        let path = path_clean::clean(
            path.canonicalize()
                .with_context(|| format!("failed to resolve {:?}", path))?,
        );
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.lossy_string());

        let image_count = WalkDir::new(&path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_known_image_extension(&entry.path().ext_lower()))
            .count() as u64;

        info!("Dataset {} has {} image file(s)", name, image_count);
        Ok(Dataset::new(name, path.lossy_string(), image_count))
    }
}
