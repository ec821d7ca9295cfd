use std::path::Path;

use anyhow::Result;
use log::info;

use super::PipelineActors;

impl PipelineActors {
    pub(super) fn dataset_import(&self, path: &Path) -> Result<()> {
        let dataset = self.services.datasets.import(path)?;
        self.services.store.put(&dataset)?;
        info!(
            "Imported dataset {} with {} image file(s) as {}",
            dataset.name, dataset.image_count, dataset.id
        );
        Ok(())
    }
}
