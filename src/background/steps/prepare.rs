use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::{ProcessingStep, StepContext};
use crate::common::io::blake3_file;
use crate::common::utils::PathExt;
use crate::models::{FileRole, Image};

pub const NAME: &str = "prepare";

/// Checks every source file and records its size, checksum and format.
pub struct Preparation;

impl ProcessingStep for Preparation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(
        &self,
        _ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        if image.source_files().next().is_none() {
            bail!("image {} has no source files", image.base.identifier);
        }

        for file in image
            .files
            .iter_mut()
            .filter(|file| file.role == FileRole::Source)
        {
            let path = Path::new(&file.path);
            if !path.is_file() {
                bail!("source file is missing: {:?}", path);
            }
            file.size = fs::metadata(path)
                .with_context(|| format!("failed to read metadata of {:?}", path))?
                .len();
            file.checksum = Some(blake3_file(path)?);
            let ext = path.ext_lower();
            file.format = (!ext.is_empty()).then_some(ext);
        }

        Ok(working_path.to_path_buf())
    }
}
