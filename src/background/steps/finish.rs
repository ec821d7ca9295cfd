use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::{ProcessingStep, StepContext};
use crate::common::METADATA_FILE_NAME;
use crate::integrations::{ArtifactTarget, NamedStream};
use crate::models::{EntityId, Image, ImageFile};

pub const NAME: &str = "finish";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageDocument<'a> {
    id: EntityId,
    identifier: &'a str,
    project_id: EntityId,
    schema: &'a str,
    attributes: BTreeMap<String, String>,
    files: &'a [ImageFile],
    thumbnail: Option<&'a str>,
    thumbhash: Option<&'a [u8]>,
}

/// Stores `metadata.json` describing the processed image.
pub struct Finish;

impl ProcessingStep for Finish {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        let document = ImageDocument {
            id: image.id(),
            identifier: &image.base.identifier,
            project_id: ctx.project.id,
            schema: &ctx.schema.name,
            attributes: ctx.schema.select(&image.base.attributes),
            files: &image.files,
            thumbnail: image
                .thumbnail_path
                .as_deref()
                .and_then(|path| Path::new(path).file_name())
                .and_then(|name| name.to_str()),
            thumbhash: image.thumbhash.as_deref(),
        };
        let bytes =
            serde_json::to_vec_pretty(&document).context("failed to serialize image metadata")?;

        ctx.storage.store_artifact(
            &ArtifactTarget::Image {
                project_id: ctx.project.id,
                image_id: image.id(),
            },
            vec![NamedStream::from_bytes(METADATA_FILE_NAME, bytes)],
        )?;
        Ok(working_path.to_path_buf())
    }
}
