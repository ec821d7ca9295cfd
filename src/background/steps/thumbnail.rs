use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};

use super::{ProcessingStep, StepContext, decode_image};
use crate::common::utils::{PathExt, small_width_height};
use crate::common::{THUMBHASH_EDGE, THUMBNAIL_FILE_NAME, VALID_IMAGE_EXTENSIONS};
use crate::models::Image;

pub const NAME: &str = "thumbnail_generation";

/// Writes `thumbnail.jpg` into the working path and computes a thumbhash.
pub struct ThumbnailGeneration {
    size: u32,
}

impl ThumbnailGeneration {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

/// First converted file, else the first source the `image` crate can read.
fn thumbnail_input(image: &Image) -> Option<PathBuf> {
    image
        .converted_files()
        .next()
        .or_else(|| {
            image.source_files().find(|file| {
                VALID_IMAGE_EXTENSIONS.contains(&Path::new(&file.path).ext_lower().as_str())
            })
        })
        .map(|file| PathBuf::from(&file.path))
}

pub fn generate_thumbhash(dynamic_image: &DynamicImage) -> Vec<u8> {
    let (width, height) =
        small_width_height(dynamic_image.width(), dynamic_image.height(), THUMBHASH_EDGE);
    let rgba_image = dynamic_image.thumbnail_exact(width, height).to_rgba8();
    thumbhash::rgba_to_thumb_hash(
        rgba_image.width() as usize,
        rgba_image.height() as usize,
        &rgba_image,
    )
}

impl ProcessingStep for ThumbnailGeneration {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(
        &self,
        _ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        let input = thumbnail_input(image).with_context(|| {
            format!("image {} has no decodable file for a thumbnail", image.base.identifier)
        })?;
        let dynamic_image = decode_image(&input)?;

        let (width, height) =
            small_width_height(dynamic_image.width(), dynamic_image.height(), self.size);
        let dest = working_path.join(THUMBNAIL_FILE_NAME);
        dynamic_image
            .thumbnail_exact(width, height)
            .to_rgb8()
            .save_with_format(&dest, ImageFormat::Jpeg)
            .with_context(|| format!("failed to save JPEG thumbnail to {:?}", dest))?;

        image.thumbhash = Some(generate_thumbhash(&dynamic_image));
        image.thumbnail_path = Some(dest.lossy_string());
        Ok(working_path.to_path_buf())
    }
}
