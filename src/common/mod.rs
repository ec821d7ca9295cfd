pub mod errors;
pub mod io;
pub mod utils;

pub const ENV_PREFIX: &str = "SLIDEPIPE_";

pub const MAX_COPY_RETRIES: u32 = 3;

pub const DEFAULT_THUMBNAIL_SIZE: u32 = 1280;

pub const THUMBHASH_EDGE: u32 = 100;

pub const METADATA_FILE_NAME: &str = "metadata.json";

pub const THUMBNAIL_FILE_NAME: &str = "thumbnail.jpg";

pub const CONVERTED_DIR: &str = "converted";

pub const SCRATCH_DIR: &str = ".scratch";

/// Raster formats the `image` crate decodes in-process.
pub const VALID_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jfif", "jpe", "png", "tif", "tiff", "webp", "bmp",
];

/// Whole-slide formats that need an external converter.
pub const SLIDE_EXTENSIONS: &[&str] = &[
    "svs", "ndpi", "mrxs", "scn", "vms", "vmu", "bif", "czi", "dcm",
];

pub const DEFAULT_PRE_PROCESSING_STEPS: &[&str] = &["prepare"];

pub const DEFAULT_POST_PROCESSING_STEPS: &[&str] = &[
    "format_conversion",
    "thumbnail_generation",
    "artifact_storage",
    "finish",
];

pub fn is_known_image_extension(ext: &str) -> bool {
    VALID_IMAGE_EXTENSIONS.contains(&ext) || SLIDE_EXTENSIONS.contains(&ext)
}
