use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use image::ImageFormat;
use log::info;

use super::{ProcessingStep, StepContext, decode_image};
use crate::common::io::remove_dir_if_exists;
use crate::common::utils::PathExt;
use crate::common::{
    CONVERTED_DIR, SCRATCH_DIR, VALID_IMAGE_EXTENSIONS, is_known_image_extension,
};
use crate::config::ConfigError;
use crate::models::{FileRole, Image, ImageFile, Project};

pub const NAME: &str = "format_conversion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Png,
    Jpeg,
    Tiff,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Tiff => "tiff",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

impl FromStr for TargetFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "tiff" | "tif" => Ok(TargetFormat::Tiff),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// An external program that converts `{input}` into `{output}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalConverter {
    program: String,
    args: Vec<String>,
}

impl ExternalConverter {
    /// Parses a whitespace-separated command line.
    pub fn parse(command: &str) -> Result<Self, ConfigError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidConverter(command.to_string()))?;
        let args: Vec<String> = parts.collect();
        let has = |placeholder: &str| args.iter().any(|arg| arg.contains(placeholder));
        if !has("{input}") || !has("{output}") {
            return Err(ConfigError::InvalidConverter(command.to_string()));
        }
        Ok(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let input = input.lossy_string();
        let output = output.lossy_string();
        let args = self.args.iter().map(|arg| {
            arg.replace("{input}", &input)
                .replace("{output}", &output)
        });

        let result = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to execute {}", self.program))?;

        if !result.status.success() {
            return Err(anyhow!(
                "{} exited with code {}: {}",
                self.program,
                result.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        if !Path::new(&output).is_file() {
            bail!("{} did not produce {}", self.program, output);
        }
        Ok(())
    }
}

/// Converts every source image into the target format under `<working>/converted`.
pub struct FormatConversion {
    target: TargetFormat,
    converter: Option<ExternalConverter>,
}

impl FormatConversion {
    pub fn new(target: TargetFormat, converter: Option<ExternalConverter>) -> Self {
        Self { target, converter }
    }

    fn scratch_dir(image: &Image) -> Option<PathBuf> {
        image
            .folder_path
            .as_ref()
            .map(|folder| Path::new(folder).join(SCRATCH_DIR).join(NAME))
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let ext = input.ext_lower();
        if VALID_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            let decoded = decode_image(input)?;
            let result = match self.target {
                TargetFormat::Jpeg => decoded
                    .to_rgb8()
                    .save_with_format(output, ImageFormat::Jpeg),
                other => decoded.save_with_format(output, other.image_format()),
            };
            result.with_context(|| format!("failed to encode {:?}", output))
        } else if let Some(converter) = &self.converter {
            converter.run(input, output)
        } else {
            bail!("no converter configured for .{} files: {:?}", ext, input)
        }
    }
}

/// `<stem>.<ext>`, suffixed with a counter when another source already took the name.
fn unique_name(input: &Path, ext: &str, taken: &mut HashSet<String>) -> String {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mut name = format!("{stem}.{ext}");
    let mut counter = 1;
    while !taken.insert(name.clone()) {
        name = format!("{stem}-{counter}.{ext}");
        counter += 1;
    }
    name
}

impl ProcessingStep for FormatConversion {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(
        &self,
        _ctx: &StepContext<'_>,
        image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        let scratch =
            Self::scratch_dir(image).context("image has no working directory for conversion")?;
        remove_dir_if_exists(&scratch)?;
        fs::create_dir_all(&scratch)
            .with_context(|| format!("failed to create directory tree {:?}", scratch))?;

        let inputs: Vec<PathBuf> = image
            .source_files()
            .map(|file| PathBuf::from(&file.path))
            .filter(|path| is_known_image_extension(&path.ext_lower()))
            .collect();
        if inputs.is_empty() {
            bail!("image {} has no convertible source files", image.base.identifier);
        }

        let dest_dir = working_path.join(CONVERTED_DIR);
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("failed to create directory tree {:?}", dest_dir))?;

        let mut taken = HashSet::new();
        let mut converted = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = unique_name(&input, self.target.extension(), &mut taken);
            let staged = scratch.join(&name);
            self.convert(&input, &staged)
                .with_context(|| format!("failed to convert {:?}", input))?;

            let dest = dest_dir.join(&name);
            fs::rename(&staged, &dest)
                .with_context(|| format!("failed to move {:?} into place", dest))?;
            let size = fs::metadata(&dest)
                .with_context(|| format!("failed to read metadata of {:?}", dest))?
                .len();
            converted.push(ImageFile {
                path: dest.lossy_string(),
                role: FileRole::Converted,
                size,
                checksum: None,
                format: Some(self.target.extension().to_string()),
            });
        }

        info!(
            "Converted {} file(s) of image {} to {}",
            converted.len(),
            image.base.identifier,
            self.target.extension()
        );
        image.files.retain(|file| file.role != FileRole::Converted);
        image.files.extend(converted);
        Ok(dest_dir)
    }

    fn cleanup(&self, _project: &Project, image: &Image) -> Result<()> {
        match Self::scratch_dir(image) {
            Some(scratch) => remove_dir_if_exists(&scratch),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_format_parses_aliases() {
        assert_eq!("JPG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!("tif".parse::<TargetFormat>().unwrap(), TargetFormat::Tiff);
        assert!("webp".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn converter_needs_both_placeholders() {
        assert!(ExternalConverter::parse("vips copy {input} {output}").is_ok());
        assert!(ExternalConverter::parse("vips copy {input} out.png").is_err());
        assert!(ExternalConverter::parse("   ").is_err());
    }

    #[test]
    fn unique_name_suffixes_collisions() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name(Path::new("/a/slide.svs"), "png", &mut taken), "slide.png");
        assert_eq!(unique_name(Path::new("/b/slide.tif"), "png", &mut taken), "slide-1.png");
    }
}
