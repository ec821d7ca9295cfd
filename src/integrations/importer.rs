use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use thiserror::Error;
use walkdir::WalkDir;

use crate::common::io::{copy_with_retry, remove_dir_if_exists};
use crate::models::{Image, Project};

/// What a download produced: the image's working directory and the files in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub folder_path: PathBuf,
    pub files: Vec<PathBuf>,
}

/// The source of an image does not exist. Callers find it with `downcast_ref`.
#[derive(Debug, Error)]
#[error("source of image `{identifier}` not found at {location}")]
pub struct SourceNotFound {
    pub identifier: String,
    pub location: String,
}

pub trait ImageImporter: Send + Sync {
    fn download(&self, image: &Image, project: &Project) -> Result<DownloadedImage>;
}

/// Identifiers become path components, so they must be a single plain name.
fn checked_identifier(image: &Image) -> Result<&str> {
    let identifier = image.base.identifier.as_str();
    if identifier.is_empty()
        || identifier.contains(['/', '\\'])
        || identifier == "."
        || identifier == ".."
    {
        bail!("image identifier cannot be used as a file name: {:?}", identifier);
    }
    Ok(identifier)
}

/// A fresh working directory `<working_root>/<project>/<image>`.
fn prepare_working_dir(working_root: &Path, image: &Image, project: &Project) -> Result<PathBuf> {
    let folder = working_root
        .join(project.id.as_str())
        .join(image.id().as_str());
    remove_dir_if_exists(&folder)?;
    fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create directory tree {:?}", folder))?;
    Ok(folder)
}

/// Copies `<source_root>/<identifier>/` recursively, or the single file
/// `<source_root>/<identifier>.<ext>`.
pub struct LocalFolderImporter {
    source_root: PathBuf,
    working_root: PathBuf,
    retries: u32,
}

impl LocalFolderImporter {
    pub fn new(
        source_root: impl Into<PathBuf>,
        working_root: impl Into<PathBuf>,
        retries: u32,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            working_root: working_root.into(),
            retries,
        }
    }

    fn find_single_file(&self, identifier: &str) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.source_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to list {:?}", self.source_root));
            }
        };
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(identifier))
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().next())
    }
}

impl ImageImporter for LocalFolderImporter {
    fn download(&self, image: &Image, project: &Project) -> Result<DownloadedImage> {
        let identifier = checked_identifier(image)?;
        let source_dir = self.source_root.join(identifier);

        let sources: Vec<(PathBuf, PathBuf)> = if source_dir.is_dir() {
            let mut sources = Vec::new();
            for entry in WalkDir::new(&source_dir).sort_by_file_name() {
                let entry =
                    entry.with_context(|| format!("failed to walk {:?}", source_dir))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&source_dir)
                    .context("walked entry escaped its root")?
                    .to_path_buf();
                sources.push((entry.into_path(), relative));
            }
            sources
        } else if let Some(file) = self.find_single_file(identifier)? {
            let name = PathBuf::from(file.file_name().unwrap_or_default());
            vec![(file, name)]
        } else {
            Vec::new()
        };

        if sources.is_empty() {
            return Err(SourceNotFound {
                identifier: identifier.to_string(),
                location: self.source_root.display().to_string(),
            }
            .into());
        }

        let folder_path = prepare_working_dir(&self.working_root, image, project)?;
        let mut files = Vec::with_capacity(sources.len());
        for (source, relative) in sources {
            let dest = folder_path.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory tree {:?}", parent))?;
            }
            copy_with_retry(&source, &dest, self.retries)?;
            files.push(dest);
        }

        info!("Copied {} file(s) for image {}", files.len(), identifier);
        Ok(DownloadedImage { folder_path, files })
    }
}

/// Fetches `url_template` with `{identifier}` substituted.
pub struct HttpImporter {
    url_template: String,
    working_root: PathBuf,
    client: reqwest::blocking::Client,
}

impl HttpImporter {
    pub fn new(
        url_template: impl Into<String>,
        working_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            url_template: url_template.into(),
            working_root: working_root.into(),
            client,
        })
    }

    fn url_for(&self, identifier: &str) -> String {
        self.url_template.replace("{identifier}", identifier)
    }
}

fn file_name_from_url(url: &str, identifier: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != ".." && name != "." => name.to_string(),
        _ => identifier.to_string(),
    }
}

impl ImageImporter for HttpImporter {
    fn download(&self, image: &Image, project: &Project) -> Result<DownloadedImage> {
        let identifier = checked_identifier(image)?;
        let url = self.url_for(identifier);

        let mut response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("failed to request {}", url))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceNotFound {
                identifier: identifier.to_string(),
                location: url,
            }
            .into());
        }
        if !response.status().is_success() {
            bail!("download of {} failed with status {}", url, response.status());
        }

        let folder_path = prepare_working_dir(&self.working_root, image, project)?;
        let dest = folder_path.join(file_name_from_url(&url, identifier));
        let mut file =
            File::create(&dest).with_context(|| format!("failed to create {:?}", dest))?;
        let bytes = response
            .copy_to(&mut file)
            .with_context(|| format!("failed to download {} into {:?}", url, dest))?;

        info!("Downloaded {} bytes for image {}", bytes, identifier);
        Ok(DownloadedImage {
            folder_path,
            files: vec![dest],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemBase, entity_id};

    fn fixtures() -> (Project, Image) {
        let project = Project::new("p", entity_id("d").unwrap());
        let batch_id = entity_id("b").unwrap();
        let image = Image::new(ItemBase::new("slide-1", project.dataset_id, batch_id, "image"));
        (project, image)
    }

    #[test]
    fn copies_a_folder_with_nested_files() {
        let source = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();
        let slide_dir = source.path().join("slide-1");
        fs::create_dir_all(slide_dir.join("data")).unwrap();
        fs::write(slide_dir.join("slide.mrxs"), b"index").unwrap();
        fs::write(slide_dir.join("data/Data0000.dat"), b"tiles").unwrap();

        let (project, image) = fixtures();
        let importer = LocalFolderImporter::new(source.path(), working.path(), 0);
        let downloaded = importer.download(&image, &project).unwrap();

        assert!(downloaded.folder_path.starts_with(working.path()));
        assert_eq!(downloaded.files.len(), 2);
        assert!(downloaded.folder_path.join("data/Data0000.dat").is_file());
    }

    #[test]
    fn copies_a_single_file_matching_the_identifier() {
        let source = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();
        fs::write(source.path().join("slide-1.svs"), b"svs").unwrap();
        fs::write(source.path().join("slide-10.svs"), b"other").unwrap();

        let (project, image) = fixtures();
        let importer = LocalFolderImporter::new(source.path(), working.path(), 0);
        let downloaded = importer.download(&image, &project).unwrap();

        assert_eq!(downloaded.files, vec![downloaded.folder_path.join("slide-1.svs")]);
    }

    #[test]
    fn missing_source_is_not_found() {
        let source = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();
        let (project, image) = fixtures();
        let importer = LocalFolderImporter::new(source.path(), working.path(), 0);

        let err = importer.download(&image, &project).unwrap_err();
        assert!(err.downcast_ref::<SourceNotFound>().is_some());
    }

    #[test]
    fn url_file_name_falls_back_to_identifier() {
        assert_eq!(file_name_from_url("http://h/slides/a.svs?x=1", "a"), "a.svs");
        assert_eq!(file_name_from_url("http://h/slides/", "a"), "a");
    }
}
