use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use crate::models::EntityId;

/// Where an artifact belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactTarget {
    Project(EntityId),
    Image {
        project_id: EntityId,
        image_id: EntityId,
    },
}

/// A named byte stream handed to [`Storage::store_artifact`].
pub struct NamedStream {
    pub name: String,
    pub reader: Box<dyn Read + Send>,
}

impl NamedStream {
    pub fn new(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, io::Cursor::new(bytes))
    }

    /// Streams a file under its own file name.
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("artifact path has no usable file name: {:?}", path))?;
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        Ok(Self::new(name, file))
    }
}

impl std::fmt::Debug for NamedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedStream").field("name", &self.name).finish()
    }
}

/// Persists artifacts for projects and images. Implementations must accept
/// concurrent writes to different targets.
pub trait Storage: Send + Sync {
    /// Stores every stream under the target's location and returns where each landed.
    fn store_artifact(
        &self,
        target: &ArtifactTarget,
        streams: Vec<NamedStream>,
    ) -> Result<Vec<PathBuf>>;
}

/// Lays artifacts out as `projects/<project>/` and `projects/<project>/images/<image>/`.
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn location(&self, target: &ArtifactTarget) -> PathBuf {
        match target {
            ArtifactTarget::Project(project_id) => {
                self.root.join("projects").join(project_id.as_str())
            }
            ArtifactTarget::Image {
                project_id,
                image_id,
            } => self
                .root
                .join("projects")
                .join(project_id.as_str())
                .join("images")
                .join(image_id.as_str()),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => bail!("artifact name must be a plain file name: {:?}", name),
    }
}

impl Storage for FileSystemStorage {
    fn store_artifact(
        &self,
        target: &ArtifactTarget,
        streams: Vec<NamedStream>,
    ) -> Result<Vec<PathBuf>> {
        let location = self.location(target);
        fs::create_dir_all(&location)
            .with_context(|| format!("failed to create directory tree {:?}", location))?;

        let mut stored = Vec::with_capacity(streams.len());
        for mut stream in streams {
            validate_name(&stream.name)?;
            let dest = location.join(&stream.name);
            let partial = location.join(format!(".{}.partial", stream.name));

            let mut file = File::create(&partial)
                .with_context(|| format!("failed to create {:?}", partial))?;
            io::copy(&mut stream.reader, &mut file)
                .with_context(|| format!("failed to write artifact {:?}", dest))?;
            file.sync_all()
                .with_context(|| format!("failed to flush {:?}", partial))?;
            drop(file);

            fs::rename(&partial, &dest)
                .with_context(|| format!("failed to move {:?} into place", dest))?;
            stored.push(dest);
        }

        info!("Stored {} artifact(s) under {:?}", stored.len(), location);
        Ok(stored)
    }
}
