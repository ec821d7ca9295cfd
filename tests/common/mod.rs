#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use image::{Rgb, RgbImage};

use slidepipe::background::steps::{ProcessingStep, StepContext};
use slidepipe::database::Store;
use slidepipe::integrations::{
    ArtifactTarget, DatasetSource, DownloadedImage, ImageImporter, MetadataExporter,
    MetadataSearch, NamedStream, SourceNotFound, Storage,
};
use slidepipe::models::{
    Batch, BatchStatus, Dataset, Image, ImageFile, ImageStatus, Item, ItemBase, Project,
    SearchParameters,
};
use slidepipe::{PipelineSettings, Services};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ────────────────────────────────────────────────────────────────
// Steps
// ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Records `run:<name>` and `cleanup:<name>` and leaves a marker file in the working path.
pub struct RecordingStep {
    pub name: &'static str,
    pub behavior: Behavior,
    pub log: EventLog,
}

impl RecordingStep {
    pub fn boxed(
        name: &'static str,
        behavior: Behavior,
        log: &EventLog,
    ) -> Box<dyn ProcessingStep> {
        Box::new(Self {
            name,
            behavior,
            log: log.clone(),
        })
    }
}

impl ProcessingStep for RecordingStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(
        &self,
        _ctx: &StepContext<'_>,
        _image: &mut Image,
        working_path: &Path,
    ) -> Result<PathBuf> {
        self.log.lock().unwrap().push(format!("run:{}", self.name));
        match self.behavior {
            Behavior::Succeed => {
                fs::write(working_path.join(format!("{}.done", self.name)), b"ok")?;
                Ok(working_path.to_path_buf())
            }
            Behavior::Fail => bail!("{} could not read the slide", self.name),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }

    fn cleanup(&self, _project: &Project, _image: &Image) -> Result<()> {
        self.log.lock().unwrap().push(format!("cleanup:{}", self.name));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────
// Collaborators
// ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStorage {
    pub stored: Mutex<Vec<(ArtifactTarget, String)>>,
}

impl Storage for MemoryStorage {
    fn store_artifact(
        &self,
        target: &ArtifactTarget,
        streams: Vec<NamedStream>,
    ) -> Result<Vec<PathBuf>> {
        let mut stored = self.stored.lock().unwrap();
        let mut paths = Vec::new();
        for mut stream in streams {
            std::io::copy(&mut stream.reader, &mut std::io::sink())?;
            paths.push(PathBuf::from(&stream.name));
            stored.push((*target, stream.name));
        }
        Ok(paths)
    }
}

/// Writes a small PNG named after the identifier. Identifiers in `missing`
/// are not found; those in `corrupt` get a file no decoder accepts.
pub struct FakeImporter {
    pub working_root: PathBuf,
    pub missing: Mutex<HashSet<String>>,
    pub corrupt: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl FakeImporter {
    pub fn new(working_root: &Path) -> Self {
        Self {
            working_root: working_root.to_path_buf(),
            missing: Mutex::new(HashSet::new()),
            corrupt: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_missing(&self, identifier: &str, missing: bool) {
        toggle(&self.missing, identifier, missing);
    }

    pub fn set_corrupt(&self, identifier: &str, corrupt: bool) {
        toggle(&self.corrupt, identifier, corrupt);
    }
}

fn toggle(set: &Mutex<HashSet<String>>, identifier: &str, on: bool) {
    let mut set = set.lock().unwrap();
    if on {
        set.insert(identifier.to_string());
    } else {
        set.remove(identifier);
    }
}

impl ImageImporter for FakeImporter {
    fn download(&self, image: &Image, project: &Project) -> Result<DownloadedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.lock().unwrap().contains(&image.base.identifier) {
            return Err(SourceNotFound {
                identifier: image.base.identifier.clone(),
                location: "fake".to_string(),
            }
            .into());
        }
        let folder = self
            .working_root
            .join(project.id.as_str())
            .join(image.id().as_str());
        fs::create_dir_all(&folder)?;
        let file = if self.corrupt.lock().unwrap().contains(&image.base.identifier) {
            let file = folder.join(format!("{}.png", image.base.identifier));
            fs::write(&file, b"not a png")?;
            file
        } else {
            write_png(&folder, &image.base.identifier, 64, 48)?
        };
        Ok(DownloadedImage {
            folder_path: folder,
            files: vec![file],
        })
    }
}

/// Returns one image per identifier, owned by the searched batch. Images
/// carry the `image` schema unless `schemas` names another.
#[derive(Default)]
pub struct FakeSearch {
    pub identifiers: Vec<String>,
    pub schemas: HashMap<String, String>,
}

impl FakeSearch {
    pub fn new(identifiers: &[&str]) -> Self {
        Self {
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            schemas: HashMap::new(),
        }
    }

    pub fn with_schema(mut self, identifier: &str, schema: &str) -> Self {
        self.schemas.insert(identifier.to_string(), schema.to_string());
        self
    }
}

impl MetadataSearch for FakeSearch {
    fn search(
        &self,
        batch: &Batch,
        dataset: &Dataset,
        _parameters: &SearchParameters,
    ) -> Result<Vec<Item>> {
        Ok(self
            .identifiers
            .iter()
            .map(|identifier| {
                let schema = self.schemas.get(identifier).map_or("image", String::as_str);
                Item::Image(Image::new(ItemBase::new(
                    identifier.as_str(),
                    dataset.id,
                    batch.id,
                    schema,
                )))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct CountingExporter {
    pub exports: AtomicUsize,
}

impl MetadataExporter for CountingExporter {
    fn export(&self, _project: &Project, _dataset: &Dataset) -> Result<()> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct NoDatasets;

impl DatasetSource for NoDatasets {
    fn import(&self, path: &Path) -> Result<Dataset> {
        bail!("no dataset at {:?}", path)
    }
}

pub fn services(
    store: Arc<Store>,
    importer: Arc<dyn ImageImporter>,
    search: Arc<dyn MetadataSearch>,
    exporter: Arc<dyn MetadataExporter>,
) -> Services {
    Services {
        store,
        storage: Arc::new(MemoryStorage::default()),
        importer,
        search,
        exporter,
        datasets: Arc::new(NoDatasets),
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings::default()
}

// ────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────

pub fn write_png(dir: &Path, stem: &str, width: u32, height: u32) -> Result<PathBuf> {
    let path = dir.join(format!("{stem}.png"));
    RgbImage::from_pixel(width, height, Rgb([180, 40, 120])).save(&path)?;
    Ok(path)
}

/// A dataset, a project and its default batch.
pub fn seed_project(store: &Store) -> (Dataset, Project, Batch) {
    let dataset = Dataset::new("lung", "/data/lung", 0);
    store.put(&dataset).unwrap();
    let project = Project::new("lung-study", dataset.id);
    let batch = Batch::new("default", project.id, true);
    store.create_project(&project, &batch).unwrap();
    (dataset, project, batch)
}

/// A batch holding `count` images that went through the metadata search.
pub fn seed_batch(store: &Store, count: usize) -> (Project, Batch, Vec<Image>) {
    let (dataset, project, batch) = seed_project(store);
    store
        .update::<Batch, _>(&batch.id, |batch| {
            Ok(batch.transition(BatchStatus::MetadataSearching)?)
        })
        .unwrap();
    let items: Vec<Item> = (0..count)
        .map(|n| {
            Item::Image(Image::new(ItemBase::new(
                format!("slide-{n}"),
                dataset.id,
                batch.id,
                "image",
            )))
        })
        .collect();
    let batch = store.record_search_results(&batch.id, &items).unwrap();
    let images = store.images_of_batch(&batch.id).unwrap();
    (project, batch, images)
}

pub fn walk_image(store: &Store, image: &Image, path: &[ImageStatus]) -> Image {
    store
        .update_image(&image.id(), |image| {
            for status in path {
                image.transition(*status)?;
            }
            Ok(())
        })
        .unwrap()
}

/// Marks the image downloaded into `folder` with one generated PNG.
pub fn mark_downloaded(store: &Store, image: &Image, folder: &Path) -> Image {
    fs::create_dir_all(folder).unwrap();
    let file = write_png(folder, &image.base.identifier, 64, 48).unwrap();
    store
        .update_image(&image.id(), |image| {
            image.transition(ImageStatus::Downloading)?;
            image.folder_path = Some(folder.to_string_lossy().into_owned());
            image.files = vec![ImageFile::source(file.to_string_lossy())];
            image.transition(ImageStatus::Downloaded)?;
            Ok(())
        })
        .unwrap()
}

pub fn set_batch_status(store: &Store, batch: &Batch, path: &[BatchStatus]) -> Batch {
    store
        .update::<Batch, _>(&batch.id, |batch| {
            for status in path {
                batch.transition(*status)?;
            }
            Ok(())
        })
        .unwrap()
}
