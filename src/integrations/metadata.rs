use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::storage::{ArtifactTarget, NamedStream, Storage};
use crate::common::METADATA_FILE_NAME;
use crate::database::Store;
use crate::models::{
    Annotation, Batch, BatchStatus, Dataset, EntityId, Image, Item, ItemBase, ItemKind,
    Observation, Project, Sample, SearchParameters, new_id,
};

pub trait MetadataSearch: Send + Sync {
    /// Items matching `parameters`, with fresh ids and owned by `batch`.
    fn search(
        &self,
        batch: &Batch,
        dataset: &Dataset,
        parameters: &SearchParameters,
    ) -> Result<Vec<Item>>;
}

pub trait MetadataExporter: Send + Sync {
    fn export(&self, project: &Project, dataset: &Dataset) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    items: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    kind: ItemKind,
    identifier: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    /// Identifiers of the samples an image was cut from.
    #[serde(default)]
    samples: Vec<String>,
    /// Image of an annotation or sample of an observation, by identifier.
    #[serde(default)]
    parent: Option<String>,
}

fn kind_name(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Sample => "sample",
        ItemKind::Image => "image",
        ItemKind::Annotation => "annotation",
        ItemKind::Observation => "observation",
    }
}

/// Searches a JSON manifest. Without a configured path the manifest is
/// `<dataset source>/manifest.json`.
pub struct ManifestSearch {
    manifest: Option<PathBuf>,
}

impl ManifestSearch {
    pub fn new(manifest: Option<PathBuf>) -> Self {
        Self { manifest }
    }

    fn manifest_path(&self, dataset: &Dataset) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| PathBuf::from(&dataset.source_path).join("manifest.json"))
    }
}

impl MetadataSearch for ManifestSearch {
    fn search(
        &self,
        batch: &Batch,
        dataset: &Dataset,
        parameters: &SearchParameters,
    ) -> Result<Vec<Item>> {
        let path = self.manifest_path(dataset);
        let content =
            fs::read_to_string(&path).with_context(|| format!("failed to read {:?}", path))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {:?}", path))?;
        let search = parameters.compile()?;

        // Identifiers are unique per kind only: a sample and its image may share one.
        let mut seen = HashSet::new();
        let selected: Vec<ManifestEntry> = manifest
            .items
            .into_iter()
            .filter(|entry| {
                if seen.insert((entry.kind, entry.identifier.clone())) {
                    return true;
                }
                warn!(
                    "Manifest {:?} lists {} `{}` more than once; keeping the first",
                    path,
                    kind_name(entry.kind),
                    entry.identifier
                );
                false
            })
            .filter(|entry| search.matches(&entry.identifier, &entry.attributes))
            .take(search.limit())
            .collect();

        let ids: HashMap<(ItemKind, &str), EntityId> = selected
            .iter()
            .map(|entry| ((entry.kind, entry.identifier.as_str()), new_id()))
            .collect();
        let link = |kind: ItemKind, identifier: &str| ids.get(&(kind, identifier)).copied();

        let items = selected
            .iter()
            .map(|entry| {
                let mut base = ItemBase::new(
                    entry.identifier.clone(),
                    dataset.id,
                    batch.id,
                    entry
                        .schema
                        .clone()
                        .unwrap_or_else(|| kind_name(entry.kind).to_string()),
                )
                .with_attributes(entry.attributes.clone());
                if let Some(id) = link(entry.kind, &entry.identifier) {
                    base.id = id;
                }

                match entry.kind {
                    ItemKind::Sample => Item::Sample(Sample { base }),
                    ItemKind::Image => {
                        let mut image = Image::new(base);
                        image.sample_ids = entry
                            .samples
                            .iter()
                            .filter_map(|sample| link(ItemKind::Sample, sample))
                            .collect();
                        Item::Image(image)
                    }
                    ItemKind::Annotation => Item::Annotation(Annotation {
                        base,
                        image_id: entry
                            .parent
                            .as_deref()
                            .and_then(|parent| link(ItemKind::Image, parent)),
                    }),
                    ItemKind::Observation => Item::Observation(Observation {
                        base,
                        sample_id: entry
                            .parent
                            .as_deref()
                            .and_then(|parent| link(ItemKind::Sample, parent)),
                    }),
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Manifest search for batch {} selected {} item(s)",
            batch.id,
            items.len()
        );
        Ok(items)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDocument<'a> {
    project: &'a Project,
    dataset: &'a Dataset,
    batches: Vec<BatchDocument>,
    exported_time: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchDocument {
    #[serde(flatten)]
    batch: Batch,
    items: Vec<Item>,
}

/// Writes `metadata.json` for a whole project through the storage collaborator.
pub struct JsonExporter {
    store: Arc<Store>,
    storage: Arc<dyn Storage>,
}

impl JsonExporter {
    pub fn new(store: Arc<Store>, storage: Arc<dyn Storage>) -> Self {
        Self { store, storage }
    }
}

impl MetadataExporter for JsonExporter {
    fn export(&self, project: &Project, dataset: &Dataset) -> Result<()> {
        let mut batches = Vec::new();
        for batch in self.store.batches_of_project(&project.id)? {
            if batch.status() == BatchStatus::Deleted {
                continue;
            }
            let items = self.store.items_of_batch(&batch.id)?;
            batches.push(BatchDocument { batch, items });
        }

        let document = ProjectDocument {
            project,
            dataset,
            batches,
            exported_time: crate::common::utils::now_ms(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .context("failed to serialize project metadata")?;
        self.storage.store_artifact(
            &ArtifactTarget::Project(project.id),
            vec![NamedStream::from_bytes(METADATA_FILE_NAME, bytes)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "items": [
            {"kind": "sample", "identifier": "S1", "attributes": {"organ": "lung"}},
            {"kind": "image", "identifier": "S1-HE", "samples": ["S1"],
             "attributes": {"organ": "lung", "stain": "HE"}},
            {"kind": "image", "identifier": "S2-HE", "attributes": {"organ": "liver", "stain": "HE"}},
            {"kind": "annotation", "identifier": "S1-HE-roi", "parent": "S1-HE",
             "attributes": {"organ": "lung"}}
        ]
    }"#;

    fn search(parameters: SearchParameters) -> Vec<Item> {
        search_in(MANIFEST, parameters)
    }

    fn search_in(manifest: &str, parameters: SearchParameters) -> Vec<Item> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, manifest).unwrap();
        let dataset = Dataset::new("d", dir.path().display().to_string(), 0);
        let project = Project::new("p", dataset.id);
        let batch = Batch::new("b", project.id, true);
        ManifestSearch::new(None)
            .search(&batch, &dataset, &parameters)
            .unwrap()
    }

    #[test]
    fn filters_and_links_items_by_identifier() {
        let items = search(SearchParameters::default().filter("organ", "^lung$"));
        assert_eq!(items.len(), 3);

        let sample_id = items[0].id();
        let image = items[1].as_image().unwrap();
        assert_eq!(image.sample_ids, vec![sample_id]);
        match &items[2] {
            Item::Annotation(annotation) => assert_eq!(annotation.image_id, Some(image.id())),
            other => panic!("unexpected item {other:?}"),
        }
        assert_eq!(image.base.schema, "image");
    }

    #[test]
    fn limit_caps_the_selection() {
        let items = search(SearchParameters {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn links_outside_the_selection_are_dropped() {
        let items = search(SearchParameters::default().filter("stain", "HE"));
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.as_image().unwrap().sample_ids.is_empty()));
    }

    #[test]
    fn shared_identifiers_link_by_kind_and_duplicates_are_dropped() {
        let manifest = r#"{
            "items": [
                {"kind": "sample", "identifier": "S1"},
                {"kind": "image", "identifier": "S1", "samples": ["S1"]},
                {"kind": "observation", "identifier": "S1", "parent": "S1"},
                {"kind": "image", "identifier": "S2"},
                {"kind": "image", "identifier": "S2"}
            ]
        }"#;
        let items = search_in(manifest, SearchParameters::default());
        assert_eq!(items.len(), 4);

        let ids: HashSet<EntityId> = items.iter().map(Item::id).collect();
        assert_eq!(ids.len(), 4);

        let sample_id = items[0].id();
        let image = items[1].as_image().unwrap();
        assert_ne!(image.id(), sample_id);
        assert_eq!(image.sample_ids, vec![sample_id]);
        match &items[2] {
            Item::Observation(observation) => assert_eq!(observation.sample_id, Some(sample_id)),
            other => panic!("unexpected item {other:?}"),
        }
    }
}
