mod common;

use std::sync::Arc;

use slidepipe::AppContext;
use slidepipe::background::steps::{StepSettings, build_pipeline};
use slidepipe::common::{DEFAULT_POST_PROCESSING_STEPS, DEFAULT_PRE_PROCESSING_STEPS};
use slidepipe::database::Store;
use slidepipe::models::{
    Batch, BatchStatus, Dataset, ImageStatus, ItemSchema, Project, ProjectStatus,
    SearchParameters,
};
use slidepipe::operations::recovery::INTERRUPTED_MESSAGE;
use slidepipe::operations::{self, OperationError};

use common::{CountingExporter, FakeImporter, FakeSearch};

fn context(store: &Arc<Store>, work: &tempfile::TempDir) -> AppContext {
    common::init_logger();
    let services = common::services(
        store.clone(),
        Arc::new(FakeImporter::new(work.path())),
        Arc::new(FakeSearch::default()),
        Arc::new(CountingExporter::default()),
    );
    let settings = StepSettings::default();
    AppContext::new(
        services,
        build_pipeline(DEFAULT_PRE_PROCESSING_STEPS, &settings).unwrap(),
        build_pipeline(DEFAULT_POST_PROCESSING_STEPS, &settings).unwrap(),
        common::settings(),
        1,
        1,
    )
    .unwrap()
}

fn not_ready(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<OperationError>(),
        Some(OperationError::NotReady { .. })
    )
}

#[test]
fn new_project_gets_a_default_batch() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let dataset = Dataset::new("lung", "/data/lung", 0);
    store.put(&dataset).unwrap();

    let project = operations::create_project(&ctx, "lung-study", &dataset.id).unwrap();

    let batches = store.batches_of_project(&project.id).unwrap();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].is_default);
    assert_eq!(batches[0].status(), BatchStatus::Initialized);
    assert_eq!(project.status(), ProjectStatus::InProgress);
}

#[test]
fn project_on_an_unknown_dataset_is_refused() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);

    assert!(operations::create_project(&ctx, "orphan", "no-such-dataset").is_err());
    assert!(store.all::<Project>().unwrap().is_empty());
}

#[test]
fn default_flag_moves_to_the_chosen_batch() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (_, project, first) = common::seed_project(&store);

    let second = operations::create_batch(&ctx, &project.id, "second").unwrap();
    assert!(!second.is_default);
    operations::set_default_batch(&ctx, &second.id).unwrap();

    assert!(!store.fetch::<Batch>(&first.id).unwrap().is_default);
    assert!(store.fetch::<Batch>(&second.id).unwrap().is_default);
}

#[test]
fn reset_drops_search_results_but_not_from_a_fresh_batch() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (project, searched, images) = common::seed_batch(&store, 2);
    for image in &images {
        common::walk_image(&store, image, &[
            ImageStatus::Downloading,
            ImageStatus::Downloaded,
            ImageStatus::PreProcessing,
            ImageStatus::PreProcessed,
        ]);
    }
    common::set_batch_status(&store, &searched, &[BatchStatus::ImagePreProcessingComplete]);

    let fresh = operations::create_batch(&ctx, &project.id, "fresh").unwrap();
    let err = operations::reset_batch(&ctx, &fresh.id).unwrap_err();
    assert!(not_ready(&err), "{err}");

    let reset = operations::reset_batch(&ctx, &searched.id).unwrap();
    assert_eq!(reset.status(), BatchStatus::Initialized);
    assert!(store.items_of_batch(&searched.id).unwrap().is_empty());
    assert!(store.image(&images[0].id()).is_err());
}

#[test]
fn failed_batch_cannot_be_started_again() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (_, _, batch) = common::seed_project(&store);

    let failed = operations::mark_batch_failed(&ctx, &batch.id).unwrap();
    assert_eq!(failed.status(), BatchStatus::Failed);

    let err = operations::start_batch(&ctx, &batch.id, SearchParameters::default()).unwrap_err();
    assert!(not_ready(&err), "{err}");
    assert!(operations::mark_batch_failed(&ctx, &batch.id).is_err());
}

#[test]
fn post_processing_waits_for_pre_processing() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (_, batch, _) = common::seed_batch(&store, 1);

    let err =
        operations::start_post_processing(&ctx, &batch.id, ItemSchema::new("image")).unwrap_err();
    assert!(not_ready(&err), "{err}");
}

#[test]
fn deleted_project_leaves_tombstones_and_no_items() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (project, batch, images) = common::seed_batch(&store, 3);

    operations::delete_project(&ctx, &project.id).unwrap();

    assert_eq!(
        store.fetch::<Project>(&project.id).unwrap().status(),
        ProjectStatus::Deleted
    );
    assert_eq!(store.fetch::<Batch>(&batch.id).unwrap().status(), BatchStatus::Deleted);
    assert!(store.items_of_batch(&batch.id).unwrap().is_empty());
    for image in images {
        assert!(store.image(&image.id()).is_err());
    }

    let err = operations::export_project(&ctx, &project.id).unwrap_err();
    assert!(not_ready(&err), "{err}");
}

#[test]
fn startup_recovery_fails_work_nobody_owns() {
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    let ctx = context(&store, &work);
    let (project, _, images) = common::seed_batch(&store, 2);
    common::walk_image(&store, &images[0], &[ImageStatus::Downloading]);
    let searching = operations::create_batch(&ctx, &project.id, "searching").unwrap();
    common::set_batch_status(&store, &searching, &[BatchStatus::MetadataSearching]);

    let report = operations::recover_interrupted_images(&ctx).unwrap();

    assert_eq!(report.failed_images, 1);
    assert_eq!(report.failed_batches, 1);
    let interrupted = store.image(&images[0].id()).unwrap();
    assert_eq!(interrupted.status(), ImageStatus::Failed);
    assert_eq!(interrupted.status_message(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(store.image(&images[1].id()).unwrap().status(), ImageStatus::NotStarted);
    assert_eq!(
        store.fetch::<Batch>(&searching.id).unwrap().status(),
        BatchStatus::Failed
    );

    // A second pass finds nothing left to fail.
    let again = operations::recover_interrupted_images(&ctx).unwrap();
    assert_eq!(again, Default::default());
}
