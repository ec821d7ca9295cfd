//! Background job scheduler.
//!
//! Jobs are explicit [`JobDescriptor`] values. Submission reserves the job's
//! identity in a [`JobRegistry`] and queues the job on the pool of its
//! priority class, so a second submission for the same identity is refused
//! while the first is pending or running. A chain continuation for the same
//! identity takes the slot over directly and the identity never looks idle
//! between the two stages.

pub mod job;
pub mod pool;
pub mod registry;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::common::errors::{handle_error, panic_message};
use crate::models::{EntityId, ItemSchema, SearchParameters};

pub use job::{JobDescriptor, JobIdentity, JobKind, Priority};
pub use pool::WorkerPool;
pub use registry::{JobRegistry, SlotState};

/// Runs the body of a job. Implementations may submit further jobs through
/// the scheduler they are handed.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &JobKind, scheduler: &Scheduler) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("scheduler is not accepting jobs; {kind} for {identity} was dropped")]
    Unavailable {
        kind: &'static str,
        identity: JobIdentity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued(u64),
    /// A job for the same identity is already pending or running.
    Duplicate,
}

struct Inner {
    executor: Arc<dyn JobExecutor>,
    registry: JobRegistry,
    default_pool: WorkerPool,
    high_pool: WorkerPool,
    accepting: AtomicBool,
    next_ticket: AtomicU64,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Frees the slot of a running job unless the slot was handed to a continuation.
struct SlotGuard<'a> {
    registry: &'a JobRegistry,
    identity: JobIdentity,
    ticket: u64,
    armed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(&self.identity, self.ticket);
        }
    }
}

impl Scheduler {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        default_workers: usize,
        high_workers: usize,
    ) -> Result<Self> {
        let inner = Inner {
            executor,
            registry: JobRegistry::new(),
            default_pool: WorkerPool::new("default", default_workers)?,
            high_pool: WorkerPool::new("high", high_workers)?,
            accepting: AtomicBool::new(true),
            next_ticket: AtomicU64::new(1),
        };
        info!(
            "Scheduler started with {} default and {} high priority worker(s)",
            inner.default_pool.threads(),
            inner.high_pool.threads()
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Queues a job unless one with the same identity is pending or running.
    pub fn submit(&self, descriptor: JobDescriptor) -> Result<Submission, SubmitError> {
        let identity = descriptor.identity();
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(SubmitError::Unavailable {
                kind: descriptor.kind.name(),
                identity,
            });
        }

        let ticket = self.next_ticket();
        if !self.inner.registry.reserve(&identity, ticket) {
            warn!(
                "Skipping {} for {}: a job for it is already pending or running",
                descriptor.kind.name(),
                identity
            );
            return Ok(Submission::Duplicate);
        }

        self.dispatch(ticket, descriptor);
        Ok(Submission::Queued(ticket))
    }

    fn next_ticket(&self) -> u64 {
        self.inner.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    fn dispatch(&self, ticket: u64, descriptor: JobDescriptor) {
        debug!(
            "Queued {} for {} as ticket {}",
            descriptor.kind.name(),
            descriptor.identity(),
            ticket
        );
        let pool = match descriptor.priority {
            Priority::Default => &self.inner.default_pool,
            Priority::High => &self.inner.high_pool,
        };
        let scheduler = self.clone();
        pool.spawn(move || scheduler.run_job(ticket, descriptor));
    }

    fn run_job(&self, ticket: u64, descriptor: JobDescriptor) {
        let identity = descriptor.identity();
        let name = descriptor.kind.name();
        if !self.inner.registry.start(&identity, ticket) {
            debug!("Dropping {} for {}: cancelled before it started", name, identity);
            return;
        }
        let mut guard = SlotGuard {
            registry: &self.inner.registry,
            identity: identity.clone(),
            ticket,
            armed: true,
        };

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.executor.execute(&descriptor.kind, self)
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow!("job panicked: {}", panic_message(payload.as_ref())))
        });

        match result {
            Ok(()) => {
                info!(
                    duration = &*format!("{:?}", start.elapsed());
                    "Finished {} for {}", name, identity
                );
                if let Some(next) = descriptor.then {
                    self.continue_chain(&mut guard, *next);
                }
            }
            Err(err) => {
                handle_error(err.context(format!("{} failed for {}", name, identity)));
                if let Some(next) = descriptor.then {
                    warn!(
                        "Skipping {} for {}: {} did not succeed",
                        next.kind.name(),
                        next.identity(),
                        name
                    );
                }
            }
        }
    }

    fn continue_chain(&self, guard: &mut SlotGuard<'_>, next: JobDescriptor) {
        let next_identity = next.identity();
        if next_identity != guard.identity {
            // The continuation is reserved before our own slot is freed.
            self.submit_logged(next);
            return;
        }
        if !self.inner.accepting.load(Ordering::Acquire) {
            error!(
                "Dropping {} for {}: scheduler is shutting down",
                next.kind.name(),
                next_identity
            );
            return;
        }
        let ticket = self.next_ticket();
        if self
            .inner
            .registry
            .hand_over(&guard.identity, guard.ticket, ticket)
        {
            guard.armed = false;
            self.dispatch(ticket, next);
        }
    }

    fn submit_logged(&self, descriptor: JobDescriptor) {
        if let Err(err) = self.submit(descriptor) {
            error!("{}", err);
        }
    }

    /// Removes a pending job. Running jobs cannot be cancelled.
    pub fn cancel(&self, identity: &JobIdentity) -> bool {
        let cancelled = self.inner.registry.cancel(identity).is_some();
        if cancelled {
            info!("Cancelled pending job for {}", identity);
        }
        cancelled
    }

    pub fn is_active(&self, identity: &JobIdentity) -> bool {
        self.inner.registry.state(identity).is_some()
    }

    pub fn active_jobs(&self) -> Vec<(JobIdentity, SlotState)> {
        self.inner.registry.snapshot()
    }

    /// Stops accepting jobs and drops every pending one. Running jobs finish.
    pub fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::Release);
        let cancelled = self.inner.registry.cancel_all_pending();
        info!("Scheduler shut down; {} pending job(s) dropped", cancelled);
    }

    /// Waits until no job is pending or running. False on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.registry.wait_empty(timeout)
    }

    // ────────────────────────────────────────────────────────────────
    // Named operations. Each returns at once; a refused submission is
    // logged and dropped.
    // ────────────────────────────────────────────────────────────────

    pub fn download_image(&self, image_id: EntityId, priority: Priority) {
        self.submit_logged(JobDescriptor::new(
            JobKind::DownloadImage { image_id },
            priority,
        ));
    }

    pub fn pre_process_image(&self, image_id: EntityId, priority: Priority) {
        self.submit_logged(JobDescriptor::new(
            JobKind::PreProcessImage { image_id },
            priority,
        ));
    }

    /// Pre-processing is queued only after the download reported success.
    pub fn download_and_pre_process_image(&self, image_id: EntityId, priority: Priority) {
        let descriptor = JobDescriptor::new(JobKind::DownloadImage { image_id }, priority).then(
            JobDescriptor::new(JobKind::PreProcessImage { image_id }, priority),
        );
        self.submit_logged(descriptor);
    }

    /// Pre- then post-processing of one image. Redo uses it when the batch
    /// already moved on to post-processing.
    pub fn pre_and_post_process_image(
        &self,
        image_id: EntityId,
        schema: ItemSchema,
        priority: Priority,
    ) {
        let descriptor = JobDescriptor::new(JobKind::PreProcessImage { image_id }, priority).then(
            JobDescriptor::new(JobKind::PostProcessImage { image_id, schema }, priority),
        );
        self.submit_logged(descriptor);
    }

    /// Download, pre- and post-processing of one image. Each stage waits for
    /// the previous one to succeed.
    pub fn download_and_process_image(
        &self,
        image_id: EntityId,
        schema: ItemSchema,
        priority: Priority,
    ) {
        let post = JobDescriptor::new(JobKind::PostProcessImage { image_id, schema }, priority);
        let pre = JobDescriptor::new(JobKind::PreProcessImage { image_id }, priority).then(post);
        self.submit_logged(
            JobDescriptor::new(JobKind::DownloadImage { image_id }, priority).then(pre),
        );
    }

    pub fn post_process_image(&self, image_id: EntityId, schema: ItemSchema, priority: Priority) {
        self.submit_logged(JobDescriptor::new(
            JobKind::PostProcessImage { image_id, schema },
            priority,
        ));
    }

    pub fn post_process_images_in_batch(&self, batch_id: EntityId, schema: ItemSchema) {
        self.submit_logged(JobDescriptor::new(
            JobKind::PostProcessBatch { batch_id, schema },
            Priority::Default,
        ));
    }

    pub fn metadata_batch_import(&self, batch_id: EntityId, parameters: SearchParameters) {
        self.submit_logged(JobDescriptor::new(
            JobKind::MetadataBatchImport {
                batch_id,
                parameters,
            },
            Priority::Default,
        ));
    }

    pub fn metadata_project_export(&self, project_id: EntityId) {
        self.submit_logged(JobDescriptor::new(
            JobKind::MetadataProjectExport { project_id },
            Priority::Default,
        ));
    }

    pub fn dataset_import(&self, path: PathBuf) {
        self.submit_logged(JobDescriptor::new(
            JobKind::DatasetImport { path },
            Priority::Default,
        ));
    }
}
