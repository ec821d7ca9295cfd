//! Slide ingestion pipeline.
//!
//! Structure:
//! - `models`: projects, batches, items and their status machines
//! - `database`: redb-backed record store
//! - `integrations`: storage, import, metadata and dataset collaborators
//! - `background`: processing steps, the image processor, the scheduler and its actors
//! - `operations`: user-facing actions that drive the scheduler
//! - `context`: the service bundle built at startup

pub mod background;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod context;
pub mod database;
pub mod integrations;
pub mod models;
pub mod operations;

pub use context::{AppContext, PipelineSettings, Services};
