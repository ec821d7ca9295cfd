//! Application configuration, read once at startup from the environment.
//!
//! Every field can be set as `SLIDEPIPE_<FIELD>` (for example
//! `SLIDEPIPE_DEFAULT_WORKERS=8`); a `.env` file in the working directory is
//! loaded first. Lists are comma separated.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::background::steps::{ExternalConverter, StepSettings, TargetFormat, build_pipeline};
use crate::common::{
    DEFAULT_POST_PROCESSING_STEPS, DEFAULT_PRE_PROCESSING_STEPS, DEFAULT_THUMBNAIL_SIZE,
    ENV_PREFIX, MAX_COPY_RETRIES,
};
use crate::models::ItemSchema;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from the environment: {0}")]
    Env(#[from] envy::Error),
    #[error("unknown processing step `{0}`")]
    UnknownStep(String),
    #[error("unknown conversion format `{0}`")]
    UnknownFormat(String),
    #[error("conversion command must name a program and use {{input}} and {{output}}: `{0}`")]
    InvalidConverter(String),
    #[error("`{0}` must be at least 1")]
    ZeroWorkers(&'static str),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub storage_root: PathBuf,
    pub working_root: PathBuf,
    pub source_root: PathBuf,
    /// Switches downloads to HTTP. `{identifier}` is replaced per image.
    pub source_url_template: Option<String>,
    pub search_manifest: Option<PathBuf>,
    pub default_workers: usize,
    pub high_workers: usize,
    pub thumbnail_size: u32,
    pub conversion_format: String,
    pub conversion_command: Option<String>,
    pub pre_processing_steps: Vec<String>,
    pub post_processing_steps: Vec<String>,
    pub auto_post_process: bool,
    pub auto_export: bool,
    pub default_schema: String,
    pub export_attributes: Vec<String>,
    pub log_filter: String,
    pub copy_retries: u32,
    /// Dataset directory imported once at startup.
    pub import_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            db_path: PathBuf::from("./db/slidepipe.redb"),
            storage_root: PathBuf::from("./object"),
            working_root: PathBuf::from("./work"),
            source_root: PathBuf::from("./source"),
            source_url_template: None,
            search_manifest: None,
            default_workers: cores,
            high_workers: 2,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            conversion_format: "png".to_string(),
            conversion_command: None,
            pre_processing_steps: to_strings(DEFAULT_PRE_PROCESSING_STEPS),
            post_processing_steps: to_strings(DEFAULT_POST_PROCESSING_STEPS),
            auto_post_process: true,
            auto_export: true,
            default_schema: "image".to_string(),
            export_attributes: Vec::new(),
            log_filter: "info".to_string(),
            copy_retries: MAX_COPY_RETRIES,
            import_path: None,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl AppConfig {
    /// Loads `.env` if present, then the `SLIDEPIPE_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let config: AppConfig = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would only fail once the first job runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_workers == 0 {
            return Err(ConfigError::ZeroWorkers("default_workers"));
        }
        if self.high_workers == 0 {
            return Err(ConfigError::ZeroWorkers("high_workers"));
        }
        let settings = self.step_settings()?;
        build_pipeline(&self.pre_processing_steps, &settings)?;
        build_pipeline(&self.post_processing_steps, &settings)?;
        Ok(())
    }

    pub fn step_settings(&self) -> Result<StepSettings, ConfigError> {
        let converter = match self.conversion_command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => Some(ExternalConverter::parse(command)?),
            _ => None,
        };
        Ok(StepSettings {
            thumbnail_size: self.thumbnail_size,
            target_format: TargetFormat::from_str(&self.conversion_format)?,
            converter,
        })
    }

    pub fn schema(&self) -> ItemSchema {
        ItemSchema::new(self.default_schema.trim()).with_attributes(
            self.export_attributes
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty()),
        )
    }
}
