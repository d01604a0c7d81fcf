pub mod ask;
pub mod databases;
pub mod search;
pub mod status;

use crate::cli::Cli;
use indicatif::{ProgressBar, ProgressStyle};
use scholarly_core::error::{ConfigError, PipelineError, StoreError};
use scholarly_core::{build_registry_enabled_only, FederatedSearch, Settings};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No databases are enabled; check the connector features and configuration")]
    NoDatabases,

    #[error("Research run failed: {0}")]
    RunFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!(
        config = ?cli.config,
        databases = ?settings.search.default_databases,
        vector_store = ?settings.vector_store.backend,
        "loaded settings"
    );
    Ok(settings)
}

/// Federated search engine over the enabled connectors.
pub fn create_search(settings: &Settings) -> Result<FederatedSearch> {
    let registry = build_registry_enabled_only(settings);
    if registry.is_empty() {
        return Err(CommandError::NoDatabases);
    }
    Ok(FederatedSearch::from_settings(
        Arc::new(registry),
        &settings.search,
    ))
}

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
