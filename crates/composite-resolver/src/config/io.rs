//! Catalog file I/O
//!
//! Loading parses, validates, and builds the model in one step, so a
//! catalog that loads is one the engine can be built from.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::schema::{CatalogConfig, LoadedCatalog};

/// Read and validate a catalog file without building the model
pub fn read_config(path: impl AsRef<Path>) -> Result<CatalogConfig> {
    let path = path.as_ref();

    let content =
        fs::read_to_string(path).context(format!("Failed to read catalog: {}", path.display()))?;

    let config: CatalogConfig =
        toml::from_str(&content).context(format!("Failed to parse catalog: {}", path.display()))?;

    if let Err(errors) = config.validate() {
        anyhow::bail!(
            "Catalog validation failed in {}:\n  {}",
            path.display(),
            errors.join("\n  ")
        );
    }

    Ok(config)
}

/// Load a catalog file into the immutable model
pub fn load_catalog(path: impl AsRef<Path>) -> Result<LoadedCatalog> {
    let path = path.as_ref();
    let config = read_config(path)?;

    let loaded = config
        .into_model()
        .with_context(|| format!("Invalid catalog declarations in {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        composites = loaded.catalog.composites().count(),
        services = loaded.providers.len(),
        "loaded catalog"
    );
    Ok(loaded)
}

/// Save a catalog file
///
/// Creates parent directories if needed.
/// Validates the config before saving.
pub fn save_config(path: impl AsRef<Path>, config: &CatalogConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        anyhow::bail!("cannot save invalid catalog:\n  {}", errors.join("\n  "));
    }

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create catalog directory: {}",
            parent.display()
        ))?;
    }

    let content = toml::to_string_pretty(config).context("Failed to serialize catalog")?;

    fs::write(path, content).context(format!("Failed to write catalog: {}", path.display()))?;

    Ok(())
}
