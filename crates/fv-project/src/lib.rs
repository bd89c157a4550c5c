//! fv-project: site file format, migration and validation.

pub mod migrate;
pub mod scenario;
pub mod schema;
pub mod validate;

use std::path::Path;

pub use migrate::{LATEST_VERSION, migrate_to_latest};
pub use scenario::build_scenario;
pub use schema::*;
pub use validate::{ValidationError, ValidationWarning, controller_config, validate_site};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Migration error: {what}")]
    Migration { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a site file, choosing the format from the extension (`.json`, else YAML).
pub fn load(path: &Path) -> ProjectResult<Site> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_yaml(path),
    }
}

pub fn load_yaml(path: &Path) -> ProjectResult<Site> {
    let content = std::fs::read_to_string(path)?;
    let site: Site = serde_yaml::from_str(&content)?;
    finish_load(site)
}

pub fn save_yaml(path: &Path, site: &Site) -> ProjectResult<()> {
    validate_site(site)?;
    let content = serde_yaml::to_string(site)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &Path) -> ProjectResult<Site> {
    let content = std::fs::read_to_string(path)?;
    let site: Site = serde_json::from_str(&content)?;
    finish_load(site)
}

pub fn save_json(path: &Path, site: &Site) -> ProjectResult<()> {
    validate_site(site)?;
    let content = serde_json::to_string_pretty(site)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn finish_load(site: Site) -> ProjectResult<Site> {
    let site = migrate_to_latest(site)?;
    validate_site(&site)?;
    Ok(site)
}
