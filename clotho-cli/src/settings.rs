//! Settings file lookup and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clotho_core::{DatasetSettings, FeatureSettings};

/// Directory searched for bare settings names.
pub const SETTINGS_DIR: &str = "settings";

/// `dataset_creation` → `settings/dataset_creation.json`; anything that looks
/// like a path (has an extension or a directory component) is used as is.
pub fn resolve_settings_path(name: &str) -> PathBuf {
    let path = Path::new(name.trim());
    let is_bare = path.extension().is_none() && path.parent() == Some(Path::new(""));
    if is_bare {
        Path::new(SETTINGS_DIR).join(format!("{}.json", name.trim()))
    } else {
        path.to_path_buf()
    }
}

pub fn load_dataset_settings(name: &str, nb_workers: Option<usize>) -> Result<DatasetSettings> {
    let path = resolve_settings_path(name);
    let mut settings = DatasetSettings::load(&path)
        .with_context(|| format!("loading dataset settings from {}", path.display()))?;
    if let Some(n) = nb_workers {
        settings.nb_workers = n;
        settings.normalize();
    }
    Ok(settings)
}

pub fn load_feature_settings(name: &str) -> Result<FeatureSettings> {
    let path = resolve_settings_path(name);
    FeatureSettings::load(&path)
        .with_context(|| format!("loading feature settings from {}", path.display()))
}
