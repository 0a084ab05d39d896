//! Optional TOML defaults for the `gridsearch` binary.
//!
//! Looked up from `$GRIDSEARCH_CONFIG`, else `gridsearch.toml` in the working
//! directory; missing or unreadable files fall back to the built-in defaults.
//! Command-line flags override whatever is resolved here.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_NAME: &str = "gridsearch.toml";

/// Resolved sweep defaults (file values merged over built-ins).
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub data_dir: PathBuf,
    pub model_dir: Option<PathBuf>,
    pub epochs: usize,
    pub input_channels: Vec<String>,
    pub synthetic_ratios: Vec<f32>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/annotated"),
            model_dir: None,
            epochs: 10,
            input_channels: vec!["R".to_string(), "RG".to_string()],
            synthetic_ratios: vec![0.0, 0.25, 0.5, 0.75, 1.0],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    data_dir: Option<String>,
    model_dir: Option<String>,
    epochs: Option<usize>,
    input_channels: Option<Vec<String>>,
    synthetic_ratios: Option<Vec<f32>>,
}

impl SweepSettings {
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("GRIDSEARCH_CONFIG") {
            return Self::from_path(Path::new(&path)).unwrap_or_default();
        }
        Self::from_path(Path::new(DEFAULT_SETTINGS_NAME)).unwrap_or_default()
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        let file: SettingsFile = toml::from_str(&raw).ok()?;
        Some(Self::from_file(file))
    }

    fn from_file(file: SettingsFile) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            model_dir: file.model_dir.map(PathBuf::from).or(defaults.model_dir),
            epochs: file.epochs.unwrap_or(defaults.epochs),
            input_channels: file
                .input_channels
                .filter(|axis| !axis.is_empty())
                .unwrap_or(defaults.input_channels),
            synthetic_ratios: file
                .synthetic_ratios
                .filter(|axis| !axis.is_empty())
                .unwrap_or(defaults.synthetic_ratios),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_resolves_to_the_defaults() {
        let settings = SweepSettings::from_file(SettingsFile::default());
        assert_eq!(settings, SweepSettings::default());
    }

    #[test]
    fn empty_axes_are_ignored() {
        let file = SettingsFile {
            synthetic_ratios: Some(Vec::new()),
            ..Default::default()
        };
        let settings = SweepSettings::from_file(file);
        assert_eq!(settings.synthetic_ratios, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }
}
