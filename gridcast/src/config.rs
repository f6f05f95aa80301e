//! Pipeline configuration loaded from a JSON file, every field defaulted

use crate::error::{ForecastError, Result};
use crate::features::FeatureSpec;
use crate::models::{ModelKind, ModelSpec};
use crate::repair::RepairSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration, read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Where daily forecast CSVs are published
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Where monthly quality reports are written
    #[serde(default = "default_monitor_dir")]
    pub monitor_dir: PathBuf,

    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub features: FeatureSpec,

    /// Hour of the day before the forecast date at which forecasts are issued
    #[serde(default = "default_anchor_hour")]
    pub anchor_hour: u32,
    /// Telemetry is considered current once it reaches this hour
    #[serde(default = "default_cutoff_hour")]
    pub cutoff_hour: u32,
    /// Hours before the anchor read by the recurrent encoder
    #[serde(default = "default_sequence_window")]
    pub sequence_window: usize,
    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,

    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// Ensemble member as written in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub kind: ModelKind,
    pub name: String,
    #[serde(default)]
    pub location: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    #[serde(default = "default_power_repair")]
    pub power: RepairSettings,
    #[serde(default = "default_temperature_repair")]
    pub temperature: RepairSettings,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            power: default_power_repair(),
            temperature: default_temperature_repair(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            reports_dir: default_reports_dir(),
            monitor_dir: default_monitor_dir(),
            repair: RepairConfig::default(),
            features: FeatureSpec::default(),
            anchor_hour: default_anchor_hour(),
            cutoff_hour: default_cutoff_hour(),
            sequence_window: default_sequence_window(),
            moving_average_window: default_moving_average_window(),
            models: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.anchor_hour > 23 || self.cutoff_hour > 23 {
            return Err(ForecastError::ValidationError(format!(
                "Anchor hour {} and cutoff hour {} must be within 0..=23",
                self.anchor_hour, self.cutoff_hour
            )));
        }
        if self.moving_average_window == 0 {
            return Err(ForecastError::ValidationError(
                "Moving average window must be greater than zero".to_string(),
            ));
        }
        self.features.validate()?;

        let mut seen = HashSet::new();
        for entry in &self.models {
            if !seen.insert(entry.name.as_str()) {
                return Err(ForecastError::ValidationError(format!(
                    "Model name '{}' is configured twice",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Ensemble members with their adapters
    pub fn model_specs(&self) -> Vec<ModelSpec> {
        self.models
            .iter()
            .map(|entry| {
                ModelSpec::new(
                    entry.kind.adapter(self),
                    entry.name.clone(),
                    entry.location.clone(),
                )
            })
            .collect()
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("gridcast.db")
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_monitor_dir() -> PathBuf {
    PathBuf::from("monitoring")
}
fn default_power_repair() -> RepairSettings {
    RepairSettings::new(650.0, 1)
}
fn default_temperature_repair() -> RepairSettings {
    RepairSettings::new(10.0, 1)
}
fn default_anchor_hour() -> u32 {
    11
}
fn default_cutoff_hour() -> u32 {
    12
}
fn default_sequence_window() -> usize {
    179
}
fn default_moving_average_window() -> usize {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.anchor_hour, 11);
        assert_eq!(config.repair.power, RepairSettings::new(650.0, 1));
        assert_eq!(config.repair.temperature, RepairSettings::new(10.0, 1));
        assert_eq!(config.features, FeatureSpec::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_models_section() {
        let raw = r#"{"models": [
            {"kind": "tree_ensemble", "name": "lgbm", "location": "models/lgbm"},
            {"kind": "moving_average", "name": "baseline"}
        ]}"#;
        let config: PipelineConfig = serde_json::from_str(raw).unwrap();
        let specs = config.model_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].adapter.kind(), ModelKind::TreeEnsemble);
        assert_eq!(specs[1].name, "baseline");
    }

    #[test]
    fn test_duplicate_model_names() {
        let mut config = PipelineConfig::default();
        let entry = ModelEntry {
            kind: ModelKind::MovingAverage,
            name: "a".to_string(),
            location: PathBuf::new(),
        };
        config.models = vec![entry.clone(), entry];
        assert!(config.validate().is_err());
    }
}
