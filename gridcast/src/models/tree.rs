//! Gradient-boosted regression trees, one booster per forecast lag
//!
//! The artifact is `model.json` in the model location:
//!
//! ```json
//! {
//!   "boosters": {
//!     "12": {
//!       "feature_names": ["power_lag_0", "day_off_12"],
//!       "base_score": 0.0,
//!       "trees": [{ "nodes": [
//!         { "type": "split", "feature": 1, "threshold": 0.5,
//!           "left": 1, "right": 2, "default_left": true },
//!         { "type": "leaf", "value": 950.0 },
//!         { "type": "leaf", "value": 700.0 }
//!       ]}]
//!     }
//!   }
//! }
//! ```
//!
//! A split sends `x <= threshold` left; a missing (NaN) input follows
//! `default_left`. The booster output is `base_score` plus the sum of the
//! reached leaves.

use super::{horizon_lags, read_artifact, DayForecast, ModelAdapter, ModelKind};
use crate::data::HourlyFrame;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureKey, FeatureSpec};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

/// File name of the tree artifact inside a model location
pub const TREE_ARTIFACT: &str = "model.json";

/// One node of a regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree stored as a flat node list; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree without nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = *node
            {
                if feature >= n_features {
                    return Err(format!("node {} splits on unknown feature {}", i, feature));
                }
                // children always come after their parent, which rules out cycles
                if left <= i || right <= i || left >= self.nodes.len() || right >= self.nodes.len()
                {
                    return Err(format!("node {} has invalid children", i));
                }
            }
        }
        Ok(())
    }

    /// Leaf value reached by `x`
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let value = x[feature];
                    index = if value.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if value <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Serialized booster of one forecast lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

/// Serialized tree ensemble: boosters keyed by forecast lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub boosters: BTreeMap<usize, Booster>,
}

#[derive(Debug)]
struct LoadedBooster {
    features: Vec<FeatureKey>,
    base_score: f64,
    trees: Vec<Tree>,
}

impl LoadedBooster {
    fn predict(&self, x: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.evaluate(x)).sum::<f64>()
    }
}

/// Tree-ensemble model over the flat feature row
#[derive(Debug, Clone, Default)]
pub struct TreeEnsembleAdapter {
    builder: FeatureBuilder,
}

impl TreeEnsembleAdapter {
    pub fn new(spec: FeatureSpec) -> Self {
        Self {
            builder: FeatureBuilder::new(spec),
        }
    }

    /// Read and check the artifact; every referenced feature must be one the
    /// builder produces
    fn load(&self, location: &Path) -> Result<BTreeMap<usize, LoadedBooster>> {
        let path = location.join(TREE_ARTIFACT);
        let artifact: TreeArtifact = read_artifact(&path)?;
        let produced: HashSet<FeatureKey> = self.builder.spec().keys().into_iter().collect();

        let mut boosters = BTreeMap::new();
        for (lag, booster) in artifact.boosters {
            let mut features = Vec::with_capacity(booster.feature_names.len());
            for name in &booster.feature_names {
                let key: FeatureKey = name
                    .parse()
                    .map_err(|e: ForecastError| ForecastError::artifact(&path, e.to_string()))?;
                if !produced.contains(&key) {
                    return Err(ForecastError::artifact(
                        &path,
                        format!("feature '{}' is not produced by the feature spec", name),
                    ));
                }
                features.push(key);
            }
            for tree in &booster.trees {
                tree.validate(features.len()).map_err(|reason| {
                    ForecastError::artifact(&path, format!("booster {}: {}", lag, reason))
                })?;
            }
            boosters.insert(
                lag,
                LoadedBooster {
                    features,
                    base_score: booster.base_score,
                    trees: booster.trees,
                },
            );
        }
        Ok(boosters)
    }
}

impl ModelAdapter for TreeEnsembleAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn predict(
        &self,
        history: &HourlyFrame,
        anchor: NaiveDateTime,
        location: &Path,
    ) -> Result<DayForecast> {
        let boosters = self.load(location)?;
        let row = self.builder.build_row(history, anchor)?;

        let mut values = Vec::with_capacity(super::HOURS_PER_DAY);
        for lag in horizon_lags(anchor) {
            let booster = boosters.get(&lag).ok_or_else(|| {
                ForecastError::artifact(
                    location.join(TREE_ARTIFACT),
                    format!("no booster for forecast lag {}", lag),
                )
            })?;
            values.push(booster.predict(&row.select(&booster.features)));
        }
        debug!(component = "tree_ensemble", %anchor, boosters = boosters.len(), "predicted day");
        DayForecast::new(values)
    }
}
