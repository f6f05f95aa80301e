//! GRU sequence model with a dense head
//!
//! Inference only. The encoder reads the trailing hourly sequence ending at
//! the anchor; its last hidden state is concatenated with the static
//! calendar and prior-year features of all 24 predicted hours and passed
//! through the dense head, which emits the whole day at once.
//!
//! Artifacts in the model location:
//! - `model.json`: [`RecurrentWeights`], gate order r, z, n
//! - `scalers.json`: [`RecurrentScalers`]

use super::{horizon_lags, read_artifact, DayForecast, ModelAdapter, ModelKind, HOURS_PER_DAY};
use crate::data::HourlyFrame;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureKey, FeatureSpec};
use chrono::NaiveDateTime;
use grid_math::FittedScaler;
use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RECURRENT_ARTIFACT: &str = "model.json";
pub const SCALER_ARTIFACT: &str = "scalers.json";

/// Serialized GRU layer, matrices stored row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GruWeights {
    /// `3H x F`
    pub w_ih: Vec<Vec<f64>>,
    /// `3H x H`
    pub w_hh: Vec<Vec<f64>>,
    pub b_ih: Vec<f64>,
    pub b_hh: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Linear,
}

/// Serialized fully connected layer, `weights` is `out x in`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentWeights {
    pub gru: GruWeights,
    pub head: Vec<DenseLayer>,
}

/// Scalers fitted together with the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentScalers {
    /// Power and temperature columns of the sequence
    pub sequence: FittedScaler,
    /// Prior-year power and temperature of the static input
    #[serde(rename = "static")]
    pub static_features: FittedScaler,
    /// Applied in reverse to the network output when present
    #[serde(default)]
    pub target: Option<FittedScaler>,
}

#[derive(Debug)]
struct Gru {
    w_ih: Array2<f64>,
    w_hh: Array2<f64>,
    b_ih: Array1<f64>,
    b_hh: Array1<f64>,
    hidden: usize,
}

impl Gru {
    fn step(&self, x: ArrayView1<f64>, h: &Array1<f64>) -> Array1<f64> {
        let n = self.hidden;
        let gi = self.w_ih.dot(&x) + &self.b_ih;
        let gh = self.w_hh.dot(h) + &self.b_hh;

        let r = (&gi.slice(s![0..n]) + &gh.slice(s![0..n])).mapv(sigmoid);
        let z = (&gi.slice(s![n..2 * n]) + &gh.slice(s![n..2 * n])).mapv(sigmoid);
        let candidate = (&gi.slice(s![2 * n..]) + &(&r * &gh.slice(s![2 * n..]))).mapv(f64::tanh);

        (1.0 - &z) * &candidate + &z * h
    }

    fn encode(&self, sequence: &Array2<f64>) -> Array1<f64> {
        let mut h = Array1::zeros(self.hidden);
        for row in sequence.rows() {
            h = self.step(row, &h);
        }
        h
    }
}

#[derive(Debug)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl Dense {
    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        let y = self.weights.dot(x) + &self.bias;
        match self.activation {
            Activation::Relu => y.mapv(|v| v.max(0.0)),
            Activation::Linear => y,
        }
    }
}

#[derive(Debug)]
struct Network {
    gru: Gru,
    head: Vec<Dense>,
    scalers: RecurrentScalers,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn matrix(path: &Path, name: &str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(ForecastError::artifact(
            path,
            format!("{} has rows of unequal length", name),
        ));
    }
    Array2::from_shape_vec((n_rows, n_cols), rows.into_iter().flatten().collect())
        .map_err(|e| ForecastError::artifact(path, format!("{}: {}", name, e)))
}

fn expect_shape(path: &Path, name: &str, actual: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if actual != expected {
        return Err(ForecastError::artifact(
            path,
            format!("{} has shape {:?}, expected {:?}", name, actual, expected),
        ));
    }
    Ok(())
}

/// Recurrent model adapter
#[derive(Debug, Clone, Default)]
pub struct RecurrentAdapter {
    builder: FeatureBuilder,
    window: usize,
}

impl RecurrentAdapter {
    /// `window` is the number of hours before the anchor the encoder reads
    pub fn new(spec: FeatureSpec, window: usize) -> Self {
        Self {
            builder: FeatureBuilder::new(spec),
            window,
        }
    }

    /// Static keys of one forecast day, in network input order
    fn static_keys(&self, anchor: NaiveDateTime) -> Result<Vec<FeatureKey>> {
        let spec = self.builder.spec();
        let lags = horizon_lags(anchor);
        if let Some(lag) = lags.iter().find(|k| !spec.forecast_lags.contains(k)) {
            return Err(ForecastError::ValidationError(format!(
                "Anchor {} needs forecast lag {}, which the feature spec does not build",
                anchor, lag
            )));
        }
        Ok(lags.into_iter().flat_map(|k| spec.horizon_keys(k)).collect())
    }

    fn load(&self, location: &Path, static_len: usize) -> Result<Network> {
        let model_path: PathBuf = location.join(RECURRENT_ARTIFACT);
        let scaler_path: PathBuf = location.join(SCALER_ARTIFACT);
        let weights: RecurrentWeights = read_artifact(&model_path)?;
        let scalers: RecurrentScalers = read_artifact(&scaler_path)?;

        let hidden = weights.gru.b_hh.len() / 3;
        let features = self.builder.spec().sequence_width();
        if hidden == 0 || weights.gru.b_hh.len() != 3 * hidden {
            return Err(ForecastError::artifact(
                &model_path,
                "GRU bias length must be a positive multiple of 3",
            ));
        }
        let w_ih = matrix(&model_path, "w_ih", weights.gru.w_ih)?;
        let w_hh = matrix(&model_path, "w_hh", weights.gru.w_hh)?;
        expect_shape(&model_path, "w_ih", w_ih.dim(), (3 * hidden, features))?;
        expect_shape(&model_path, "w_hh", w_hh.dim(), (3 * hidden, hidden))?;
        expect_shape(&model_path, "b_ih", (weights.gru.b_ih.len(), 1), (3 * hidden, 1))?;

        let mut head = Vec::with_capacity(weights.head.len());
        let mut width = hidden + static_len;
        for (i, layer) in weights.head.into_iter().enumerate() {
            let name = format!("head[{}]", i);
            let w = matrix(&model_path, &name, layer.weights)?;
            let (out, input) = w.dim();
            expect_shape(&model_path, &name, (out, input), (layer.bias.len(), width))?;
            width = out;
            head.push(Dense {
                weights: w,
                bias: Array1::from_vec(layer.bias),
                activation: layer.activation,
            });
        }
        if head.is_empty() || width != HOURS_PER_DAY {
            return Err(ForecastError::artifact(
                &model_path,
                format!("head must end in {} outputs, got {}", HOURS_PER_DAY, width),
            ));
        }

        for (name, scaler, expected) in [
            ("sequence", &scalers.sequence, 2),
            ("static", &scalers.static_features, 2),
        ] {
            scaler
                .validate()
                .map_err(|e| ForecastError::artifact(&scaler_path, format!("{}: {}", name, e)))?;
            if scaler.width() != expected {
                return Err(ForecastError::artifact(
                    &scaler_path,
                    format!("{} scaler has {} columns, expected {}", name, scaler.width(), expected),
                ));
            }
        }
        if let Some(target) = &scalers.target {
            target
                .validate()
                .map_err(|e| ForecastError::artifact(&scaler_path, format!("target: {}", e)))?;
        }

        Ok(Network {
            gru: Gru {
                w_ih,
                w_hh,
                b_ih: Array1::from_vec(weights.gru.b_ih),
                b_hh: Array1::from_vec(weights.gru.b_hh),
                hidden,
            },
            head,
            scalers,
        })
    }
}

impl ModelAdapter for RecurrentAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::Recurrent
    }

    fn predict(
        &self,
        history: &HourlyFrame,
        anchor: NaiveDateTime,
        location: &Path,
    ) -> Result<DayForecast> {
        let static_keys = self.static_keys(anchor)?;
        let network = self.load(location, static_keys.len())?;

        let mut sequence = self.builder.sequence(history, anchor, self.window)?;
        if sequence.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InsufficientHistory(format!(
                "Gaps in the {} hours before {}",
                self.window + 1,
                anchor
            )));
        }
        for mut step in sequence.rows_mut() {
            let mut pair = [step[0], step[1]];
            network.scalers.sequence.transform_row(&mut pair)?;
            step[0] = pair[0];
            step[1] = pair[1];
        }

        let row = self.builder.build_row(history, anchor)?;
        let mut statics = Vec::with_capacity(static_keys.len());
        let mut pending: Option<f64> = None;
        for key in &static_keys {
            let value = row.get(key).unwrap_or(f64::NAN);
            match key {
                FeatureKey::PowerPrevYear(_) => pending = Some(value),
                FeatureKey::TemperaturePrevYear(_) => {
                    let mut pair = [pending.take().unwrap_or(f64::NAN), value];
                    network.scalers.static_features.transform_row(&mut pair)?;
                    statics.extend_from_slice(&pair);
                }
                _ => statics.push(value),
            }
        }

        let hidden = network.gru.encode(&sequence);
        let mut x = Array1::from_iter(hidden.iter().copied().chain(statics));
        for layer in &network.head {
            x = layer.forward(&x);
        }

        let mut values = x.to_vec();
        if let Some(target) = &network.scalers.target {
            for value in values.iter_mut() {
                let mut cell = [*value];
                target.inverse_transform_row(&mut cell)?;
                *value = cell[0];
            }
        }
        DayForecast::new(values)
    }
}
