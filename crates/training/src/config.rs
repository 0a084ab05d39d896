use serde::Serialize;
use std::path::PathBuf;

use crate::error::{TrainError, TrainResult};

/// Per-run training configuration.
///
/// A sweep never mutates a configuration in place: each run receives its own
/// copy built with the consuming `with_*` overrides, so no run can observe
/// another run's field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub epochs: usize,
    /// Apply flip/noise augmentation to training samples.
    pub data_aug: bool,
    /// Dataset root containing `images/` and `masks/`.
    pub data_dir: PathBuf,
    /// Fluorescence-channel specifier, a subset of `RGB` (e.g. `R`, `RG`).
    pub input_channels: String,
    pub learning_rate: f64,
    /// Output directory for checkpoint/history; nothing is persisted if unset.
    pub model_dir: Option<PathBuf>,
    pub no_gpu: bool,
    /// Write validation-probability images next to the checkpoint.
    pub save_fig: bool,
    /// Scale factor of the centered metric window (`lossC`/`diC` variants).
    pub scale_crop: f32,
    pub seed: u64,
    /// Mix synthetic samples into the training set per `synthetic_ratio`.
    pub synthetic_data: bool,
    /// Train purely on generated samples; no dataset is read.
    pub synthetic_only: bool,
    pub synthetic_ratio: Option<f32>,
    /// Print per-epoch wall-clock times.
    pub timeit: bool,
    /// Weight foreground pixels double in the loss.
    pub use_masks: bool,
    /// Evaluate a held-out test split after training.
    pub eval_test: bool,
    /// Print per-epoch validation metrics.
    pub verbose: bool,
}

impl TrainConfig {
    /// Fixed defaults shared by every sweep point.
    pub fn baseline(epochs: usize, data_dir: PathBuf) -> Self {
        Self {
            batch_size: 32,
            epochs,
            data_aug: false,
            data_dir,
            input_channels: "R".to_string(),
            learning_rate: 1e-3,
            model_dir: None,
            no_gpu: false,
            save_fig: false,
            scale_crop: 4.0,
            seed: 1,
            synthetic_data: false,
            synthetic_only: false,
            synthetic_ratio: None,
            timeit: false,
            use_masks: false,
            eval_test: false,
            verbose: false,
        }
    }

    pub fn with_input_channels(mut self, spec: impl Into<String>) -> Self {
        self.input_channels = spec.into();
        self
    }

    pub fn with_synthetic_ratio(mut self, ratio: Option<f32>) -> Self {
        self.synthetic_ratio = ratio;
        self
    }

    pub fn with_synthetic_data(mut self, on: bool) -> Self {
        self.synthetic_data = on;
        self
    }

    pub fn with_synthetic_only(mut self, on: bool) -> Self {
        self.synthetic_only = on;
        self
    }

    pub fn with_data_aug(mut self, on: bool) -> Self {
        self.data_aug = on;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_model_dir(mut self, model_dir: Option<PathBuf>) -> Self {
        self.model_dir = model_dir;
        self
    }

    /// Number of image channels selected by the channel specifier.
    pub fn channel_count(&self) -> usize {
        self.input_channels.chars().count()
    }

    /// RGB plane indices selected by the channel specifier.
    pub fn channel_indices(&self) -> TrainResult<Vec<usize>> {
        if self.input_channels.is_empty() {
            return Err(TrainError::Config(
                "channel specifier is empty (expected a subset of RGB)".to_string(),
            ));
        }
        self.input_channels
            .chars()
            .map(|c| match c {
                'R' => Ok(0),
                'G' => Ok(1),
                'B' => Ok(2),
                other => Err(TrainError::Config(format!(
                    "unknown channel specifier '{other}' (expected R, G, or B)"
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_copy_without_touching_other_fields() {
        let base = TrainConfig::baseline(10, PathBuf::from("data"));
        let varied = base
            .clone()
            .with_input_channels("RG")
            .with_synthetic_ratio(Some(0.75));

        assert_eq!(varied.input_channels, "RG");
        assert_eq!(varied.synthetic_ratio, Some(0.75));
        let reverted = varied
            .with_input_channels(base.input_channels.clone())
            .with_synthetic_ratio(None);
        assert_eq!(reverted, base);
    }

    #[test]
    fn channel_indices_follow_the_specifier() {
        let config = TrainConfig::baseline(1, PathBuf::new()).with_input_channels("RG");
        assert_eq!(config.channel_indices().unwrap(), vec![0, 1]);
        assert_eq!(config.channel_count(), 2);
    }

    #[test]
    fn channel_indices_reject_unknown_planes() {
        let config = TrainConfig::baseline(1, PathBuf::new()).with_input_channels("RX");
        assert!(matches!(
            config.channel_indices(),
            Err(TrainError::Config(_))
        ));
    }
}
