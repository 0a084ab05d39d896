//! The training collaborator: one full run over a configuration.
//!
//! A run builds a fresh model from the given spec, assembles its data per the
//! configuration's flags, trains with Adam on pixelwise BCE, and records
//! per-epoch validation metrics (`val_loss`, `val_dice`, and their centered
//! crop variants) into a `History`.

use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor};
use models::{UNet, UNetConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::config::TrainConfig;
use crate::dataset::{self, collate, SegSample, SplitSets};
use crate::error::{TrainError, TrainResult};
use crate::history::History;
use crate::sweep::Trainer;
use crate::synth::{self, SynthSpec};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

/// Synthetic-only runs have no dataset to size against.
const SYNTH_ONLY_TRAIN: usize = 16;
const SYNTH_ONLY_VAL: usize = 4;

/// The in-process trainer backing the `gridsearch` and `train` binaries.
pub struct BurnTrainer;

impl Trainer for BurnTrainer {
    fn run(&mut self, config: &TrainConfig, model: UNetConfig) -> Result<History, TrainError> {
        run_train(config, model)
    }
}

pub fn run_train(config: &TrainConfig, model_spec: UNetConfig) -> TrainResult<History> {
    validate_device_choice(config.no_gpu);
    let channel_indices = config.channel_indices()?;
    if model_spec.in_channels != channel_indices.len() {
        return Err(TrainError::Config(format!(
            "model expects {} input channels but specifier '{}' selects {}",
            model_spec.in_channels,
            config.input_channels,
            channel_indices.len()
        )));
    }

    // The encoder pools depth times, so every frame side must divide evenly.
    let spatial_multiple = 1u32 << model_spec.depth.max(1).min(16);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let sets = build_sets(config, &channel_indices, spatial_multiple, &mut rng)?;

    let device = <ADBackend as Backend>::Device::default();
    let mut model = UNet::<ADBackend>::new(model_spec, &device);
    let mut optim = AdamConfig::new().init();
    let mut history = History::new();

    let batch_size = config.batch_size.max(1);
    for epoch in 0..config.epochs {
        let epoch_start = Instant::now();

        let mut train = sets.train.clone();
        train.shuffle(&mut rng);
        if config.data_aug {
            for sample in &mut train {
                synth::augment(sample, &mut rng);
            }
        }

        let mut losses = Vec::new();
        for chunk in train.chunks(batch_size) {
            let batch = collate::<ADBackend>(chunk, &device)?;
            let logits = model.forward(batch.images);
            let loss = bce_loss(logits, batch.masks, config.use_masks);
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);

            let loss_val: f32 = loss_detached
                .into_data()
                .to_vec::<f32>()
                .unwrap_or_default()
                .into_iter()
                .next()
                .unwrap_or(0.0);
            losses.push(loss_val);
        }
        let train_loss = if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f32>() / losses.len() as f32
        };
        history.push("loss", train_loss);

        let eval_model = model.valid();
        let metrics = evaluate(&eval_model, &sets.val, batch_size, config.scale_crop)?;
        history.push("val_loss", metrics.loss);
        history.push(
            History::crop_key("val_loss", config.scale_crop),
            metrics.loss_crop,
        );
        history.push("val_dice", metrics.dice);
        history.push(
            History::crop_key("val_di", config.scale_crop),
            metrics.dice_crop,
        );

        if config.verbose {
            println!(
                "epoch {epoch}: loss={train_loss:.6} val_loss={:.6} val_dice={:.6}",
                metrics.loss, metrics.dice
            );
        }
        if config.timeit {
            println!("epoch {epoch}: {:.1}s", epoch_start.elapsed().as_secs_f32());
        }
    }

    let eval_model = model.valid();
    if config.eval_test && !sets.test.is_empty() {
        let metrics = evaluate(&eval_model, &sets.test, batch_size, config.scale_crop)?;
        println!("test: loss={:.6} - dice={:.6}", metrics.loss, metrics.dice);
    }

    if let Some(model_dir) = &config.model_dir {
        persist_run(model_dir, &model, &eval_model, &history, config, &sets.val)?;
    }

    Ok(history)
}

/// Advisory note when the requested device does not match the built backend.
pub fn validate_device_choice(no_gpu: bool) {
    if no_gpu && cfg!(feature = "backend-wgpu") {
        println!(
            "note: built with backend-wgpu; training will still use the WGPU backend despite no_gpu"
        );
    }
}

fn build_sets(
    config: &TrainConfig,
    channel_indices: &[usize],
    spatial_multiple: u32,
    rng: &mut StdRng,
) -> TrainResult<SplitSets> {
    if config.synthetic_only {
        let spec = SynthSpec::new(channel_indices.len());
        if spec.width % spatial_multiple != 0 || spec.height % spatial_multiple != 0 {
            return Err(TrainError::Config(format!(
                "synthetic frame size {}x{} is not a multiple of {spatial_multiple}",
                spec.width, spec.height
            )));
        }
        return Ok(SplitSets {
            train: synth::generate_set(rng, &spec, SYNTH_ONLY_TRAIN),
            val: synth::generate_set(rng, &spec, SYNTH_ONLY_VAL),
            test: if config.eval_test {
                synth::generate_set(rng, &spec, SYNTH_ONLY_VAL)
            } else {
                Vec::new()
            },
        });
    }

    let samples = dataset::load_dir(&config.data_dir, channel_indices, spatial_multiple)?;
    if samples.is_empty() {
        return Err(TrainError::Other(format!(
            "no samples found under {}",
            config.data_dir.display()
        )));
    }
    let mut sets = dataset::split(samples, rng, config.eval_test);
    if config.synthetic_data {
        if let Some(ratio) = config.synthetic_ratio {
            synth::mix_synthetic(&mut sets.train, ratio, rng);
        }
    }
    Ok(sets)
}

/// Pixelwise binary cross-entropy on logits, optionally foreground-weighted.
fn bce_loss<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 4>,
    weight_foreground: bool,
) -> Tensor<B, 1> {
    let prob = sigmoid(logits).clamp(1e-6, 1.0 - 1e-6);
    let one_minus_t = targets.clone().neg().add_scalar(1.0);
    let one_minus_p = prob.clone().neg().add_scalar(1.0);
    let per_pixel = (targets.clone() * prob.log() + one_minus_t * one_minus_p.log()).neg();
    if weight_foreground {
        let weights = targets.add_scalar(1.0);
        (per_pixel * weights.clone()).sum() / weights.sum()
    } else {
        per_pixel.mean()
    }
}

struct EvalMetrics {
    loss: f32,
    loss_crop: f32,
    dice: f32,
    dice_crop: f32,
}

/// Validation metrics over a sample set. The crop variants aggregate only the
/// centered window with sides `1/scale` of the frame.
fn evaluate(
    model: &UNet<TrainBackend>,
    samples: &[SegSample],
    batch_size: usize,
    scale_crop: f32,
) -> TrainResult<EvalMetrics> {
    if samples.is_empty() {
        return Err(TrainError::Other("validation set is empty".to_string()));
    }
    let device = <TrainBackend as Backend>::Device::default();
    let mut acc = MetricAccumulator::default();
    for chunk in samples.chunks(batch_size.max(1)) {
        let batch = collate::<TrainBackend>(chunk, &device)?;
        let probs = sigmoid(model.forward(batch.images));
        let probs_vec = probs.into_data().to_vec::<f32>().map_err(|_| {
            TrainError::Other("failed to read predictions back from the backend".to_string())
        })?;
        let (width, height) = (chunk[0].width as usize, chunk[0].height as usize);
        let frame = height * width;
        for (i, sample) in chunk.iter().enumerate() {
            acc.add(
                &probs_vec[i * frame..(i + 1) * frame],
                &sample.mask,
                width,
                height,
                scale_crop,
            );
        }
    }
    Ok(acc.finish())
}

#[derive(Default)]
struct MetricAccumulator {
    loss_sum: f64,
    loss_count: f64,
    crop_loss_sum: f64,
    crop_loss_count: f64,
    intersection: f64,
    cardinality: f64,
    crop_intersection: f64,
    crop_cardinality: f64,
}

impl MetricAccumulator {
    fn add(&mut self, probs: &[f32], mask: &[f32], width: usize, height: usize, scale: f32) {
        let (x0, x1, y0, y1) = center_window(width, height, scale);
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let p = probs[idx].clamp(1e-6, 1.0 - 1e-6);
                let t = mask[idx];
                let bce = -(t * p.ln() + (1.0 - t) * (1.0 - p).ln()) as f64;
                let pred = if probs[idx] > 0.5 { 1.0 } else { 0.0 };
                let target = t as f64;

                self.loss_sum += bce;
                self.loss_count += 1.0;
                self.intersection += pred * target;
                self.cardinality += pred + target;
                if x >= x0 && x < x1 && y >= y0 && y < y1 {
                    self.crop_loss_sum += bce;
                    self.crop_loss_count += 1.0;
                    self.crop_intersection += pred * target;
                    self.crop_cardinality += pred + target;
                }
            }
        }
    }

    fn finish(self) -> EvalMetrics {
        EvalMetrics {
            loss: (self.loss_sum / self.loss_count.max(1.0)) as f32,
            loss_crop: (self.crop_loss_sum / self.crop_loss_count.max(1.0)) as f32,
            dice: dice_of(self.intersection, self.cardinality),
            dice_crop: dice_of(self.crop_intersection, self.crop_cardinality),
        }
    }
}

fn dice_of(intersection: f64, cardinality: f64) -> f32 {
    if cardinality <= 0.0 {
        // Both prediction and target empty: perfect agreement.
        1.0
    } else {
        (2.0 * intersection / cardinality) as f32
    }
}

/// Centered window with sides `1/scale` of the frame.
fn center_window(width: usize, height: usize, scale: f32) -> (usize, usize, usize, usize) {
    let scale = scale.max(1.0);
    let crop_w = ((width as f32 / scale).round() as usize).clamp(1, width);
    let crop_h = ((height as f32 / scale).round() as usize).clamp(1, height);
    let x0 = (width - crop_w) / 2;
    let y0 = (height - crop_h) / 2;
    (x0, x0 + crop_w, y0, y0 + crop_h)
}

fn persist_run(
    model_dir: &Path,
    model: &UNet<ADBackend>,
    eval_model: &UNet<TrainBackend>,
    history: &History,
    config: &TrainConfig,
    val: &[SegSample],
) -> TrainResult<()> {
    fs::create_dir_all(model_dir).map_err(|e| TrainError::Io {
        path: model_dir.to_path_buf(),
        source: e,
    })?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(model_dir.join("unet.bin"), &recorder)
        .map_err(|e| TrainError::Checkpoint(format!("failed to save checkpoint: {e}")))?;

    let history_path = model_dir.join("history.json");
    let data = serde_json::to_vec_pretty(history).map_err(|e| TrainError::Other(e.to_string()))?;
    fs::write(&history_path, data).map_err(|e| TrainError::Io {
        path: history_path,
        source: e,
    })?;

    let config_path = model_dir.join("config.json");
    let data = serde_json::to_vec_pretty(config).map_err(|e| TrainError::Other(e.to_string()))?;
    fs::write(&config_path, data).map_err(|e| TrainError::Io {
        path: config_path,
        source: e,
    })?;

    if config.save_fig {
        save_predictions(model_dir, eval_model, val)?;
    }
    Ok(())
}

/// Write up to three validation probability maps as grayscale images.
fn save_predictions(
    model_dir: &Path,
    model: &UNet<TrainBackend>,
    samples: &[SegSample],
) -> TrainResult<()> {
    let device = <TrainBackend as Backend>::Device::default();
    for (i, sample) in samples.iter().take(3).enumerate() {
        let batch = collate::<TrainBackend>(std::slice::from_ref(sample), &device)?;
        let probs = sigmoid(model.forward(batch.images));
        let probs_vec = probs.into_data().to_vec::<f32>().map_err(|_| {
            TrainError::Other("failed to read predictions back from the backend".to_string())
        })?;
        let mut img = image::GrayImage::new(sample.width, sample.height);
        for (pixel, &value) in img.pixels_mut().zip(probs_vec.iter()) {
            pixel.0 = [(value.clamp(0.0, 1.0) * 255.0) as u8];
        }
        let path = model_dir.join(format!("val_pred_{i}.png"));
        img.save(&path)
            .map_err(|e| TrainError::Image { path, source: e })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_window_covers_a_quarter_per_side_at_scale_four() {
        let (x0, x1, y0, y1) = center_window(64, 64, 4.0);
        assert_eq!((x1 - x0, y1 - y0), (16, 16));
        assert_eq!((x0, y0), (24, 24));
    }

    #[test]
    fn center_window_never_collapses() {
        let (x0, x1, y0, y1) = center_window(3, 3, 100.0);
        assert_eq!((x1 - x0, y1 - y0), (1, 1));
        assert!(x0 < 3 && y0 < 3);
    }

    #[test]
    fn dice_of_empty_sets_is_perfect() {
        assert_eq!(dice_of(0.0, 0.0), 1.0);
        assert_eq!(dice_of(2.0, 4.0), 1.0);
        assert_eq!(dice_of(0.0, 4.0), 0.0);
    }
}
