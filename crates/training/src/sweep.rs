//! Grid-search driver: enumerate configuration variants, train each one, and
//! report best-epoch validation metrics.
//!
//! The sweep is strictly sequential: runs share the compute device, and each
//! run builds a fresh model, so one run completes (or fails) before the next
//! begins. Resource exhaustion in a run is reported inline and the sweep
//! continues; any other error aborts it, and the duration footer is then not
//! printed. TODO: print the footer on fatal termination too; the current
//! structure cannot, since only the resource-exhaustion class is intercepted.

use chrono::Local;
use models::UNetConfig;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::config::TrainConfig;
use crate::error::TrainError;
use crate::history::History;

/// Sweep axes plus the per-run epoch count. Outer axis: channel specifiers;
/// inner axis: synthetic mixing ratios. Order is significant only for the
/// log, and both axes iterate in declaration order.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub input_channels: Vec<String>,
    pub synthetic_ratios: Vec<f32>,
    pub epochs: usize,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            input_channels: vec!["R".to_string(), "RG".to_string()],
            synthetic_ratios: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            epochs: 10,
        }
    }
}

/// Boundary to the training collaborator.
///
/// Returning `TrainError::ResourceExhausted` marks the one recoverable
/// failure; every other error aborts the whole sweep.
pub trait Trainer {
    fn run(&mut self, config: &TrainConfig, model: UNetConfig) -> Result<History, TrainError>;
}

/// Best-epoch reduction of one run's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub best_epoch: usize,
    pub val_loss: f32,
    pub val_loss_crop: f32,
    pub val_dice: f32,
    pub val_dice_crop: f32,
}

/// Resolve the best validation-dice epoch and read the four reported metrics
/// at that epoch index.
pub fn reduce_history(history: &History, scale_crop: f32) -> Result<RunSummary, TrainError> {
    let best_epoch = history
        .best_epoch("val_dice")
        .ok_or_else(|| TrainError::Other("history is missing the val_dice series".to_string()))?;
    let value = |metric: &str| {
        history.value_at(metric, best_epoch).ok_or_else(|| {
            TrainError::Other(format!("history is missing {metric}[{best_epoch}]"))
        })
    };
    Ok(RunSummary {
        best_epoch,
        val_loss: value("val_loss")?,
        val_loss_crop: value(&History::crop_key("val_loss", scale_crop))?,
        val_dice: value("val_dice")?,
        val_dice_crop: value(&History::crop_key("val_di", scale_crop))?,
    })
}

/// Run the full grid: for each channel specifier, for each synthetic ratio,
/// train once and print one line. Output goes through `out` so the driver can
/// be exercised against a scripted trainer; the binary passes stdout.
pub fn run_sweep<T, W>(
    base: &TrainConfig,
    plan: &SweepPlan,
    trainer: &mut T,
    out: &mut W,
) -> anyhow::Result<()>
where
    T: Trainer,
    W: Write,
{
    writeln!(
        out,
        "Starting on {}\n\nResults over validation data ({} epochs):\n",
        timestamp(),
        plan.epochs
    )?;
    if base.data_aug {
        writeln!(out, "Data augmentation is enabled.\n")?;
    }
    let start = Instant::now();

    for (section, channels) in plan.input_channels.iter().enumerate() {
        if section > 0 {
            writeln!(out)?;
        }
        writeln!(out, "Input channels: {channels}")?;
        let section_base = base.clone().with_input_channels(channels.clone());

        for &ratio in &plan.synthetic_ratios {
            let config = section_base.clone().with_synthetic_ratio(Some(ratio));
            write!(out, "synth_ratio={:<4}", format_ratio(ratio))?;
            out.flush()?;

            match trainer.run(&config, model_spec_for(&config)) {
                Ok(history) => {
                    let summary = reduce_history(&history, config.scale_crop)?;
                    writeln!(
                        out,
                        " | loss={:.6} - lossC{:.1}={:.6} - dice={:.6} - diC{:.1}={:.6}",
                        summary.val_loss,
                        config.scale_crop,
                        summary.val_loss_crop,
                        summary.val_dice,
                        config.scale_crop,
                        summary.val_dice_crop
                    )?;
                }
                Err(TrainError::ResourceExhausted { message }) => {
                    writeln!(out, " | ResourceExhausted ({message})")?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    writeln!(out, "\nEnding on {}", timestamp())?;
    writeln!(out, "Script duration: {}.", format_duration(start.elapsed()))?;
    Ok(())
}

/// Model instantiated fresh for every sweep point: input width follows the
/// channel specifier, the rest is fixed across the grid.
fn model_spec_for(config: &TrainConfig) -> UNetConfig {
    UNetConfig::new(config.channel_count())
        .with_depth(4)
        .with_out1_channels(16)
        .with_batchnorm(true)
}

fn timestamp() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// `{hours}h {minutes:02}min {seconds:02}s`.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{}h {:02}min {:02}s",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}

fn format_ratio(ratio: f32) -> String {
    // Debug keeps the decimal point on round values (`0.0`, not `0`).
    format!("{ratio:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_for(best: &[(f32, f32, f32, f32)]) -> History {
        let mut history = History::new();
        for &(loss, loss_crop, dice, dice_crop) in best {
            history.push("val_loss", loss);
            history.push("val_lossC4.0", loss_crop);
            history.push("val_dice", dice);
            history.push("val_diC4.0", dice_crop);
        }
        history
    }

    #[test]
    fn reduction_reads_every_metric_at_the_best_dice_epoch() {
        let history = history_for(&[
            (0.9, 0.8, 0.1, 0.05),
            (0.5, 0.4, 0.5, 0.25),
            (0.7, 0.6, 0.3, 0.15),
        ]);
        let summary = reduce_history(&history, 4.0).unwrap();
        assert_eq!(summary.best_epoch, 1);
        assert_eq!(summary.val_loss, 0.5);
        assert_eq!(summary.val_loss_crop, 0.4);
        assert_eq!(summary.val_dice, 0.5);
        assert_eq!(summary.val_dice_crop, 0.25);
    }

    #[test]
    fn reduction_of_an_incomplete_history_is_fatal() {
        let mut history = History::new();
        history.push("val_dice", 0.4);
        let err = reduce_history(&history, 4.0).unwrap_err();
        assert!(matches!(err, TrainError::Other(_)));
    }

    #[test]
    fn model_spec_follows_the_channel_specifier() {
        let config =
            TrainConfig::baseline(1, std::path::PathBuf::new()).with_input_channels("RG");
        let spec = model_spec_for(&config);
        assert_eq!(spec.in_channels, 2);
        assert_eq!(spec.depth, 4);
        assert_eq!(spec.out1_channels, 16);
        assert!(spec.batchnorm);
    }

    #[test]
    fn durations_format_as_hours_minutes_seconds() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0h 00min 00s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 02min 03s");
        assert_eq!(format_duration(Duration::from_secs(7322)), "2h 02min 02s");
    }

    #[test]
    fn ratios_keep_their_decimal_point() {
        assert_eq!(format_ratio(0.0), "0.0");
        assert_eq!(format_ratio(0.25), "0.25");
        assert_eq!(format_ratio(1.0), "1.0");
    }
}
