use clap::Parser;
use std::path::PathBuf;

use training::sweep::reduce_history;
use training::{run_train, TrainConfig, UNetConfig};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train the segmentation UNet once over a configuration"
)]
struct TrainArgs {
    /// Dataset root containing images/ and masks/.
    #[arg(long, default_value = "data/annotated")]
    data_dir: PathBuf,
    /// Input-channel specifier, a subset of RGB (e.g. R or RG).
    #[arg(long, default_value = "R")]
    input_channels: String,
    /// Number of epochs.
    #[arg(long, default_value_t = 10)]
    epochs: usize,
    /// Batch size.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Learning rate.
    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,
    /// Random seed.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Encoder depth.
    #[arg(long, default_value_t = 4)]
    depth: usize,
    /// Channel width of the first encoder stage.
    #[arg(long, default_value_t = 16)]
    out1_channels: usize,
    /// Disable batch normalization.
    #[arg(long, default_value_t = false)]
    no_batchnorm: bool,
    /// Apply flip/noise augmentation to training samples.
    #[arg(long, default_value_t = false)]
    data_aug: bool,
    /// Mix this fraction of synthetic samples into the training set.
    #[arg(long)]
    synthetic_ratio: Option<f32>,
    /// Train purely on generated samples (no dataset required).
    #[arg(long, default_value_t = false)]
    synthetic_only: bool,
    /// Scale factor of the centered metric window.
    #[arg(long, default_value_t = 4.0)]
    scale_crop: f32,
    /// Weight foreground pixels double in the loss.
    #[arg(long, default_value_t = false)]
    use_masks: bool,
    /// Evaluate a held-out test split after training.
    #[arg(long, default_value_t = false)]
    eval_test: bool,
    /// Directory for checkpoint/history output.
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Also write validation-probability images to the model directory.
    #[arg(long, default_value_t = false)]
    save_fig: bool,
    /// Print per-epoch validation metrics.
    #[arg(long, default_value_t = false)]
    verbose: bool,
    /// Print per-epoch wall-clock times.
    #[arg(long, default_value_t = false)]
    timeit: bool,
}

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    let config = TrainConfig {
        batch_size: args.batch_size,
        data_aug: args.data_aug,
        input_channels: args.input_channels,
        learning_rate: args.learning_rate,
        model_dir: args.model_dir,
        save_fig: args.save_fig,
        scale_crop: args.scale_crop,
        seed: args.seed,
        synthetic_data: args.synthetic_ratio.is_some(),
        synthetic_only: args.synthetic_only,
        synthetic_ratio: args.synthetic_ratio,
        use_masks: args.use_masks,
        eval_test: args.eval_test,
        verbose: args.verbose,
        timeit: args.timeit,
        ..TrainConfig::baseline(args.epochs, args.data_dir)
    };
    let model = UNetConfig::new(config.channel_count())
        .with_depth(args.depth)
        .with_out1_channels(args.out1_channels)
        .with_batchnorm(!args.no_batchnorm);

    let history = run_train(&config, model)?;
    let summary = reduce_history(&history, config.scale_crop)?;
    println!(
        "best epoch {}: loss={:.6} - lossC{:.1}={:.6} - dice={:.6} - diC{:.1}={:.6}",
        summary.best_epoch,
        summary.val_loss,
        config.scale_crop,
        summary.val_loss_crop,
        summary.val_dice,
        config.scale_crop,
        summary.val_dice_crop
    );
    Ok(())
}
