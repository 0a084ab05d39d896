use clap::Parser;
use std::io;
use std::path::PathBuf;

use training::settings::SweepSettings;
use training::sweep::{run_sweep, SweepPlan};
use training::{BurnTrainer, TrainConfig};

#[derive(Parser, Debug)]
#[command(
    name = "gridsearch",
    about = "Grid-search over synthetic-data ratios and input channels"
)]
struct Args {
    /// Epochs per sweep point.
    #[arg(long)]
    epochs: Option<usize>,
    /// Input-channel specifiers for the outer axis (e.g. R RG).
    #[arg(long, num_args = 1..)]
    input_channels: Option<Vec<String>>,
    /// Synthetic mixing ratios for the inner axis.
    #[arg(long, num_args = 1.., value_name = "RATIO")]
    synthetic_ratios: Option<Vec<f32>>,
    /// Dataset root containing images/ and masks/.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Train purely on generated samples (no dataset required).
    #[arg(long, default_value_t = false)]
    synthetic_only: bool,
    /// Batch size.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Learning rate.
    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,
    /// Random seed shared by every sweep point.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = SweepSettings::load();

    let plan = SweepPlan {
        input_channels: args.input_channels.unwrap_or(settings.input_channels),
        synthetic_ratios: args.synthetic_ratios.unwrap_or(settings.synthetic_ratios),
        epochs: args.epochs.unwrap_or(settings.epochs),
    };
    let base = TrainConfig::baseline(plan.epochs, args.data_dir.unwrap_or(settings.data_dir))
        .with_batch_size(args.batch_size)
        .with_learning_rate(args.learning_rate)
        .with_seed(args.seed)
        .with_synthetic_only(args.synthetic_only)
        .with_model_dir(settings.model_dir)
        .with_synthetic_data(true)
        .with_data_aug(true);

    let mut trainer = BurnTrainer;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_sweep(&base, &plan, &mut trainer, &mut out)
}
