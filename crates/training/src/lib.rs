pub mod config;
pub mod dataset;
pub mod error;
pub mod history;
pub mod run;
pub mod settings;
pub mod sweep;
pub mod synth;

pub use config::TrainConfig;
pub use error::{TrainError, TrainResult};
pub use history::History;
pub use models::{UNet, UNetConfig};
pub use run::{run_train, BurnTrainer};
pub use sweep::{run_sweep, SweepPlan, Trainer};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
