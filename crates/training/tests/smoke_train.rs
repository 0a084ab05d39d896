use std::path::PathBuf;

use anyhow::Result;
use training::{run_train, TrainConfig, TrainError, UNetConfig};

fn synthetic_only_config(epochs: usize) -> TrainConfig {
    TrainConfig::baseline(epochs, PathBuf::from("unused"))
        .with_synthetic_only(true)
        .with_batch_size(4)
}

#[test]
fn synthetic_only_run_produces_a_complete_history() -> Result<()> {
    let config = synthetic_only_config(2);
    let model = UNetConfig::new(1)
        .with_depth(2)
        .with_out1_channels(4)
        .with_batchnorm(true);

    let history = run_train(&config, model)?;

    for key in ["loss", "val_loss", "val_lossC4.0", "val_dice", "val_diC4.0"] {
        let series = history
            .get(key)
            .unwrap_or_else(|| panic!("missing series {key}"));
        assert_eq!(series.len(), 2, "series {key} should have one entry per epoch");
        assert!(series.iter().all(|v| v.is_finite()));
    }
    let dice = history.get("val_dice").expect("val_dice");
    assert!(dice.iter().all(|&d| (0.0..=1.0).contains(&d)));
    Ok(())
}

#[test]
fn rejects_a_model_channel_mismatch() {
    let config = synthetic_only_config(1).with_input_channels("RG");
    let model = UNetConfig::new(1).with_depth(2).with_out1_channels(4);

    let err = run_train(&config, model).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
}
