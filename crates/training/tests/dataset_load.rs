use std::fs;
use std::path::Path;

use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};
use tempfile::tempdir;
use training::dataset::load_dir;
use training::TrainError;

/// Write an 8x8 image with fixed channel values and a mask whose left half is
/// foreground.
fn write_sample(root: &Path, name: &str) -> Result<()> {
    let images = root.join("images");
    let masks = root.join("masks");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&masks)?;

    let mut img = RgbImage::new(8, 8);
    for pixel in img.pixels_mut() {
        *pixel = Rgb([200, 100, 50]);
    }
    img.save(images.join(name))?;

    let mut mask = GrayImage::new(8, 8);
    for (x, _y, pixel) in mask.enumerate_pixels_mut() {
        pixel.0 = [if x < 4 { 255 } else { 0 }];
    }
    mask.save(masks.join(name))?;
    Ok(())
}

#[test]
fn loads_image_mask_pairs_with_channel_selection() -> Result<()> {
    let temp = tempdir()?;
    write_sample(temp.path(), "frame_000.png")?;
    write_sample(temp.path(), "frame_001.png")?;

    let red_only = load_dir(temp.path(), &[0], 4)?;
    assert_eq!(red_only.len(), 2);
    assert_eq!(red_only[0].channels, 1);
    assert_eq!(red_only[0].image_chw.len(), 64);
    assert!(red_only[0]
        .image_chw
        .iter()
        .all(|&v| (v - 200.0 / 255.0).abs() < 1e-6));
    assert_eq!(red_only[0].mask.len(), 64);
    assert!(red_only[0].mask.iter().all(|&v| v == 0.0 || v == 1.0));
    assert_eq!(red_only[0].mask.iter().filter(|&&v| v == 1.0).count(), 32);

    let red_green = load_dir(temp.path(), &[0, 1], 4)?;
    assert_eq!(red_green[0].channels, 2);
    assert_eq!(red_green[0].image_chw.len(), 128);
    // Second plane carries the green values.
    assert!((red_green[0].image_chw[64] - 100.0 / 255.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn a_missing_mask_is_an_error() -> Result<()> {
    let temp = tempdir()?;
    write_sample(temp.path(), "frame_000.png")?;
    fs::remove_file(temp.path().join("masks/frame_000.png"))?;

    let err = load_dir(temp.path(), &[0], 4).unwrap_err();
    assert!(matches!(err, TrainError::MissingMask { .. }));
    Ok(())
}

#[test]
fn a_missing_dataset_directory_is_an_io_error() {
    let err = load_dir(Path::new("does/not/exist"), &[0], 4).unwrap_err();
    assert!(matches!(err, TrainError::Io { .. }));
}

#[test]
fn dimensions_off_the_pooling_grid_are_rejected() -> Result<()> {
    let temp = tempdir()?;
    write_sample(temp.path(), "frame_000.png")?;

    // 8x8 frames cannot feed an encoder that pools four times.
    let err = load_dir(temp.path(), &[0], 16).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
    Ok(())
}
