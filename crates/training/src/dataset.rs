//! Sample loading, train/val/test splitting, and batch assembly.

use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{TrainError, TrainResult};

/// One segmentation sample: selected channel planes and a binary mask.
#[derive(Debug, Clone)]
pub struct SegSample {
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    /// Mask in HW layout, values in {0.0, 1.0}.
    pub mask: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

/// Collated image/mask tensors for one batch.
#[derive(Debug)]
pub struct SegBatch<B: Backend> {
    /// Shape `[batch, channels, height, width]`.
    pub images: Tensor<B, 4>,
    /// Shape `[batch, 1, height, width]`.
    pub masks: Tensor<B, 4>,
}

/// Deterministically shuffled train/val(/test) subsets of one dataset.
#[derive(Debug, Clone, Default)]
pub struct SplitSets {
    pub train: Vec<SegSample>,
    pub val: Vec<SegSample>,
    pub test: Vec<SegSample>,
}

/// Load every image under `data_dir/images` with its same-named mask under
/// `data_dir/masks`, keeping only the RGB planes named by `channel_indices`.
/// All images in a dataset must share dimensions, and each side must be a
/// multiple of `spatial_multiple` (the model's pooling stride, `2^depth`).
pub fn load_dir(
    data_dir: &Path,
    channel_indices: &[usize],
    spatial_multiple: u32,
) -> TrainResult<Vec<SegSample>> {
    let spatial_multiple = spatial_multiple.max(1);
    let images_dir = data_dir.join("images");
    let masks_dir = data_dir.join("masks");

    let mut paths: Vec<PathBuf> = fs::read_dir(&images_dir)
        .map_err(|e| TrainError::Io {
            path: images_dir.clone(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("png") | Some("tif") | Some("tiff")
            )
        })
        .collect();
    paths.sort();

    let mut samples = Vec::with_capacity(paths.len());
    let mut expected: Option<(u32, u32)> = None;
    for img_path in paths {
        let file_name = img_path
            .file_name()
            .ok_or_else(|| TrainError::Other(format!("unreadable file name {img_path:?}")))?;
        let mask_path = masks_dir.join(file_name);
        if !mask_path.exists() {
            return Err(TrainError::MissingMask { path: img_path });
        }

        let img = image::open(&img_path)
            .map_err(|e| TrainError::Image {
                path: img_path.clone(),
                source: e,
            })?
            .to_rgb8();
        let (width, height) = img.dimensions();
        if width % spatial_multiple != 0 || height % spatial_multiple != 0 {
            return Err(TrainError::Config(format!(
                "image dimensions {width}x{height} at {} are not a multiple of {spatial_multiple}",
                img_path.display()
            )));
        }
        match expected {
            None => expected = Some((width, height)),
            Some(size) if size != (width, height) => {
                return Err(TrainError::Other(format!(
                    "image dimensions differ within dataset: {} is {width}x{height}, expected {}x{}",
                    img_path.display(),
                    size.0,
                    size.1
                )));
            }
            _ => {}
        }

        let mask_img = image::open(&mask_path)
            .map_err(|e| TrainError::Image {
                path: mask_path.clone(),
                source: e,
            })?
            .to_luma8();
        if mask_img.dimensions() != (width, height) {
            return Err(TrainError::Other(format!(
                "mask dimensions differ from image for {}",
                img_path.display()
            )));
        }

        let mut image_chw =
            Vec::with_capacity(channel_indices.len() * width as usize * height as usize);
        for &plane in channel_indices {
            for y in 0..height {
                for x in 0..width {
                    image_chw.push(img.get_pixel(x, y)[plane] as f32 / 255.0);
                }
            }
        }
        let mask = mask_img
            .as_raw()
            .iter()
            .map(|&v| if v > 127 { 1.0 } else { 0.0 })
            .collect();

        samples.push(SegSample {
            image_chw,
            mask,
            width,
            height,
            channels: channel_indices.len(),
        });
    }
    Ok(samples)
}

/// Shuffle and split: 20% validation, plus a 10% test slice when requested.
/// Small datasets keep at least one sample per populated subset.
pub fn split(mut samples: Vec<SegSample>, rng: &mut StdRng, with_test: bool) -> SplitSets {
    samples.shuffle(rng);
    let n = samples.len();
    let mut n_val = n / 5;
    if n >= 2 && n_val == 0 {
        n_val = 1;
    }
    let mut n_test = if with_test { n / 10 } else { 0 };
    if with_test && n >= 3 && n_test == 0 {
        n_test = 1;
    }
    let n_train = n.saturating_sub(n_val + n_test);
    let test = samples.split_off(n_train + n_val);
    let val = samples.split_off(n_train);
    SplitSets {
        train: samples,
        val,
        test,
    }
}

/// Assemble one batch of uniformly shaped samples into backend tensors.
/// The host staging buffers are reserved fallibly: an allocation failure here
/// is the recoverable out-of-memory class, not a crash.
pub fn collate<B: Backend>(samples: &[SegSample], device: &B::Device) -> TrainResult<SegBatch<B>> {
    let first = samples
        .first()
        .ok_or_else(|| TrainError::Other("cannot collate an empty batch".to_string()))?;
    let (width, height, channels) = (first.width as usize, first.height as usize, first.channels);

    let mut image_buf: Vec<f32> = Vec::new();
    let mut mask_buf: Vec<f32> = Vec::new();
    reserve_exact(&mut image_buf, samples.len() * channels * height * width)?;
    reserve_exact(&mut mask_buf, samples.len() * height * width)?;

    for sample in samples {
        if (sample.width as usize, sample.height as usize, sample.channels)
            != (width, height, channels)
        {
            return Err(TrainError::Other(
                "batch contains varying sample shapes".to_string(),
            ));
        }
        image_buf.extend_from_slice(&sample.image_chw);
        mask_buf.extend_from_slice(&sample.mask);
    }

    let images = Tensor::<B, 1>::from_floats(image_buf.as_slice(), device).reshape([
        samples.len(),
        channels,
        height,
        width,
    ]);
    let masks = Tensor::<B, 1>::from_floats(mask_buf.as_slice(), device).reshape([
        samples.len(),
        1,
        height,
        width,
    ]);
    Ok(SegBatch { images, masks })
}

fn reserve_exact(buf: &mut Vec<f32>, additional: usize) -> TrainResult<()> {
    buf.try_reserve_exact(additional)
        .map_err(|e| TrainError::ResourceExhausted {
            message: format!("failed to reserve {additional} batch elements: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample(tag: f32) -> SegSample {
        SegSample {
            image_chw: vec![tag; 4],
            mask: vec![0.0; 4],
            width: 2,
            height: 2,
            channels: 1,
        }
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let samples: Vec<SegSample> = (0..10).map(|i| sample(i as f32)).collect();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = split(samples.clone(), &mut rng_a, false);
        let b = split(samples, &mut rng_b, false);
        assert_eq!(a.train.len(), 8);
        assert_eq!(a.val.len(), 2);
        assert!(a.test.is_empty());
        let order = |sets: &SplitSets| {
            sets.train
                .iter()
                .map(|s| s.image_chw[0])
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&a), order(&b));
    }

    #[test]
    fn split_keeps_every_subset_populated_when_possible() {
        let samples: Vec<SegSample> = (0..3).map(|i| sample(i as f32)).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let sets = split(samples, &mut rng, true);
        assert_eq!(sets.train.len(), 1);
        assert_eq!(sets.val.len(), 1);
        assert_eq!(sets.test.len(), 1);
    }

    #[test]
    fn collate_rejects_an_empty_batch() {
        let device = Default::default();
        let err = collate::<burn_ndarray::NdArray<f32>>(&[], &device).unwrap_err();
        assert!(matches!(err, TrainError::Other(_)));
    }
}
