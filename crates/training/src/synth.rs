//! Procedural synthetic samples and training-set mixing.
//!
//! Synthetic frames approximate the fluorescence recordings: a handful of
//! soft elliptical structures over low-amplitude background noise, with the
//! mask covering the structures. Secondary channels carry an attenuated copy
//! of the structure, as the green channel does in the real recordings.

use rand::rngs::StdRng;
use rand::Rng;

use crate::dataset::SegSample;

#[derive(Debug, Clone, Copy)]
pub struct SynthSpec {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

impl SynthSpec {
    pub fn new(channels: usize) -> Self {
        Self {
            width: 64,
            height: 64,
            channels,
        }
    }

    /// Geometry matching an existing sample, for in-place mixing.
    pub fn from_sample(sample: &SegSample) -> Self {
        Self {
            width: sample.width,
            height: sample.height,
            channels: sample.channels,
        }
    }
}

/// Generate one synthetic sample. Fully determined by the RNG state.
pub fn generate(rng: &mut StdRng, spec: &SynthSpec) -> SegSample {
    let (width, height) = (spec.width as usize, spec.height as usize);
    let mut signal = vec![0.0f32; height * width];
    let mut mask = vec![0.0f32; height * width];

    let structures = rng.random_range(1..=4);
    for _ in 0..structures {
        let cx = rng.random_range(0.15..0.85) * width as f32;
        let cy = rng.random_range(0.15..0.85) * height as f32;
        let rx = (rng.random_range(0.04..0.18) * width as f32).max(1.0);
        let ry = (rng.random_range(0.04..0.18) * height as f32).max(1.0);
        let peak = rng.random_range(0.6..1.0);
        for y in 0..height {
            for x in 0..width {
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                let d2 = dx * dx + dy * dy;
                if d2 <= 1.0 {
                    let idx = y * width + x;
                    signal[idx] = signal[idx].max(peak * (1.0 - 0.5 * d2));
                    mask[idx] = 1.0;
                }
            }
        }
    }

    let mut image_chw = Vec::with_capacity(spec.channels * height * width);
    for channel in 0..spec.channels {
        let gain = if channel == 0 { 1.0 } else { 0.5 };
        for &value in &signal {
            let noise = rng.random_range(0.0..0.15);
            image_chw.push((value * gain + noise).min(1.0));
        }
    }

    SegSample {
        image_chw,
        mask,
        width: spec.width,
        height: spec.height,
        channels: spec.channels,
    }
}

pub fn generate_set(rng: &mut StdRng, spec: &SynthSpec, count: usize) -> Vec<SegSample> {
    (0..count).map(|_| generate(rng, spec)).collect()
}

/// Replace a `floor(ratio * n)` prefix of the (already shuffled) training set
/// with synthetic samples of matching geometry. `ratio = 1.0` replaces the
/// whole set.
pub fn mix_synthetic(train: &mut [SegSample], ratio: f32, rng: &mut StdRng) {
    let Some(first) = train.first() else {
        return;
    };
    let spec = SynthSpec::from_sample(first);
    let replaced = ((train.len() as f32) * ratio.clamp(0.0, 1.0)).floor() as usize;
    for slot in train.iter_mut().take(replaced) {
        *slot = generate(rng, &spec);
    }
}

/// Horizontal flip (p = 0.5) plus light uniform noise.
pub fn augment(sample: &mut SegSample, rng: &mut StdRng) {
    if rng.random_range(0.0..1.0) < 0.5 {
        flip_horizontal(sample);
    }
    for value in &mut sample.image_chw {
        *value = (*value + rng.random_range(-0.02..0.02)).clamp(0.0, 1.0);
    }
}

fn flip_horizontal(sample: &mut SegSample) {
    let (width, height) = (sample.width as usize, sample.height as usize);
    for channel in 0..sample.channels {
        for y in 0..height {
            let start = (channel * height + y) * width;
            sample.image_chw[start..start + width].reverse();
        }
    }
    for y in 0..height {
        let start = y * width;
        sample.mask[start..start + width].reverse();
    }
}
