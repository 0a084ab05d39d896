//! Burn segmentation models.
//!
//! This crate defines the network used for pixelwise segmentation:
//! - `UNet`: encoder/decoder with skip connections and a single-logit head.
//!
//! It is a pure Burn Module with no awareness of the training loop. The
//! `training` crate owns datasets, losses, and optimization.
//!
//! Shapes:
//! - Input images: `[B, C, H, W]` with `H`/`W` divisible by `2^depth`
//! - Output logits: `[B, 1, H, W]`

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Tensor};

/// Configuration for `UNet`; doubles as its factory (`UNet::new`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UNetConfig {
    /// Number of image channels fed to the first convolution.
    pub in_channels: usize,
    /// Number of pooling levels in the encoder.
    pub depth: usize,
    /// Channel width of the first encoder stage; doubles per level.
    pub out1_channels: usize,
    /// Insert batch normalization after each convolution.
    pub batchnorm: bool,
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            depth: 4,
            out1_channels: 16,
            batchnorm: true,
        }
    }
}

impl UNetConfig {
    pub fn new(in_channels: usize) -> Self {
        Self {
            in_channels,
            ..Default::default()
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_out1_channels(mut self, out1_channels: usize) -> Self {
        self.out1_channels = out1_channels;
        self
    }

    pub fn with_batchnorm(mut self, batchnorm: bool) -> Self {
        self.batchnorm = batchnorm;
        self
    }
}

/// Two 3x3 same-padding convolutions, each optionally batch-normalized.
#[derive(Module, Debug)]
struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    norm1: Option<BatchNorm<B, 2>>,
    norm2: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, batchnorm: bool, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let norm1 = batchnorm.then(|| BatchNormConfig::new(out_channels).init(device));
        let norm2 = batchnorm.then(|| BatchNormConfig::new(out_channels).init(device));
        Self {
            conv1,
            conv2,
            norm1,
            norm2,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv1.forward(input);
        if let Some(norm) = &self.norm1 {
            x = norm.forward(x);
        }
        let mut x = relu(x);
        x = self.conv2.forward(x);
        if let Some(norm) = &self.norm2 {
            x = norm.forward(x);
        }
        relu(x)
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoders: Vec<ConvBlock<B>>,
    pool: MaxPool2d,
    bottleneck: ConvBlock<B>,
    upsamples: Vec<ConvTranspose2d<B>>,
    decoders: Vec<ConvBlock<B>>,
    head: Conv2d<B>,
}

impl<B: Backend> UNet<B> {
    pub fn new(cfg: UNetConfig, device: &B::Device) -> Self {
        let depth = cfg.depth.max(1);
        let width = |level: usize| cfg.out1_channels.max(1) << level;

        let mut encoders = Vec::with_capacity(depth);
        for level in 0..depth {
            let input = if level == 0 {
                cfg.in_channels.max(1)
            } else {
                width(level - 1)
            };
            encoders.push(ConvBlock::new(input, width(level), cfg.batchnorm, device));
        }
        let bottleneck = ConvBlock::new(width(depth - 1), width(depth), cfg.batchnorm, device);

        let mut upsamples = Vec::with_capacity(depth);
        let mut decoders = Vec::with_capacity(depth);
        for level in (0..depth).rev() {
            upsamples.push(
                ConvTranspose2dConfig::new([width(level + 1), width(level)], [2, 2])
                    .with_stride([2, 2])
                    .init(device),
            );
            decoders.push(ConvBlock::new(
                width(level) * 2,
                width(level),
                cfg.batchnorm,
                device,
            ));
        }

        let head = Conv2dConfig::new([width(0), 1], [1, 1])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        Self {
            encoders,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            bottleneck,
            upsamples,
            decoders,
            head,
        }
    }

    /// Forward pass returning per-pixel logits `[B, 1, H, W]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = input;
        for encoder in &self.encoders {
            let features = encoder.forward(x);
            skips.push(features.clone());
            x = self.pool.forward(features);
        }
        x = self.bottleneck.forward(x);
        for (upsample, decoder) in self.upsamples.iter().zip(self.decoders.iter()) {
            let skip = skips.pop().expect("one skip per decoder level");
            x = upsample.forward(x);
            x = Tensor::cat(vec![skip, x], 1);
            x = decoder.forward(x);
        }
        self.head.forward(x)
    }
}

pub mod prelude {
    pub use super::{UNet, UNetConfig};
}
