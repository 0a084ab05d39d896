use burn::tensor::Tensor;
use models::{UNet, UNetConfig};

type Backend = burn_ndarray::NdArray<f32>;

#[test]
fn unet_forward_preserves_spatial_shape() {
    let device = Default::default();
    let cfg = UNetConfig::new(2)
        .with_depth(2)
        .with_out1_channels(4)
        .with_batchnorm(true);
    let model = UNet::<Backend>::new(cfg, &device);

    let input = Tensor::<Backend, 4>::zeros([1, 2, 16, 16], &device);
    let output = model.forward(input);
    assert_eq!(output.dims(), [1, 1, 16, 16]);
}

#[test]
fn unet_forward_without_batchnorm() {
    let device = Default::default();
    let cfg = UNetConfig::new(1)
        .with_depth(3)
        .with_out1_channels(2)
        .with_batchnorm(false);
    let model = UNet::<Backend>::new(cfg, &device);

    let input = Tensor::<Backend, 4>::zeros([2, 1, 32, 32], &device);
    let output = model.forward(input);
    assert_eq!(output.dims(), [2, 1, 32, 32]);
}
