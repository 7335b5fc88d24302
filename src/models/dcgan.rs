//! Deep convolutional GAN networks.
//!
//! Both networks go through four stride-2 stages, so image heights and widths
//! have to be multiples of 16.
use crate::config::ImageSize;
use std::borrow::Borrow;
use tch::{nn, nn::Module, nn::ModuleT, Device, Kind, Tensor};

fn conv2d<'p, P>(p: P, c_in: i64, c_out: i64) -> nn::Conv2D
where
    P: Borrow<nn::Path<'p>>,
{
    let cfg = nn::ConvConfig { stride: 2, padding: 1, ..Default::default() };
    nn::conv2d(p, c_in, c_out, 4, cfg)
}

fn tr2d<'p, P>(p: P, c_in: i64, c_out: i64) -> nn::ConvTranspose2D
where
    P: Borrow<nn::Path<'p>>,
{
    let cfg = nn::ConvTransposeConfig { stride: 2, padding: 1, ..Default::default() };
    nn::conv_transpose2d(p, c_in, c_out, 4, cfg)
}

fn leaky_relu(xs: &Tensor) -> Tensor {
    xs.maximum(&(xs * 0.2))
}

/// Maps images to the probability that they come from the training data.
#[derive(Debug)]
pub struct DcganDiscriminator {
    image_to_features: nn::SequentialT,
    features_to_prob: nn::Linear,
    img_size: ImageSize,
}

impl DcganDiscriminator {
    pub fn new<'p, P>(p: P, img_size: ImageSize, dim: i64) -> Self
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let image_to_features = nn::seq_t()
            .add(conv2d(p / "conv1", img_size.channels, dim))
            .add_fn(leaky_relu)
            .add(conv2d(p / "conv2", dim, 2 * dim))
            .add_fn(leaky_relu)
            .add(conv2d(p / "conv3", 2 * dim, 4 * dim))
            .add_fn(leaky_relu)
            .add(conv2d(p / "conv4", 4 * dim, 8 * dim))
            .add_fn(|xs| xs.sigmoid());
        let (fh, fw) = img_size.feature_sizes();
        let features_to_prob = nn::linear(p / "fc", 8 * dim * fh * fw, 1, Default::default());
        Self { image_to_features, features_to_prob, img_size }
    }

    pub fn img_size(&self) -> ImageSize {
        self.img_size
    }
}

impl ModuleT for DcganDiscriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let batch_size = xs.size()[0];
        xs.apply_t(&self.image_to_features, train)
            .view([batch_size, -1])
            .apply(&self.features_to_prob)
            .sigmoid()
    }
}

/// Maps latent vectors drawn from a standard normal distribution to images
/// with values in `[0, 1]`.
#[derive(Debug)]
pub struct DcganGenerator {
    latent_to_features: nn::Linear,
    features_to_image: nn::SequentialT,
    img_size: ImageSize,
    latent_dim: i64,
    dim: i64,
}

impl DcganGenerator {
    pub fn new<'p, P>(p: P, img_size: ImageSize, latent_dim: i64, dim: i64) -> Self
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let (fh, fw) = img_size.feature_sizes();
        let latent_to_features =
            nn::linear(p / "fc", latent_dim, 8 * dim * fh * fw, Default::default());
        let features_to_image = nn::seq_t()
            .add(tr2d(p / "tr1", 8 * dim, 4 * dim))
            .add_fn(|xs| xs.relu())
            .add(nn::batch_norm2d(p / "bn1", 4 * dim, Default::default()))
            .add(tr2d(p / "tr2", 4 * dim, 2 * dim))
            .add_fn(|xs| xs.relu())
            .add(nn::batch_norm2d(p / "bn2", 2 * dim, Default::default()))
            .add(tr2d(p / "tr3", 2 * dim, dim))
            .add_fn(|xs| xs.relu())
            .add(nn::batch_norm2d(p / "bn3", dim, Default::default()))
            .add(tr2d(p / "tr4", dim, img_size.channels))
            .add_fn(|xs| xs.sigmoid());
        Self { latent_to_features, features_to_image, img_size, latent_dim, dim }
    }

    pub fn latent_dim(&self) -> i64 {
        self.latent_dim
    }

    pub fn img_size(&self) -> ImageSize {
        self.img_size
    }

    /// Samples `num_samples` latent vectors from a standard normal distribution.
    pub fn noise(&self, num_samples: i64, device: Device) -> Tensor {
        Tensor::randn([num_samples, self.latent_dim], (Kind::Float, device))
    }
}

impl ModuleT for DcganGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let (fh, fw) = self.img_size.feature_sizes();
        self.latent_to_features
            .forward(xs)
            .relu()
            .view([-1, 8 * self.dim, fh, fw])
            .apply_t(&self.features_to_image, train)
    }
}
