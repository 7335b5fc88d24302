//! Training data: batching, the Gaussian ring and image datasets.
use crate::config::ImageSize;
use crate::error::{GanError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tch::{Device, Kind, Tensor};

/// An iterator over first-dimension slices of a tensor.
///
/// The typical use case is to iterate over batches of training samples,
/// optionally shuffled and moved to a device.
pub struct BatchIter {
    xs: Tensor,
    batch_index: i64,
    batch_size: i64,
    total_size: i64,
    device: Device,
    return_smaller_last_batch: bool,
}

impl BatchIter {
    /// Non-positive batch sizes are treated as batches of one.
    pub fn new(xs: &Tensor, batch_size: i64) -> BatchIter {
        BatchIter {
            xs: xs.shallow_clone(),
            batch_index: 0,
            batch_size: std::cmp::max(batch_size, 1),
            total_size: xs.size()[0],
            device: xs.device(),
            return_smaller_last_batch: false,
        }
    }

    pub fn shuffle(&mut self) -> &mut BatchIter {
        let index = Tensor::randperm(self.total_size, (Kind::Int64, self.xs.device()));
        self.xs = self.xs.index_select(0, &index);
        self
    }

    pub fn to_device(&mut self, device: Device) -> &mut BatchIter {
        self.device = device;
        self
    }

    pub fn return_smaller_last_batch(&mut self) -> &mut BatchIter {
        self.return_smaller_last_batch = true;
        self
    }

    /// Number of batches produced by a full pass.
    pub fn len(&self) -> i64 {
        if self.return_smaller_last_batch {
            (self.total_size + self.batch_size - 1) / self.batch_size
        } else {
            self.total_size / self.batch_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for BatchIter {
    type Item = Tensor;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.batch_index * self.batch_size;
        let size = std::cmp::min(self.batch_size, self.total_size - start);
        if size <= 0 || (!self.return_smaller_last_batch && size < self.batch_size) {
            None
        } else {
            self.batch_index += 1;
            Some(self.xs.narrow(0, start, size).to_device(self.device))
        }
    }
}

/// Samples a mixture of eight Gaussians evenly spread on the unit circle.
///
/// Component `k` (k = 1..=8) is centred at angle `k * 2pi / 8` and receives
/// `samples / 8` points with standard deviation `variance`. The returned
/// tensor has shape `[8 * (samples / 8), 2]` and is randomly permuted.
pub fn gaussian_ring(samples: i64, variance: f64, device: Device) -> Tensor {
    let per_component = samples / 8;
    let means: Vec<f32> = (1..=8)
        .flat_map(|k| {
            let angle = k as f64 * 2. * PI / 8.;
            [angle.cos() as f32, angle.sin() as f32]
        })
        .collect();
    let means = Tensor::from_slice(&means)
        .view([8, 1, 2])
        .expand([8, per_component, 2], false)
        .reshape([-1, 2])
        .to_device(device);
    let data = means + Tensor::randn([8 * per_component, 2], (Kind::Float, device)) * variance;
    let index = Tensor::randperm(8 * per_component, (Kind::Int64, device));
    data.index_select(0, &index)
}

/// Source of the real images used to train the DCGAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum DatasetSpec {
    /// Every png/jpg image found in a directory, resized to the model size.
    Folder(PathBuf),
    /// The MNIST idx files, padded from 28x28 to 32x32.
    Mnist(PathBuf),
}

const MNIST_SIDE: i64 = 28;
const MNIST_PADDED_SIDE: i64 = 32;

fn check_images(images: &Tensor, img_size: &ImageSize) -> Result<()> {
    let size = images.size();
    if size.len() != 4 || size[1..] != img_size.dims() {
        return Err(GanError::Shape(format!(
            "expected images of shape [N, {}, {}, {}], got {:?}",
            img_size.channels, img_size.height, img_size.width, size
        )));
    }
    Ok(())
}

fn load_mnist(dir: &Path) -> Result<Tensor> {
    let dataset = tch::vision::mnist::load_dir(dir)
        .map_err(|e| GanError::from(e).path_context(&dir.display().to_string()))?;
    let n = dataset.train_images.size()[0];
    let images = dataset.train_images.view([n, 1, MNIST_SIDE, MNIST_SIDE]);
    let pad = (MNIST_PADDED_SIDE - MNIST_SIDE) / 2;
    let padded_size = [n, 1, MNIST_PADDED_SIDE, MNIST_PADDED_SIDE];
    let padded = Tensor::zeros(padded_size, (Kind::Float, Device::Cpu));
    padded.narrow(2, pad, MNIST_SIDE).narrow(3, pad, MNIST_SIDE).copy_(&images);
    Ok(padded)
}

/// Loads a dataset as a `[N, C, H, W]` float tensor with values in `[0, 1]`.
pub fn load_images(spec: &DatasetSpec, img_size: &ImageSize) -> Result<Tensor> {
    let images = match spec {
        DatasetSpec::Folder(dir) => {
            let images = tch::vision::image::load_dir(dir, img_size.width, img_size.height)
                .map_err(|e| GanError::from(e).path_context(&dir.display().to_string()))?;
            let images = images.to_kind(Kind::Float) / 255.;
            if img_size.channels == 1 && images.size()[1] == 3 {
                (images.narrow(1, 0, 1) + images.narrow(1, 1, 1) + images.narrow(1, 2, 1)) / 3.
            } else {
                images
            }
        }
        DatasetSpec::Mnist(dir) => load_mnist(dir)?,
    };
    check_images(&images, img_size)?;
    Ok(images)
}
