//! Hyper-parameters for the two training pipelines.
//!
//! Both configurations can be built in code through `Default` plus struct
//! update syntax, or read from a JSON file in which missing fields take their
//! default value.
use crate::error::{GanError, Result};
use crate::loss::GanLoss;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tch::Device;

/// Image dimensions as `(channels, height, width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub channels: i64,
    pub height: i64,
    pub width: i64,
}

impl ImageSize {
    pub fn new(channels: i64, height: i64, width: i64) -> Self {
        Self { channels, height, width }
    }

    /// Spatial size of the feature maps after four stride-2 stages.
    pub fn feature_sizes(&self) -> (i64, i64) {
        (self.height / 16, self.width / 16)
    }

    pub fn dims(&self) -> [i64; 3] {
        [self.channels, self.height, self.width]
    }

    fn validate(&self) -> Result<()> {
        if self.channels <= 0 {
            let msg = format!("channels must be positive, got {}", self.channels);
            return Err(GanError::Config(msg));
        }
        for (name, v) in [("height", self.height), ("width", self.width)] {
            if v <= 0 || v % 16 != 0 {
                return Err(GanError::Config(format!(
                    "image {name} must be a positive multiple of 16, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Where the tensors live: `auto`, `cpu`, `cuda` or `cuda:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceChoice {
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
}

impl DeviceChoice {
    pub fn device(&self) -> Device {
        match self {
            DeviceChoice::Auto => Device::cuda_if_available(),
            DeviceChoice::Cpu => Device::Cpu,
            DeviceChoice::Cuda(index) => Device::Cuda(*index),
        }
    }
}

impl std::str::FromStr for DeviceChoice {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda(0)),
            other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
                Some(Ok(index)) => Ok(DeviceChoice::Cuda(index)),
                _ => Err(GanError::Config(format!("unknown device {s:?}"))),
            },
        }
    }
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceChoice::Auto => write!(f, "auto"),
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

impl TryFrom<String> for DeviceChoice {
    type Error = GanError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceChoice> for String {
    fn from(value: DeviceChoice) -> Self {
        value.to_string()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| GanError::from(e).path_context(&path.display().to_string()))?;
    Ok(serde_json::from_str(&contents)?)
}

fn check_positive(name: &str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(GanError::Config(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

fn check_lr(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.) {
        return Err(GanError::Config(format!("learning rate must be positive, got {lr}")));
    }
    Ok(())
}

/// Configuration of the convolutional image GAN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcganConfig {
    pub img_size: ImageSize,
    pub latent_dim: i64,
    /// Width multiplier of the convolution stacks.
    pub dim: i64,
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub batch_size: i64,
    pub num_epochs: usize,
    pub device: DeviceChoice,
    /// Number of iterations between two loss log lines.
    pub log_every: usize,
    /// Number of epochs between two sample grids, `None` disables them.
    pub sample_every: Option<usize>,
    pub output_dir: PathBuf,
    pub seed: Option<i64>,
}

impl Default for DcganConfig {
    fn default() -> Self {
        Self {
            img_size: ImageSize::new(1, 32, 32),
            latent_dim: 100,
            dim: 16,
            lr: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            batch_size: 64,
            num_epochs: 10,
            device: DeviceChoice::Auto,
            log_every: 50,
            sample_every: Some(1),
            output_dir: PathBuf::from("trained_models"),
            seed: None,
        }
    }
}

impl DcganConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        self.img_size.validate()?;
        check_positive("latent_dim", self.latent_dim)?;
        check_positive("dim", self.dim)?;
        check_positive("batch_size", self.batch_size)?;
        check_positive("num_epochs", self.num_epochs as i64)?;
        check_lr(self.lr)?;
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0. ..1.).contains(&beta) {
                return Err(GanError::Config(format!("{name} must be in [0, 1), got {beta}")));
            }
        }
        if self.sample_every == Some(0) {
            return Err(GanError::Config("sample_every must be positive".to_string()));
        }
        Ok(())
    }
}

/// Configuration of the feed-forward GAN trained on the Gaussian ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToyGanConfig {
    pub loss: GanLoss,
    pub samples: i64,
    /// Standard deviation of each ring component.
    pub variance: f64,
    pub latent_size: i64,
    pub batch_size: i64,
    pub epochs: usize,
    pub lr: f64,
    /// Discriminator steps per generator step.
    pub d_updates: usize,
    /// Bound for discriminator weight clipping, `0` disables it.
    pub clip_weights: f64,
    pub spectral_norm: bool,
    pub topk: bool,
    /// Number of epochs between two sample snapshots, `0` disables them.
    pub plot_frequency: usize,
    pub device: DeviceChoice,
    pub output_dir: PathBuf,
    pub show_progress: bool,
    pub seed: Option<i64>,
}

impl Default for ToyGanConfig {
    fn default() -> Self {
        Self {
            loss: GanLoss::Standard,
            samples: 10000,
            variance: 0.05,
            latent_size: 32,
            batch_size: 500,
            epochs: 500,
            lr: 1e-4,
            d_updates: 1,
            clip_weights: 0.,
            spectral_norm: false,
            topk: false,
            plot_frequency: 10,
            device: DeviceChoice::Auto,
            output_dir: PathBuf::from("plots"),
            show_progress: true,
            seed: None,
        }
    }
}

impl ToyGanConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples < 8 {
            return Err(GanError::Config(format!(
                "samples must be at least 8, got {}",
                self.samples
            )));
        }
        check_positive("latent_size", self.latent_size)?;
        check_positive("batch_size", self.batch_size)?;
        check_positive("epochs", self.epochs as i64)?;
        check_positive("d_updates", self.d_updates as i64)?;
        check_lr(self.lr)?;
        if !(self.variance.is_finite() && self.variance > 0.) {
            let msg = format!("variance must be positive, got {}", self.variance);
            return Err(GanError::Config(msg));
        }
        if !(self.clip_weights.is_finite() && self.clip_weights >= 0.) {
            return Err(GanError::Config(format!(
                "clip_weights must be non-negative, got {}",
                self.clip_weights
            )));
        }
        if let GanLoss::WassersteinGp { lambda } = self.loss {
            if !(lambda.is_finite() && lambda >= 0.) {
                return Err(GanError::Config(format!(
                    "gradient penalty weight must be non-negative, got {lambda}"
                )));
            }
        }
        Ok(())
    }

    /// Name of the output sub-directory, e.g. `hinge_top_k_sn`.
    pub fn run_name(&self) -> String {
        let mut name = self.loss.name().to_string();
        if self.topk {
            name.push_str("_top_k");
        }
        if self.spectral_norm {
            name.push_str("_sn");
        }
        if self.clip_weights > 0. {
            name.push_str("_clip");
        }
        name
    }

    /// Directory receiving the sample snapshots of this run.
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(self.run_name())
    }
}
