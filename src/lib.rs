//! GAN training pipelines built on top of `tch`.
//!
//! Two pipelines are provided:
//! - a DCGAN trained on images with binary cross-entropy, see [`train::DcganTrainer`];
//! - a feed-forward GAN trained on a ring of eight 2-D Gaussians with a
//!   choice of adversarial losses and stabilization tricks, see
//!   [`train::ToyGanTrainer`].
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod loss;
pub mod models;
pub mod nn;
pub mod train;
pub mod vision;

pub use config::{DcganConfig, DeviceChoice, ImageSize, ToyGanConfig};
pub use error::{GanError, Result};
pub use loss::GanLoss;
