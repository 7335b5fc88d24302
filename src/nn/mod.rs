//! Layers that complement the ones provided by `tch::nn`.
mod spectral_norm;
pub use spectral_norm::*;
