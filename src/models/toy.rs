//! Feed-forward networks for the 2-D toy distribution.
use crate::nn::{spectral_norm_linear, SpectralNormConfig};
use std::borrow::Borrow;
use tch::nn;

pub const HIDDEN: i64 = 256;
pub const DATA_DIM: i64 = 2;

/// Maps `latent_size` noise vectors to 2-D points.
pub fn generator<'p, P>(p: P, latent_size: i64) -> nn::SequentialT
where
    P: Borrow<nn::Path<'p>>,
{
    let p = p.borrow();
    nn::seq_t()
        .add(nn::linear(p / "fc1", latent_size, HIDDEN, Default::default()))
        .add_fn(|xs| xs.leaky_relu())
        .add(nn::linear(p / "fc2", HIDDEN, HIDDEN, Default::default()))
        .add_fn(|xs| xs.leaky_relu())
        .add(nn::linear(p / "fc3", HIDDEN, HIDDEN, Default::default()))
        .add_fn(|xs| xs.leaky_relu())
        .add(nn::linear(p / "fc4", HIDDEN, HIDDEN, Default::default()))
        .add_fn(|xs| xs.tanh())
        .add(nn::linear(p / "fc5", HIDDEN, DATA_DIM, Default::default()))
}

fn dense(
    seq: nn::SequentialT,
    p: nn::Path,
    in_dim: i64,
    out_dim: i64,
    spectral_norm: bool,
) -> nn::SequentialT {
    if spectral_norm {
        seq.add(spectral_norm_linear(p, in_dim, out_dim, SpectralNormConfig::default()))
    } else {
        seq.add(nn::linear(p, in_dim, out_dim, Default::default()))
    }
}

/// Maps 2-D points to an unbounded realness score.
///
/// Every linear layer is spectrally normalized when `spectral_norm` is set.
pub fn discriminator<'p, P>(p: P, spectral_norm: bool) -> nn::SequentialT
where
    P: Borrow<nn::Path<'p>>,
{
    let p = p.borrow();
    let seq = dense(nn::seq_t(), p / "fc1", DATA_DIM, HIDDEN, spectral_norm)
        .add_fn(|xs| xs.leaky_relu());
    let seq = dense(seq, p / "fc2", HIDDEN, HIDDEN, spectral_norm).add_fn(|xs| xs.leaky_relu());
    let seq = dense(seq, p / "fc3", HIDDEN, HIDDEN, spectral_norm).add_fn(|xs| xs.leaky_relu());
    let seq = dense(seq, p / "fc4", HIDDEN, HIDDEN, spectral_norm).add_fn(|xs| xs.leaky_relu());
    dense(seq, p / "fc5", HIDDEN, 1, spectral_norm)
}
