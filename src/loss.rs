//! Adversarial loss formulations.
//!
//! Every loss consumes raw discriminator scores (logits), the sigmoid being
//! folded into `softplus` where a probabilistic reading is needed:
//! `-log(sigmoid(x)) = softplus(-x)` and `-log(1 - sigmoid(x)) = softplus(x)`.
use crate::error::{GanError, Result};
use serde::{Deserialize, Serialize};
use tch::{nn::ModuleT, Kind, Tensor};

pub const DEFAULT_GP_LAMBDA: f64 = 10.0;

/// The loss pair used to train a generator against a discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GanLoss {
    /// Minimax objective of Goodfellow et al. 2014.
    #[default]
    Standard,
    /// Minimax discriminator, generator maximises `log D(G(z))`.
    NonSaturating,
    Hinge,
    Wasserstein,
    /// Wasserstein critic with a gradient penalty weighted by `lambda`.
    WassersteinGp { lambda: f64 },
    LeastSquares,
}

/// Inputs of a discriminator loss: the two batches and their scores.
pub struct Critique<'a> {
    pub real: &'a Tensor,
    pub fake: &'a Tensor,
    pub pred_real: &'a Tensor,
    pub pred_fake: &'a Tensor,
}

fn softplus(xs: &Tensor) -> Tensor {
    xs.relu() + (-xs.abs()).exp().log1p()
}

impl GanLoss {
    pub const ALL: [GanLoss; 6] = [
        GanLoss::Standard,
        GanLoss::NonSaturating,
        GanLoss::Hinge,
        GanLoss::Wasserstein,
        GanLoss::WassersteinGp { lambda: DEFAULT_GP_LAMBDA },
        GanLoss::LeastSquares,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GanLoss::Standard => "standard",
            GanLoss::NonSaturating => "non-saturating",
            GanLoss::Hinge => "hinge",
            GanLoss::Wasserstein => "wasserstein",
            GanLoss::WassersteinGp { .. } => "wasserstein-gp",
            GanLoss::LeastSquares => "least-squares",
        }
    }

    /// Loss minimised by the generator given the scores of its samples.
    pub fn generator_loss(&self, pred_fake: &Tensor) -> Tensor {
        match self {
            GanLoss::Standard => -softplus(pred_fake).mean(Kind::Float),
            GanLoss::NonSaturating => softplus(&-pred_fake).mean(Kind::Float),
            GanLoss::Hinge | GanLoss::Wasserstein | GanLoss::WassersteinGp { .. } => {
                -pred_fake.mean(Kind::Float)
            }
            GanLoss::LeastSquares => {
                (pred_fake - 1.0).pow_tensor_scalar(2.0).mean(Kind::Float) * 0.5
            }
        }
    }

    /// Loss minimised by the discriminator.
    ///
    /// `critic` is only evaluated by the gradient penalty variant.
    pub fn discriminator_loss<M: ModuleT>(&self, critic: &M, c: Critique) -> Result<Tensor> {
        let Critique { real, fake, pred_real, pred_fake } = c;
        let loss = match self {
            GanLoss::Standard | GanLoss::NonSaturating => {
                softplus(&-pred_real).mean(Kind::Float) + softplus(pred_fake).mean(Kind::Float)
            }
            GanLoss::Hinge => {
                (1.0f64 - pred_real).relu().mean(Kind::Float)
                    + (pred_fake + 1.0).relu().mean(Kind::Float)
            }
            GanLoss::Wasserstein => pred_fake.mean(Kind::Float) - pred_real.mean(Kind::Float),
            GanLoss::WassersteinGp { lambda } => {
                pred_fake.mean(Kind::Float) - pred_real.mean(Kind::Float)
                    + gradient_penalty(critic, real, fake, *lambda)?
            }
            GanLoss::LeastSquares => {
                (pred_real - 1.0).pow_tensor_scalar(2.0).mean(Kind::Float) * 0.5
                    + pred_fake.pow_tensor_scalar(2.0).mean(Kind::Float) * 0.5
            }
        };
        Ok(loss)
    }
}

impl std::str::FromStr for GanLoss {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let loss = match s.as_str() {
            "standard" => GanLoss::Standard,
            "non-saturating" => GanLoss::NonSaturating,
            "hinge" => GanLoss::Hinge,
            "wasserstein" => GanLoss::Wasserstein,
            "wasserstein-gp" => GanLoss::WassersteinGp { lambda: DEFAULT_GP_LAMBDA },
            "least-squares" | "ls" => GanLoss::LeastSquares,
            other => match other.strip_prefix("wasserstein-gp:").map(str::parse::<f64>) {
                Some(Ok(lambda)) => GanLoss::WassersteinGp { lambda },
                _ => return Err(GanError::Config(format!("unknown loss {s:?}"))),
            },
        };
        Ok(loss)
    }
}

impl std::fmt::Display for GanLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GanLoss::WassersteinGp { lambda } if *lambda != DEFAULT_GP_LAMBDA => {
                write!(f, "{}:{lambda}", self.name())
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

impl TryFrom<String> for GanLoss {
    type Error = GanError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<GanLoss> for String {
    fn from(value: GanLoss) -> Self {
        value.to_string()
    }
}

/// Gradient penalty of a critic on random interpolates of `real` and `fake`.
///
/// Returns `lambda * mean((|grad D(x)|_2 - 1)^2)`, the norm being taken over
/// every dimension but the batch one. The graph is kept so that the penalty
/// can itself be back-propagated.
pub fn gradient_penalty<M>(critic: &M, real: &Tensor, fake: &Tensor, lambda: f64) -> Result<Tensor>
where
    M: ModuleT,
{
    let shape = real.size();
    if shape != fake.size() {
        return Err(GanError::Shape(format!(
            "real and fake batches differ: {:?} vs {:?}",
            shape,
            fake.size()
        )));
    }
    if shape.len() < 2 {
        return Err(GanError::Shape(format!("expected a batch of samples, got {shape:?}")));
    }
    let mut ratio_shape = vec![1; shape.len()];
    ratio_shape[0] = shape[0];
    let ratios = Tensor::rand(ratio_shape.as_slice(), (real.kind(), real.device()));

    let interpolated =
        (&ratios * real.detach() + (1.0f64 - &ratios) * fake.detach()).set_requires_grad(true);
    // Samples are scored independently, so the gradient of the summed score
    // holds the per-sample gradients.
    let score = critic.forward_t(&interpolated, true).sum(Kind::Float);

    let gradients = Tensor::f_run_backward(&[&score], &[&interpolated], true, true)?;
    let gradients = &gradients[0];

    let penalty = (gradients.flatten(1, -1).norm_scalaropt_dim(2.0, [1], false) - 1.0)
        .pow_tensor_scalar(2.0)
        .mean(Kind::Float)
        * lambda;
    Ok(penalty)
}
