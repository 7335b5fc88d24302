//! A linear layer with spectral normalization.
//!
//! The weight matrix is divided by an estimate of its largest singular value,
//! refined by one power iteration step on each training forward pass.
//! See "Spectral Normalization for Generative Adversarial Networks",
//! Miyato et al. 2018.
use std::borrow::Borrow;
use tch::{nn, Kind, Tensor};

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct SpectralNormConfig {
    pub ws_init: nn::Init,
    pub bs_init: Option<nn::Init>,
    pub bias: bool,
    /// Power iteration steps per training forward pass.
    pub n_power_iterations: usize,
}

impl Default for SpectralNormConfig {
    fn default() -> Self {
        SpectralNormConfig {
            ws_init: nn::Init::Uniform { lo: -1., up: 1. },
            bs_init: None,
            bias: true,
            n_power_iterations: 1,
        }
    }
}

/// A spectrally normalized fully-connected layer.
#[derive(Debug)]
pub struct SpectralNormLinear {
    pub ws: Tensor,
    pub bs: Option<Tensor>,
    /// Running estimate of the left singular vector, not trained.
    pub u: Tensor,
    n_power_iterations: usize,
}

fn normalize(xs: &Tensor) -> Tensor {
    xs / (xs.norm() + EPS)
}

/// Creates a new spectrally normalized linear layer.
pub fn spectral_norm_linear<'a, T: Borrow<nn::Path<'a>>>(
    vs: T,
    in_dim: i64,
    out_dim: i64,
    c: SpectralNormConfig,
) -> SpectralNormLinear {
    let vs = vs.borrow();
    let bound = 1.0 / (in_dim as f64).sqrt();
    let ws_init = match c.ws_init {
        nn::Init::Uniform { lo, up } => nn::Init::Uniform { lo: lo * bound, up: up * bound },
        init => init,
    };
    let bs = if c.bias {
        let bs_init = c.bs_init.unwrap_or(nn::Init::Uniform { lo: -bound, up: bound });
        Some(vs.var("bias", &[out_dim], bs_init))
    } else {
        None
    };
    let mut u = vs.zeros_no_train("u", &[out_dim]);
    tch::no_grad(|| {
        let init = normalize(&Tensor::randn([out_dim], (Kind::Float, u.device())));
        u.copy_(&init);
    });
    SpectralNormLinear {
        ws: vs.var("weight", &[out_dim, in_dim], ws_init),
        bs,
        u,
        n_power_iterations: c.n_power_iterations,
    }
}

impl SpectralNormLinear {
    /// Runs the power iteration from the stored `u` and returns `(u, v)`.
    fn singular_vectors(&self, update: bool) -> (Tensor, Tensor) {
        tch::no_grad(|| {
            let mut u = self.u.shallow_clone();
            let mut v = normalize(&self.ws.tr().mv(&u));
            if update {
                for _ in 0..self.n_power_iterations {
                    v = normalize(&self.ws.tr().mv(&u));
                    u = normalize(&self.ws.mv(&v));
                }
                self.u.shallow_clone().copy_(&u);
            }
            (u.copy(), v)
        })
    }

    /// Current estimate of the largest singular value of the raw weight.
    pub fn sigma(&self) -> Tensor {
        let (u, v) = self.singular_vectors(false);
        u.dot(&self.ws.mv(&v))
    }

    /// The weight actually applied to the inputs.
    pub fn normalized_weight(&self, train: bool) -> Tensor {
        let (u, v) = self.singular_vectors(train);
        let sigma = u.dot(&self.ws.mv(&v));
        &self.ws / sigma
    }
}

impl nn::ModuleT for SpectralNormLinear {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ws = self.normalized_weight(train);
        match &self.bs {
            Some(bs) => xs.matmul(&ws.tr()) + bs,
            None => xs.matmul(&ws.tr()),
        }
    }
}
