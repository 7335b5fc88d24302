//! Training of the feed-forward GAN on 2-D toy data.
use super::{EpochLosses, TrainingHistory};
use crate::config::ToyGanConfig;
use crate::error::{GanError, Result};
use crate::loss::Critique;
use crate::models::toy;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::{
    nn::{self, ModuleT, OptimizerConfig},
    Device, Kind, Tensor,
};
use tracing::{debug, info};

/// Summary of a toy training run.
#[derive(Debug, Clone, Serialize)]
pub struct ToyTrainingReport {
    pub history: TrainingHistory,
    /// Generator samples written during training, in epoch order.
    pub snapshots: Vec<PathBuf>,
    /// Number of generator updates.
    pub steps: usize,
}

/// Keeps the `max(n / 2, 1)` highest of `n` discriminator scores once half of
/// the epochs are done, scores are returned unchanged otherwise.
pub fn top_k_scores(pred_fake: Tensor, epoch: usize, epochs: usize, enabled: bool) -> Tensor {
    if !enabled || 2 * epoch < epochs {
        return pred_fake;
    }
    let k = std::cmp::max(pred_fake.size()[0] / 2, 1);
    pred_fake.flatten(0, -1).topk(k, 0, true, true).0
}

pub struct ToyGanTrainer {
    config: ToyGanConfig,
    device: Device,
    generator_vs: nn::VarStore,
    discriminator_vs: nn::VarStore,
    generator: nn::SequentialT,
    discriminator: nn::SequentialT,
    opt_g: nn::Optimizer,
    opt_d: nn::Optimizer,
    fixed_noise: Tensor,
}

impl ToyGanTrainer {
    pub fn new(config: ToyGanConfig) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }
        let device = config.device.device();

        let generator_vs = nn::VarStore::new(device);
        let generator = toy::generator(generator_vs.root(), config.latent_size);
        let opt_g = nn::RmsProp::default().build(&generator_vs, config.lr)?;

        let discriminator_vs = nn::VarStore::new(device);
        let discriminator = toy::discriminator(discriminator_vs.root(), config.spectral_norm);
        let opt_d = nn::RmsProp::default().build(&discriminator_vs, config.lr)?;

        let fixed_noise = Tensor::randn(
            [std::cmp::max(config.samples / 10, 1), config.latent_size],
            (Kind::Float, device),
        );
        Ok(Self {
            config,
            device,
            generator_vs,
            discriminator_vs,
            generator,
            discriminator,
            opt_g,
            opt_d,
            fixed_noise,
        })
    }

    pub fn config(&self) -> &ToyGanConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn discriminator_vs(&self) -> &nn::VarStore {
        &self.discriminator_vs
    }

    fn noise(&self, batch_size: i64) -> Tensor {
        Tensor::randn([batch_size, self.config.latent_size], (Kind::Float, self.device))
    }

    /// Clamps every trainable discriminator parameter to `[-bound, bound]`.
    pub fn clip_discriminator_weights(&self, bound: f64) {
        tch::no_grad(|| {
            for mut var in self.discriminator_vs.trainable_variables() {
                let _ = var.clamp_(-bound, bound);
            }
        });
    }

    /// One discriminator update on a batch of real samples.
    pub fn discriminator_step(&mut self, batch: &Tensor) -> Result<f64> {
        let noise = self.noise(batch.size()[0]);
        let fake = tch::no_grad(|| noise.apply_t(&self.generator, true));
        let pred_real = batch.apply_t(&self.discriminator, true);
        let pred_fake = fake.apply_t(&self.discriminator, true);
        let loss = self.config.loss.discriminator_loss(
            &self.discriminator,
            Critique { real: batch, fake: &fake, pred_real: &pred_real, pred_fake: &pred_fake },
        )?;
        self.opt_d.backward_step(&loss);

        if self.config.clip_weights > 0. {
            self.clip_discriminator_weights(self.config.clip_weights);
        }
        Ok(f64::try_from(&loss)?)
    }

    /// One generator update, filtered through [`top_k_scores`].
    pub fn generator_step(&mut self, batch_size: i64, epoch: usize) -> Result<f64> {
        self.discriminator_vs.freeze();
        let pred_fake = self
            .noise(batch_size)
            .apply_t(&self.generator, true)
            .apply_t(&self.discriminator, true);
        let pred_fake = top_k_scores(pred_fake, epoch, self.config.epochs, self.config.topk);
        let loss = self.config.loss.generator_loss(&pred_fake);
        self.opt_g.backward_step(&loss);
        self.discriminator_vs.unfreeze();
        Ok(f64::try_from(&loss)?)
    }

    pub fn save<T: AsRef<Path>>(&self, generator_path: T, discriminator_path: T) -> Result<()> {
        self.generator_vs.save(generator_path.as_ref())?;
        self.discriminator_vs.save(discriminator_path.as_ref())?;
        Ok(())
    }

    /// Generator output for the given noise, in evaluation mode.
    pub fn sample(&self, noise: &Tensor) -> Tensor {
        tch::no_grad(|| noise.apply_t(&self.generator, false))
    }

    /// Trains on `[N, 2]` samples, writing generator snapshots every
    /// `plot_frequency` epochs.
    pub fn train(&mut self, data: &Tensor) -> Result<ToyTrainingReport> {
        let size = data.size();
        if size.len() != 2 || size[1] != toy::DATA_DIM || size[0] == 0 {
            return Err(GanError::Shape(format!("expected [N, 2] samples, got {size:?}")));
        }
        let num_samples = size[0];
        let batch_size = self.config.batch_size;
        let epochs = self.config.epochs;

        let run_dir = self.config.run_dir();
        std::fs::create_dir_all(&run_dir)?;
        let mut data = data.to_device(self.device);
        let every_tenth = data.slice(0, 0i64, num_samples, 10).to_device(Device::Cpu);
        every_tenth.write_npy(run_dir.join("data.npy"))?;

        let progress_bar = if self.config.show_progress {
            ProgressBar::new(epochs as u64)
        } else {
            ProgressBar::hidden()
        };
        let template = "{bar:40} {pos}/{len} [{elapsed_precise}] {msg}";
        progress_bar.set_style(ProgressStyle::with_template(template)?);

        let mut history = TrainingHistory::default();
        let mut snapshots = vec![];
        let mut steps = 0;
        let training_start = Instant::now();
        for epoch in 0..epochs {
            progress_bar.inc(1);
            let epoch_start = Instant::now();
            let mut losses = EpochLosses::default();
            for index in (0..num_samples).step_by(batch_size as usize) {
                let index_perm = Tensor::randperm(num_samples, (Kind::Int64, self.device));
                data = data.index_select(0, &index_perm);
                let batch = data.narrow(0, index, std::cmp::min(batch_size, num_samples - index));
                let mut loss_d = 0.;
                for _ in 0..self.config.d_updates {
                    loss_d = self.discriminator_step(&batch)?;
                }
                let loss_g = self.generator_step(batch.size()[0], epoch)?;
                losses.add(loss_g, loss_d);
                steps += 1;
                progress_bar.set_message(format!(
                    "Epoch {epoch}, Generator loss {loss_g:.4}, Discriminator loss {loss_d:.4}"
                ));
            }
            let (loss_g, loss_d) = losses.means();
            history.record_epoch(loss_g, loss_d, epoch_start.elapsed());
            debug!(epoch, loss_g, loss_d, "epoch done");

            let frequency = self.config.plot_frequency;
            if frequency > 0 && (epoch + 1) % frequency == 0 {
                let path = run_dir.join(format!("{:04}.npy", epoch + 1));
                self.sample(&self.fixed_noise).to_device(Device::Cpu).write_npy(&path)?;
                snapshots.push(path);
            }
        }
        history.training_time = training_start.elapsed();
        progress_bar.finish();
        info!(
            run = %self.config.run_name(),
            steps,
            elapsed = ?history.training_time,
            "toy GAN training done"
        );
        self.save(
            run_dir.join("generator.safetensors"),
            run_dir.join("discriminator.safetensors"),
        )?;
        history.write_json(run_dir.join("history.json"))?;
        Ok(ToyTrainingReport { history, snapshots, steps })
    }
}
