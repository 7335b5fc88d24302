//! Training of the convolutional image GAN with binary cross-entropy.
use super::{EpochLosses, TrainingHistory};
use crate::config::DcganConfig;
use crate::data::BatchIter;
use crate::error::{GanError, Result};
use crate::models::{DcganDiscriminator, DcganGenerator};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::{
    nn::{self, ModuleT, OptimizerConfig},
    Device, Kind, Reduction, Tensor,
};
use tracing::{debug, info};

/// Number of images in the sample grids written during training.
const GRID_COLUMNS: i64 = 8;

fn bce(probs: &Tensor, targets: &Tensor) -> Tensor {
    probs.binary_cross_entropy::<Tensor>(targets, None, Reduction::Mean)
}

pub struct DcganTrainer {
    config: DcganConfig,
    device: Device,
    generator_vs: nn::VarStore,
    discriminator_vs: nn::VarStore,
    generator: DcganGenerator,
    discriminator: DcganDiscriminator,
    opt_g: nn::Optimizer,
    opt_d: nn::Optimizer,
    fixed_noise: Tensor,
}

impl DcganTrainer {
    pub fn new(config: DcganConfig) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }
        let device = config.device.device();

        let generator_vs = nn::VarStore::new(device);
        let generator = DcganGenerator::new(
            generator_vs.root(),
            config.img_size,
            config.latent_dim,
            config.dim,
        );
        let opt_g = nn::adam(config.beta1, config.beta2, 0.).build(&generator_vs, config.lr)?;

        let discriminator_vs = nn::VarStore::new(device);
        let discriminator =
            DcganDiscriminator::new(discriminator_vs.root(), config.img_size, config.dim);
        let opt_d = nn::adam(config.beta1, config.beta2, 0.).build(&discriminator_vs, config.lr)?;

        let fixed_noise = generator.noise(GRID_COLUMNS * GRID_COLUMNS, device);
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

    pub fn config(&self) -> &DcganConfig {
        &self.config
    }

    pub fn generator(&self) -> &DcganGenerator {
        &self.generator
    }

    pub fn discriminator(&self) -> &DcganDiscriminator {
        &self.discriminator
    }

    pub fn generator_vs(&self) -> &nn::VarStore {
        &self.generator_vs
    }

    pub fn discriminator_vs(&self) -> &nn::VarStore {
        &self.discriminator_vs
    }

    pub fn generator_checkpoint(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("DCGANgenerator_epoch{}.safetensors", self.config.num_epochs))
    }

    pub fn discriminator_checkpoint(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("DCGANdiscriminator_epoch{}.safetensors", self.config.num_epochs))
    }

    /// One discriminator update on a batch of real images, the generator
    /// being frozen.
    pub fn discriminator_step(&mut self, real: &Tensor) -> Result<f64> {
        let batch_size = real.size()[0];
        let real_labels = Tensor::ones([batch_size], (Kind::Float, self.device));
        let fake_labels = Tensor::zeros([batch_size], (Kind::Float, self.device));

        self.discriminator_vs.unfreeze();
        self.generator_vs.freeze();
        let pred_real = real.apply_t(&self.discriminator, true).flatten(0, -1);
        let fake_images = self
            .generator
            .noise(batch_size, self.device)
            .apply_t(&self.generator, true)
            .detach();
        let pred_fake = fake_images.apply_t(&self.discriminator, true).flatten(0, -1);
        let loss = bce(&pred_real, &real_labels) + bce(&pred_fake, &fake_labels);
        self.opt_d.backward_step(&loss);
        self.generator_vs.unfreeze();
        Ok(f64::try_from(&loss)?)
    }

    /// One generator update on `batch_size` fresh samples, the discriminator
    /// being frozen.
    pub fn generator_step(&mut self, batch_size: i64) -> Result<f64> {
        let real_labels = Tensor::ones([batch_size], (Kind::Float, self.device));

        self.discriminator_vs.freeze();
        self.generator_vs.unfreeze();
        let pred_fake = self
            .generator
            .noise(batch_size, self.device)
            .apply_t(&self.generator, true)
            .apply_t(&self.discriminator, true)
            .flatten(0, -1);
        let loss = bce(&pred_fake, &real_labels);
        self.opt_g.backward_step(&loss);
        self.discriminator_vs.unfreeze();
        Ok(f64::try_from(&loss)?)
    }

    /// Runs one discriminator and one generator update on a batch of real
    /// images, returning `(loss_d, loss_g)`.
    pub fn train_step(&mut self, real: &Tensor) -> Result<(f64, f64)> {
        let loss_d = self.discriminator_step(real)?;
        let loss_g = self.generator_step(real.size()[0])?;
        Ok((loss_d, loss_g))
    }

    /// Trains both networks on `[N, C, H, W]` images with values in `[0, 1]`,
    /// then saves them to the output directory.
    pub fn train(&mut self, images: &Tensor) -> Result<TrainingHistory> {
        let size = images.size();
        if size.len() != 4 || size[1..] != self.config.img_size.dims() {
            return Err(GanError::Shape(format!(
                "expected images of shape [N, {:?}], got {:?}",
                self.config.img_size.dims(),
                size
            )));
        }
        if size[0] < self.config.batch_size {
            return Err(GanError::Shape(format!(
                "{} images are not enough for a batch of {}",
                size[0], self.config.batch_size
            )));
        }
        std::fs::create_dir_all(&self.config.output_dir)?;

        let num_epochs = self.config.num_epochs;
        let mut history = TrainingHistory::default();
        let training_start = Instant::now();
        for epoch in 0..num_epochs {
            let epoch_start = Instant::now();
            let mut batches = BatchIter::new(images, self.config.batch_size);
            batches.shuffle().to_device(self.device);
            let num_batches = batches.len();
            let mut losses = EpochLosses::default();
            for (i, real) in batches.enumerate() {
                let (loss_d, loss_g) = self.train_step(&real)?;
                losses.add(loss_g, loss_d);
                if self.config.log_every > 0 && i % self.config.log_every == 0 {
                    info!(
                        epoch = epoch + 1,
                        iteration = i,
                        loss_d,
                        loss_g,
                        "[{}/{}][{}/{}]\tLoss_D: {:.4}\tLoss_G: {:.4}",
                        epoch + 1,
                        num_epochs,
                        i,
                        num_batches,
                        loss_d,
                        loss_g
                    );
                }
            }
            let (loss_g, loss_d) = losses.means();
            let elapsed = epoch_start.elapsed();
            history.record_epoch(loss_g, loss_d, elapsed);
            debug!(epoch = epoch + 1, loss_g, loss_d, ?elapsed, "epoch done");

            if let Some(every) = self.config.sample_every {
                if (epoch + 1) % every == 0 {
                    let file_name = format!("samples_epoch{:04}.png", epoch + 1);
                    let path = self.config.output_dir.join(file_name);
                    self.save_samples(&path)?;
                }
            }
        }
        history.training_time = training_start.elapsed();
        info!("Time of training: {:?}", history.training_time);

        let (generator_path, discriminator_path) =
            (self.generator_checkpoint(), self.discriminator_checkpoint());
        self.save(&generator_path, &discriminator_path)?;
        info!(
            "Models saved: Generator -> {}, Discriminator -> {}",
            generator_path.display(),
            discriminator_path.display()
        );
        history.write_json(self.config.output_dir.join("history.json"))?;
        Ok(history)
    }

    /// Generates `num_samples` images in evaluation mode.
    pub fn sample(&self, num_samples: i64) -> Tensor {
        let noise = self.generator.noise(num_samples, self.device);
        tch::no_grad(|| noise.apply_t(&self.generator, false))
    }

    /// Writes a grid of the images generated from the fixed noise.
    pub fn save_samples<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let imgs = tch::no_grad(|| self.fixed_noise.apply_t(&self.generator, false));
        crate::vision::save_grid(&imgs, GRID_COLUMNS, path)
    }

    pub fn save<T: AsRef<Path>>(&self, generator_path: T, discriminator_path: T) -> Result<()> {
        self.generator_vs.save(generator_path.as_ref())?;
        self.discriminator_vs.save(discriminator_path.as_ref())?;
        Ok(())
    }

    pub fn load<T: AsRef<Path>>(&mut self, generator_path: T, discriminator_path: T) -> Result<()> {
        let generator_path = generator_path.as_ref();
        self.generator_vs
            .load(generator_path)
            .map_err(|e| GanError::from(e).path_context(&generator_path.display().to_string()))?;
        let discriminator_path = discriminator_path.as_ref();
        self.discriminator_vs
            .load(discriminator_path)
            .map_err(|e| {
                GanError::from(e).path_context(&discriminator_path.display().to_string())
            })?;
        Ok(())
    }
}
