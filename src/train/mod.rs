//! Adversarial training loops.
pub mod dcgan;
pub mod toy;

pub use dcgan::DcganTrainer;
pub use toy::{ToyGanTrainer, ToyTrainingReport};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-epoch bookkeeping of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean generator loss of each epoch.
    pub generator_losses: Vec<f64>,
    /// Mean discriminator loss of each epoch.
    pub discriminator_losses: Vec<f64>,
    pub epoch_times: Vec<Duration>,
    pub training_time: Duration,
}

impl TrainingHistory {
    pub fn record_epoch(
        &mut self,
        generator_loss: f64,
        discriminator_loss: f64,
        elapsed: Duration,
    ) {
        self.generator_losses.push(generator_loss);
        self.discriminator_losses.push(discriminator_loss);
        self.epoch_times.push(elapsed);
    }

    pub fn epochs(&self) -> usize {
        self.generator_losses.len()
    }

    pub fn write_json<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Running sum of the losses seen during an epoch.
#[derive(Debug, Default, Clone, Copy)]
struct EpochLosses {
    generator: f64,
    discriminator: f64,
    steps: usize,
}

impl EpochLosses {
    fn add(&mut self, generator: f64, discriminator: f64) {
        self.generator += generator;
        self.discriminator += discriminator;
        self.steps += 1;
    }

    fn means(&self) -> (f64, f64) {
        if self.steps == 0 {
            return (f64::NAN, f64::NAN);
        }
        let n = self.steps as f64;
        (self.generator / n, self.discriminator / n)
    }
}
