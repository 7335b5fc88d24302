use std::sync::{Arc, Mutex};
use tch::{nn, Device, Kind, Tensor};
use tch_gan::data::gaussian_ring;
use tch_gan::train::toy::top_k_scores;
use tch_gan::train::{DcganTrainer, ToyGanTrainer};
use tch_gan::{DcganConfig, DeviceChoice, GanError, GanLoss, ImageSize, ToyGanConfig};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

use test_utils::*;

fn tiny_dcgan(name: &str) -> DcganConfig {
    DcganConfig {
        img_size: ImageSize::new(1, 16, 16),
        latent_dim: 8,
        dim: 2,
        batch_size: 4,
        num_epochs: 2,
        device: DeviceChoice::Cpu,
        log_every: 1,
        sample_every: Some(1),
        output_dir: temp_dir(name),
        seed: Some(42),
        ..Default::default()
    }
}

fn tiny_toy(name: &str, loss: GanLoss) -> ToyGanConfig {
    ToyGanConfig {
        loss,
        samples: 64,
        latent_size: 4,
        batch_size: 32,
        epochs: 2,
        plot_frequency: 1,
        device: DeviceChoice::Cpu,
        output_dir: temp_dir(name),
        show_progress: false,
        seed: Some(42),
        ..Default::default()
    }
}

#[test]
fn dcgan_training_run() {
    let config = tiny_dcgan("dcgan");
    let output_dir = config.output_dir.clone();
    let images = Tensor::rand([10, 1, 16, 16], (Kind::Float, Device::Cpu));
    let mut trainer = DcganTrainer::new(config.clone()).unwrap();
    let history = trainer.train(&images).unwrap();

    assert_eq!(history.epochs(), 2);
    assert_eq!(history.discriminator_losses.len(), 2);
    assert_eq!(history.epoch_times.len(), 2);
    let mut losses = history.generator_losses.iter().chain(history.discriminator_losses.iter());
    assert!(losses.all(|l| l.is_finite() && *l > 0.), "{history:?}");
    assert!(history.training_time >= history.epoch_times[0]);

    let generator_path = trainer.generator_checkpoint();
    let discriminator_path = trainer.discriminator_checkpoint();
    assert!(generator_path.ends_with("DCGANgenerator_epoch2.safetensors"));
    assert!(discriminator_path.ends_with("DCGANdiscriminator_epoch2.safetensors"));
    assert!(generator_path.exists() && discriminator_path.exists());
    assert!(output_dir.join("samples_epoch0001.png").exists());
    assert!(output_dir.join("samples_epoch0002.png").exists());
    assert!(output_dir.join("history.json").exists());

    let samples = trainer.sample(3);
    assert_eq!(samples.size(), [3, 1, 16, 16]);

    let mut restored = DcganTrainer::new(DcganConfig { seed: Some(0), ..config }).unwrap();
    restored.load(&generator_path, &discriminator_path).unwrap();
    let noise = trainer.generator().noise(2, Device::Cpu);
    let expected = tch::no_grad(|| noise.apply_t(trainer.generator(), false));
    let actual = tch::no_grad(|| noise.apply_t(restored.generator(), false));
    assert_close(f64_from(&(expected - actual).abs().max()), 0., 1e-6);
    std::fs::remove_dir_all(output_dir).unwrap();
}

#[test]
fn dcgan_rejects_bad_datasets() {
    let config = tiny_dcgan("dcgan-bad");
    let output_dir = config.output_dir.clone();
    let mut trainer = DcganTrainer::new(config).unwrap();

    let wrong_size = Tensor::rand([8, 1, 32, 32], (Kind::Float, Device::Cpu));
    assert!(matches!(trainer.train(&wrong_size), Err(GanError::Shape(_))));
    let too_few = Tensor::rand([3, 1, 16, 16], (Kind::Float, Device::Cpu));
    assert!(matches!(trainer.train(&too_few), Err(GanError::Shape(_))));
    std::fs::remove_dir_all(output_dir).unwrap();
}

#[test]
fn dcgan_rejects_invalid_config() {
    let config = DcganConfig { img_size: ImageSize::new(1, 20, 20), ..Default::default() };
    assert!(matches!(DcganTrainer::new(config), Err(GanError::Config(_))));
}

#[test]
fn toy_training_with_every_loss() {
    for loss in GanLoss::ALL {
        let config = tiny_toy(&format!("toy-{}", loss.name()), loss);
        let output_dir = config.output_dir.clone();
        let run_dir = config.run_dir();
        let data = gaussian_ring(config.samples, config.variance, Device::Cpu);
        let mut trainer = ToyGanTrainer::new(config).unwrap();
        let report = trainer.train(&data).unwrap();

        assert_eq!(report.steps, 4, "{loss}");
        assert_eq!(report.history.epochs(), 2);
        let history = &report.history;
        let mut losses = history.generator_losses.iter().chain(history.discriminator_losses.iter());
        assert!(losses.all(|l| l.is_finite()), "{loss}: {history:?}");
        assert_eq!(report.snapshots, [run_dir.join("0001.npy"), run_dir.join("0002.npy")]);
        let snapshot = Tensor::read_npy(&report.snapshots[1]).unwrap();
        assert_eq!(snapshot.size(), [6, 2]);
        let data_snapshot = Tensor::read_npy(run_dir.join("data.npy")).unwrap();
        assert_eq!(data_snapshot.size(), [7, 2]);
        assert!(run_dir.join("generator.safetensors").exists());
        assert!(run_dir.join("history.json").exists());
        std::fs::remove_dir_all(output_dir).unwrap();
    }
}

#[test]
fn toy_training_with_all_tricks() {
    let config = ToyGanConfig {
        spectral_norm: true,
        topk: true,
        clip_weights: 0.05,
        d_updates: 3,
        samples: 72,
        ..tiny_toy("toy-tricks", GanLoss::WassersteinGp { lambda: 10. })
    };
    let output_dir = config.output_dir.clone();
    assert!(config.run_dir().ends_with("wasserstein-gp_top_k_sn_clip"));
    let data = gaussian_ring(config.samples, config.variance, Device::Cpu);
    let mut trainer = ToyGanTrainer::new(config).unwrap();
    let report = trainer.train(&data).unwrap();

    // 72 samples in batches of 32: two full batches and a last one of 8.
    assert_eq!(report.steps, 6);
    for var in trainer.discriminator_vs().trainable_variables() {
        assert!(f64_from(&var.abs().max()) <= 0.05 + 1e-6);
    }
    std::fs::remove_dir_all(output_dir).unwrap();
}

#[test]
fn top_k_keeps_the_highest_half_in_the_second_half_of_training() {
    let scores = || Tensor::from_slice(&[3f32, 1., 4., 2.]).view([4, 1]);
    assert_eq!(vec_f64_from(&top_k_scores(scores(), 5, 10, true)), [4., 3.]);
    assert_eq!(vec_f64_from(&top_k_scores(scores(), 9, 10, true)), [4., 3.]);
    // Odd number of epochs: epoch 1 of 3 is not yet half way.
    assert_eq!(top_k_scores(scores(), 1, 3, true).size(), [4, 1]);
    assert_eq!(top_k_scores(scores(), 2, 3, true).size(), [2]);

    let before = top_k_scores(scores(), 4, 10, true);
    assert_eq!(before.size(), [4, 1]);
    assert_eq!(vec_f64_from(&before), [3., 1., 4., 2.]);
    let disabled = top_k_scores(scores(), 9, 10, false);
    assert_eq!(vec_f64_from(&disabled), [3., 1., 4., 2.]);

    let single = Tensor::from_slice(&[5f32]).view([1, 1]);
    assert_eq!(vec_f64_from(&top_k_scores(single, 9, 10, true)), [5.]);
}

#[test]
fn toy_generator_step_runs_with_top_k() {
    let config =
        ToyGanConfig { topk: true, epochs: 2, ..tiny_toy("toy-topk", GanLoss::Wasserstein) };
    let output_dir = config.output_dir.clone();
    let mut trainer = ToyGanTrainer::new(config).unwrap();
    assert!(trainer.generator_step(1, 0).unwrap().is_finite());
    assert!(trainer.generator_step(1, 1).unwrap().is_finite());
    assert!(trainer.generator_step(9, 1).unwrap().is_finite());
    std::fs::remove_dir_all(output_dir).unwrap();
}

fn trainable_values(vs: &nn::VarStore) -> Vec<Vec<f64>> {
    vs.trainable_variables().iter().map(vec_f64_from).collect()
}

fn has_gradients(vs: &nn::VarStore) -> bool {
    vs.trainable_variables().iter().any(|var| var.grad().defined())
}

#[test]
fn toy_generator_step_leaves_the_discriminator_untouched() {
    for spectral_norm in [false, true] {
        let config = ToyGanConfig {
            spectral_norm,
            ..tiny_toy("toy-frozen", GanLoss::WassersteinGp { lambda: 10. })
        };
        let output_dir = config.output_dir.clone();
        let mut trainer = ToyGanTrainer::new(config).unwrap();
        let before = trainable_values(trainer.discriminator_vs());
        trainer.generator_step(16, 0).unwrap();
        assert_eq!(before, trainable_values(trainer.discriminator_vs()));
        assert!(!has_gradients(trainer.discriminator_vs()));
        assert!(trainer.discriminator_vs().trainable_variables().iter().all(|v| v.requires_grad()));
        std::fs::remove_dir_all(output_dir).unwrap();
    }
}

#[test]
fn dcgan_steps_only_update_their_own_network() {
    let config = tiny_dcgan("dcgan-frozen");
    let output_dir = config.output_dir.clone();
    let real = Tensor::rand([4, 1, 16, 16], (Kind::Float, Device::Cpu));
    let mut trainer = DcganTrainer::new(config).unwrap();

    let generator_before = trainable_values(trainer.generator_vs());
    let discriminator_before = trainable_values(trainer.discriminator_vs());
    trainer.discriminator_step(&real).unwrap();
    assert_eq!(generator_before, trainable_values(trainer.generator_vs()));
    assert!(!has_gradients(trainer.generator_vs()));
    assert_ne!(discriminator_before, trainable_values(trainer.discriminator_vs()));

    let mut trainer = DcganTrainer::new(tiny_dcgan("dcgan-frozen-g")).unwrap();
    let generator_before = trainable_values(trainer.generator_vs());
    let discriminator_before = trainable_values(trainer.discriminator_vs());
    trainer.generator_step(4).unwrap();
    assert_eq!(discriminator_before, trainable_values(trainer.discriminator_vs()));
    assert!(!has_gradients(trainer.discriminator_vs()));
    assert_ne!(generator_before, trainable_values(trainer.generator_vs()));
    std::fs::remove_dir_all(output_dir).unwrap();
    std::fs::remove_dir_all(trainer.config().output_dir.clone()).unwrap();
}

/// Records the field names of every event carrying a `loss_d` field.
#[derive(Clone, Default)]
struct LossEvents(Arc<Mutex<Vec<Vec<String>>>>);

struct FieldNames(Vec<String>);

impl Visit for FieldNames {
    fn record_debug(&mut self, field: &Field, _value: &dyn std::fmt::Debug) {
        self.0.push(field.name().to_string());
    }
}

impl<S: tracing::Subscriber> Layer<S> for LossEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut names = FieldNames(vec![]);
        event.record(&mut names);
        if names.0.iter().any(|name| name == "loss_d") {
            self.0.lock().unwrap().push(names.0);
        }
    }
}

#[test]
fn dcgan_logs_iterations_with_structured_fields() {
    let config = DcganConfig { num_epochs: 1, sample_every: None, ..tiny_dcgan("dcgan-logs") };
    let output_dir = config.output_dir.clone();
    let images = Tensor::rand([8, 1, 16, 16], (Kind::Float, Device::Cpu));
    let mut trainer = DcganTrainer::new(config).unwrap();

    let events = LossEvents::default();
    let subscriber = Registry::default().with(events.clone());
    tracing::subscriber::with_default(subscriber, || trainer.train(&images).unwrap());

    let events = events.0.lock().unwrap();
    let iterations: Vec<_> =
        events.iter().filter(|names| names.iter().any(|n| n == "iteration")).collect();
    assert_eq!(iterations.len(), 2);
    for names in iterations {
        for field in ["epoch", "iteration", "loss_d", "loss_g", "message"] {
            assert!(names.iter().any(|n| n == field), "{field} missing from {names:?}");
        }
    }
    std::fs::remove_dir_all(output_dir).unwrap();
}

#[test]
fn toy_clip_discriminator_weights() {
    let config = tiny_toy("toy-clip", GanLoss::Wasserstein);
    let output_dir = config.output_dir.clone();
    let trainer = ToyGanTrainer::new(config).unwrap();
    trainer.clip_discriminator_weights(1e-3);
    for var in trainer.discriminator_vs().trainable_variables() {
        assert!(f64_from(&var.abs().max()) <= 1e-3 + 1e-9);
    }
    std::fs::remove_dir_all(output_dir).unwrap();
}

#[test]
fn toy_rejects_bad_data() {
    let config = tiny_toy("toy-bad", GanLoss::Standard);
    let output_dir = config.output_dir.clone();
    let mut trainer = ToyGanTrainer::new(config).unwrap();
    let data = Tensor::zeros([16, 3], (Kind::Float, Device::Cpu));
    assert!(matches!(trainer.train(&data), Err(GanError::Shape(_))));
    std::fs::remove_dir_all(output_dir).unwrap();
}
