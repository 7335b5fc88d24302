// Trains either the DCGAN on an image dataset or the feed-forward GAN on the
// 2-D Gaussian ring.
//
//   tch-gan dcgan --dataset-dir data/mnist --mnist --epochs 5
//   tch-gan toy --loss wasserstein-gp --spectral-norm --topk
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tch_gan::data::{self, DatasetSpec};
use tch_gan::train::{DcganTrainer, ToyGanTrainer};
use tch_gan::{DcganConfig, DeviceChoice, GanLoss, ToyGanConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the convolutional GAN on images.
    Dcgan(DcganArgs),
    /// Train the feed-forward GAN on the 2-D Gaussian ring.
    Toy(ToyArgs),
}

#[derive(Args, Debug)]
struct DcganArgs {
    /// Directory holding the training images.
    #[arg(long)]
    dataset_dir: PathBuf,

    /// Read the MNIST idx files from the dataset directory.
    #[arg(long)]
    mnist: bool,

    /// JSON file with the base configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<i64>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,
}

#[derive(Args, Debug)]
struct ToyArgs {
    /// JSON file with the base configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// standard, non-saturating, hinge, wasserstein, wasserstein-gp or least-squares.
    #[arg(long)]
    loss: Option<String>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    samples: Option<i64>,

    #[arg(long)]
    batch_size: Option<i64>,

    #[arg(long)]
    lr: Option<f64>,

    /// Discriminator updates per generator update.
    #[arg(long)]
    d_updates: Option<usize>,

    /// Clip the discriminator weights to [-c, c].
    #[arg(long)]
    clip_weights: Option<f64>,

    #[arg(long)]
    spectral_norm: bool,

    /// Only use the best scored half of the generated samples in the second
    /// half of the training.
    #[arg(long)]
    topk: bool,

    #[arg(long)]
    plot_frequency: Option<usize>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,
}

fn run_dcgan(args: DcganArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => DcganConfig::from_json_file(path)?,
        None => DcganConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.lr = lr;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if args.cpu {
        config.device = DeviceChoice::Cpu;
    }
    let spec = if args.mnist {
        DatasetSpec::Mnist(args.dataset_dir)
    } else {
        DatasetSpec::Folder(args.dataset_dir)
    };
    let images = data::load_images(&spec, &config.img_size).context("loading the dataset")?;
    info!("loaded dataset: {:?}", images.size());

    let mut trainer = DcganTrainer::new(config)?;
    let history = trainer.train(&images)?;
    info!(
        epochs = history.epochs(),
        final_loss_g = ?history.generator_losses.last().copied(),
        final_loss_d = ?history.discriminator_losses.last().copied(),
        "training done"
    );
    Ok(())
}

fn run_toy(args: ToyArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ToyGanConfig::from_json_file(path)?,
        None => ToyGanConfig::default(),
    };
    if let Some(loss) = &args.loss {
        config.loss = loss.parse::<GanLoss>()?;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.lr = lr;
    }
    if let Some(d_updates) = args.d_updates {
        config.d_updates = d_updates;
    }
    if let Some(clip_weights) = args.clip_weights {
        config.clip_weights = clip_weights;
    }
    if let Some(plot_frequency) = args.plot_frequency {
        config.plot_frequency = plot_frequency;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    config.spectral_norm |= args.spectral_norm;
    config.topk |= args.topk;
    if args.cpu {
        config.device = DeviceChoice::Cpu;
    }

    let mut trainer = ToyGanTrainer::new(config)?;
    let (samples, variance) = (trainer.config().samples, trainer.config().variance);
    let data = data::gaussian_ring(samples, variance, trainer.device());
    let report = trainer.train(&data)?;
    info!(
        steps = report.steps,
        snapshots = report.snapshots.len(),
        dir = %trainer.config().run_dir().display(),
        "training done"
    );
    Ok(())
}

fn main() -> Result<()> {
    tch_gan::logging::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Dcgan(args) => run_dcgan(args),
        Command::Toy(args) => run_toy(args),
    }
}
