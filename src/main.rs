#![recursion_limit = "256"]
mod data;
mod inference;
mod model;
mod training;

use std::path::PathBuf;

use burn::backend::{Autodiff, Wgpu};
use burn::optim::AdamConfig;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use crate::model::{FoldingNetConfig, PriorShape};
use crate::training::TrainingConfig;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Directory for model artifacts (config, checkpoints, outputs).
    #[arg(long, default_value = "artifacts")]
    artifact_dir: String,
}

/// CLI spelling of the folding prior; unknown names are rejected at parse
/// time, before any model is built.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum PriorArg {
    Plane,
    Sphere,
    Gaussian,
}

impl From<PriorArg> for PriorShape {
    fn from(arg: PriorArg) -> Self {
        match arg {
            PriorArg::Plane => PriorShape::Plane,
            PriorArg::Sphere => PriorShape::Sphere,
            PriorArg::Gaussian => PriorShape::Gaussian,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train the autoencoder on directories of STL meshes (train/ and valid/).
    Train {
        #[arg(long, default_value = "dataset")]
        data_dir: String,
        /// Latent width exposed by the encoder (<= 512).
        #[arg(long, default_value_t = 512)]
        num_features: usize,
        /// Neighbor count for the encoder's k-NN graph.
        #[arg(long, default_value_t = 16)]
        k: usize,
        /// Folding prior the decoder deforms.
        #[arg(long, value_enum, default_value = "plane")]
        prior: PriorArg,
    },
    /// Encode an STL mesh; writes its latent code and reconstruction.
    Reconstruct {
        /// Path to the mesh to reconstruct.
        #[arg(long)]
        input: PathBuf,
    },
    /// Decode a stored latent code into a point cloud.
    Generate {
        /// Path to a latent.json produced by `reconstruct`.
        #[arg(long)]
        latent: PathBuf,
    },
}

fn main() {
    type Backend = Wgpu<f32, i32>;
    type TrainingBackend = Autodiff<Backend>;

    env_logger::init();
    let cli = Cli::parse();
    let device = burn::backend::wgpu::WgpuDevice::default();

    match cli.command {
        Commands::Train {
            data_dir,
            num_features,
            k,
            prior,
        } => {
            let model = FoldingNetConfig::new(num_features)
                .with_k(k)
                .with_prior(prior.into());
            let start = std::time::Instant::now();
            training::train::<TrainingBackend>(
                &cli.artifact_dir,
                &data_dir,
                TrainingConfig::new(model, AdamConfig::new()),
                device,
            );
            info!("training finished in {:?}", start.elapsed());
        }
        Commands::Reconstruct { input } => {
            inference::reconstruct::<Backend>(&cli.artifact_dir, device, &input);
        }
        Commands::Generate { latent } => {
            inference::generate::<Backend>(&cli.artifact_dir, device, &latent);
        }
    }
}
