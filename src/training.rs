use burn::data::dataloader::DataLoaderBuilder;
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::LearnerBuilder;
use burn::train::metric::LossMetric;
use log::info;

use crate::data::{PointCloudBatcher, PointCloudDataset};
use crate::model::FoldingNetConfig;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: FoldingNetConfig,
    pub optimizer: AdamConfig,
    #[config(default = 50)]
    pub num_epochs: usize,
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-4)]
    pub learning_rate: f64,
    /// Points sampled from every mesh surface; must stay above the model's k.
    #[config(default = 2048)]
    pub num_points: usize,
}

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

pub fn train<B: AutodiffBackend>(
    artifact_dir: &str,
    data_dir: &str,
    config: TrainingConfig,
    device: B::Device,
) {
    assert!(
        config.model.k < config.num_points,
        "k ({}) must stay below the sampled point count ({})",
        config.model.k,
        config.num_points
    );

    create_artifact_dir(artifact_dir);
    config
        .save(format!("{artifact_dir}/config.json"))
        .expect("Config should be saved successfully");

    B::seed(config.seed);

    let dataloader_train = DataLoaderBuilder::new(PointCloudBatcher::new(config.num_points))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(
            PointCloudDataset::from_dir(data_dir, "train", config.num_points)
                .expect("train split should be readable"),
        );

    let dataloader_valid = DataLoaderBuilder::new(PointCloudBatcher::new(config.num_points))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(
            PointCloudDataset::from_dir(data_dir, "valid", config.num_points)
                .expect("valid split should be readable"),
        );

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(
            config.model.init::<B>(&device),
            config.optimizer.init(),
            config.learning_rate,
        );

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    model_trained
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .expect("Trained model should be saved successfully");
    info!("model saved to {artifact_dir}/model");
}
