mod preprocess;

use std::fs::{self, File};
use std::io;
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use log::{info, warn};

pub use preprocess::sample_surface;

/// One preprocessed point cloud, flattened to [n_points * 3].
#[derive(Clone, Debug)]
pub struct PointCloudItem {
    pub points: Vec<f32>,
}

/// In-memory dataset of surface-sampled point clouds.
pub struct PointCloudDataset {
    items: Vec<PointCloudItem>,
}

impl Dataset<PointCloudItem> for PointCloudDataset {
    fn get(&self, index: usize) -> Option<PointCloudItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl PointCloudDataset {
    /// Load every STL mesh under `dir/split` and sample `n_points` surface
    /// points from each. Unreadable or degenerate meshes are skipped with a
    /// warning so one bad file cannot sink a whole run.
    pub fn from_dir<P: AsRef<Path>>(dir: P, split: &str, n_points: usize) -> io::Result<Self> {
        let dir = dir.as_ref().join(split);
        info!("loading STL meshes from {}", dir.display());

        let mut items = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("stl") {
                continue;
            }

            match load_cloud(&path, n_points) {
                Ok(points) => items.push(PointCloudItem { points }),
                Err(e) => warn!("skipping {}: {e}", path.display()),
            }
        }

        info!("loaded {} point clouds from {split}", items.len());
        Ok(Self { items })
    }
}

fn load_cloud(path: &Path, n_points: usize) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mesh = stl_io::read_stl(&mut file)?;
    sample_surface(&mesh, n_points)
}

/// Batched input for the autoencoder.
#[derive(Clone, Debug)]
pub struct PointCloudBatch<B: Backend> {
    /// [batch_size, n_points, 3]
    pub points: Tensor<B, 3>,
}

/// Stacks fixed-size point clouds into one [B, N, 3] tensor.
#[derive(Clone)]
pub struct PointCloudBatcher {
    n_points: usize,
}

impl PointCloudBatcher {
    pub fn new(n_points: usize) -> Self {
        Self { n_points }
    }
}

impl<B: Backend> Batcher<B, PointCloudItem, PointCloudBatch<B>> for PointCloudBatcher {
    fn batch(&self, items: Vec<PointCloudItem>, device: &B::Device) -> PointCloudBatch<B> {
        let batch_size = items.len();

        let mut flat = Vec::with_capacity(batch_size * self.n_points * 3);
        for item in items {
            debug_assert_eq!(item.points.len(), self.n_points * 3);
            flat.extend_from_slice(&item.points);
        }

        PointCloudBatch {
            points: Tensor::from_data(
                TensorData::new(flat, [batch_size, self.n_points, 3]),
                device,
            ),
        }
    }
}
