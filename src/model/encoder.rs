use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::graph::{knn, local_covariance, local_maxpool};
use crate::debug_assert_finite;

/// Width of the descriptor produced by the trunk, before optional compression.
pub const FEATURE_WIDTH: usize = 512;

/// Graph-based point cloud encoder.
///
/// Local covariance features feed a shared pointwise conv stack, two
/// graph-pooling stages widen the features to 1024 channels, and a global
/// max-pool collapses the point dimension before the final pointwise stack
/// produces the 512-wide descriptor. When `num_features < 512` a bias-free
/// linear layer compresses the descriptor to the exposed latent width.
#[derive(Module, Debug)]
pub struct FoldNetEncoder<B: Backend> {
    mlp1: Vec<Conv1d<B>>,
    linear1: Linear<B>,
    conv1: Conv1d<B>,
    linear2: Linear<B>,
    conv2: Conv1d<B>,
    mlp2: Vec<Conv1d<B>>,
    compress: Option<Linear<B>>,
    relu: Relu,
    k: usize,
}

impl<B: Backend> FoldNetEncoder<B> {
    /// `num_features`: exposed latent width (<= 512).
    /// `k`: neighbor count for the k-NN graph; callers must keep k <= N - 1.
    pub fn new(num_features: usize, k: usize, device: &B::Device) -> Self {
        assert!(
            (1..=FEATURE_WIDTH).contains(&num_features),
            "num_features must be in 1..={FEATURE_WIDTH} (got {num_features})"
        );

        let mlp1 = vec![
            Conv1dConfig::new(12, 64, 1).init(device),
            Conv1dConfig::new(64, 64, 1).init(device),
            Conv1dConfig::new(64, 64, 1).init(device),
        ];
        let mlp2 = vec![
            Conv1dConfig::new(1024, FEATURE_WIDTH, 1).init(device),
            Conv1dConfig::new(FEATURE_WIDTH, FEATURE_WIDTH, 1).init(device),
        ];
        let compress = (num_features < FEATURE_WIDTH).then(|| {
            LinearConfig::new(FEATURE_WIDTH, num_features)
                .with_bias(false)
                .init(device)
        });

        Self {
            mlp1,
            linear1: LinearConfig::new(64, 64).init(device),
            conv1: Conv1dConfig::new(64, 128, 1).init(device),
            linear2: LinearConfig::new(128, 128).init(device),
            conv2: Conv1dConfig::new(128, 1024, 1).init(device),
            mlp2,
            compress,
            relu: Relu::new(),
            k,
        }
    }

    /// Two rounds of neighbor max-pool + linear + pointwise conv.
    ///
    /// x: [B, 64, N] -> [B, 1024, N]
    fn graph_layer(&self, x: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 3> {
        let x = local_maxpool(x.swap_dims(1, 2), idx.clone()); // [B, N, 64]
        let x = self.linear1.forward(x); // [B, N, 64]
        let x = self.relu.forward(self.conv1.forward(x.swap_dims(1, 2))); // [B, 128, N]
        let x = local_maxpool(x.swap_dims(1, 2), idx); // [B, N, 128]
        let x = self.linear2.forward(x); // [B, N, 128]
        self.conv2.forward(x.swap_dims(1, 2)) // [B, 1024, N]
    }

    /// points: [B, N, 3] -> latent: [B, num_features]
    ///
    /// The k-NN graph is rebuilt from the raw coordinates on every call.
    pub fn forward(&self, points: Tensor<B, 3>) -> Tensor<B, 2> {
        let idx = knn(points.clone(), self.k); // [B, N, k]
        let features = local_covariance(points, idx.clone()); // [B, N, 12]

        let mut x = features.swap_dims(1, 2); // [B, 12, N]
        for conv in &self.mlp1 {
            x = self.relu.forward(conv.forward(x)); // [B, 64, N]
        }

        let x = self.graph_layer(x, idx); // [B, 1024, N]
        let mut x = x.max_dim(2); // [B, 1024, 1]
        for (i, conv) in self.mlp2.iter().enumerate() {
            x = conv.forward(x);
            if i < self.mlp2.len() - 1 {
                x = self.relu.forward(x);
            }
        } // [B, 512, 1]

        let descriptor = x.squeeze::<2>(2); // [B, 512]
        let latent = match &self.compress {
            Some(compress) => compress.forward(descriptor), // [B, num_features]
            None => descriptor,
        };
        debug_assert_finite!(latent);
        latent
    }
}
