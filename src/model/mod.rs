mod decoder;
mod encoder;
mod graph;
mod loss;

pub use decoder::{FoldNetDecoder, PRIOR_POINTS, PriorShape};
pub use encoder::{FEATURE_WIDTH, FoldNetEncoder};
pub use graph::{knn, local_covariance, local_maxpool};
pub use loss::chamfer_distance;

use burn::config::Config;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Bool, Int, Tensor};
use burn::train::{RegressionOutput, TrainOutput, TrainStep, ValidStep};

use crate::data::PointCloudBatch;

/// Debug-build check that a tensor holds neither NaN nor inf.
#[macro_export]
macro_rules! debug_assert_finite {
    ($tensor:expr) => {{
        #[allow(unused_imports)]
        use burn::tensor::cast::ToElement as _;
        debug_assert!(
            !$tensor.clone().is_nan().any().into_scalar().to_bool(),
            "tensor contains NaN"
        );
        debug_assert!(
            !$tensor.clone().is_inf().any().into_scalar().to_bool(),
            "tensor contains inf"
        );
    }};
}

/// Point-cloud autoencoder: graph encoder plus two-stage folding decoder.
#[derive(Module, Debug)]
pub struct FoldingNet<B: Backend> {
    pub encoder: FoldNetEncoder<B>,
    pub decoder: FoldNetDecoder<B>,
}

impl<B: Backend> FoldingNet<B> {
    pub fn new(num_features: usize, k: usize, prior: PriorShape, device: &B::Device) -> Self {
        Self {
            encoder: FoldNetEncoder::new(num_features, k, device),
            decoder: FoldNetDecoder::new(num_features, prior, device),
        }
    }

    /// points: [B, N, 3] -> (final [B, M, 3], latent [B, F], fold1 [B, M, 3])
    ///
    /// Output points follow the prior's order, not the input's; only the
    /// set matters, and the loss is order-invariant.
    pub fn forward(&self, points: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 3>) {
        let latent = self.encoder.forward(points);
        let (output, fold1) = self.decoder.forward(latent.clone());
        (output, latent, fold1)
    }

    /// Chamfer distance between an input cloud and its reconstruction.
    pub fn get_loss(&self, input: &Tensor<B, 3>, output: &Tensor<B, 3>) -> Tensor<B, 1> {
        chamfer_distance(input, output)
    }

    /// Every trainable parameter tensor of encoder and decoder, flattened.
    ///
    /// The folding prior is a constant tensor, not a `Param`, so it is
    /// never part of this list.
    pub fn trainable_params(&self) -> Vec<Tensor<B, 1>> {
        let mut collector = ParamCollector { params: Vec::new() };
        self.visit(&mut collector);
        collector.params
    }

    /// Reconstruction loss packaged for the training loop.
    pub fn forward_regression(&self, points: Tensor<B, 3>) -> RegressionOutput<B> {
        let (reconstructed, _latent, _fold1) = self.forward(points.clone());
        let loss = self.get_loss(&points, &reconstructed);

        let [batch_size, num_points, channels] = reconstructed.dims();
        let output = reconstructed.reshape([batch_size, num_points * channels]);
        let [batch_size, num_points, channels] = points.dims();
        let targets = points.reshape([batch_size, num_points * channels]);

        RegressionOutput::new(loss, output, targets)
    }
}

struct ParamCollector<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let len = tensor.shape().num_elements();
        self.params.push(tensor.clone().reshape([len]));
    }

    fn visit_int<const D: usize>(&mut self, _id: ParamId, _tensor: &Tensor<B, D, Int>) {}

    fn visit_bool<const D: usize>(&mut self, _id: ParamId, _tensor: &Tensor<B, D, Bool>) {}
}

impl<B: AutodiffBackend> TrainStep<PointCloudBatch<B>, RegressionOutput<B>> for FoldingNet<B> {
    fn step(&self, batch: PointCloudBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_regression(batch.points);
        let grads = item.loss.backward();

        TrainOutput::new(self, grads, item)
    }
}

impl<B: Backend> ValidStep<PointCloudBatch<B>, RegressionOutput<B>> for FoldingNet<B> {
    fn step(&self, batch: PointCloudBatch<B>) -> RegressionOutput<B> {
        self.forward_regression(batch.points)
    }
}

#[derive(Config, Debug)]
pub struct FoldingNetConfig {
    /// Exposed latent width (<= 512).
    pub num_features: usize,
    /// Neighbor count for the encoder's k-NN graph.
    #[config(default = 16)]
    pub k: usize,
    /// Folding prior, resolved once at construction.
    #[config(default = "PriorShape::Plane")]
    pub prior: PriorShape,
}

impl FoldingNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FoldingNet<B> {
        FoldingNet::new(self.num_features, self.k, self.prior, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn sample_points(batch: usize, n: usize) -> Tensor<TestBackend, 3> {
        let data: Vec<f32> = (0..batch * n * 3).map(|i| (i as f32 * 0.47).sin()).collect();
        Tensor::from_data(TensorData::new(data, [batch, n, 3]), &Default::default())
    }

    #[test]
    fn round_trip_shapes() {
        let device = Default::default();
        let model = FoldingNetConfig::new(512).init::<TestBackend>(&device);

        let (output, latent, fold1) = model.forward(sample_points(2, 64));
        assert_eq!(latent.dims(), [2, 512]);
        assert_eq!(output.dims(), [2, PRIOR_POINTS, 3]);
        assert_eq!(fold1.dims(), [2, PRIOR_POINTS, 3]);
    }

    #[test]
    fn compressed_latent_round_trip() {
        let device = Default::default();
        let model = FoldingNetConfig::new(128)
            .with_k(8)
            .init::<TestBackend>(&device);

        let (output, latent, _) = model.forward(sample_points(1, 32));
        assert_eq!(latent.dims(), [1, 128]);
        assert_eq!(output.dims(), [1, PRIOR_POINTS, 3]);
    }

    #[test]
    fn loss_is_zero_for_identical_clouds() {
        let device = Default::default();
        let model = FoldingNetConfig::new(64).with_k(4).init::<TestBackend>(&device);

        let points = sample_points(1, 16);
        let loss: f32 = model.get_loss(&points, &points.clone()).into_scalar();
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn trainable_params_cover_the_whole_model() {
        let device = Default::default();
        let model = FoldingNetConfig::new(128).init::<TestBackend>(&device);

        let params = model.trainable_params();
        assert!(!params.is_empty());

        let collected: usize = params.iter().map(|p| p.dims()[0]).sum();
        assert_eq!(collected, model.num_params());
    }

    #[test]
    fn prior_is_not_a_trainable_param() {
        let device = Default::default();
        let with_plane = FoldingNetConfig::new(512).init::<TestBackend>(&device);
        let plane_count: usize = with_plane.trainable_params().iter().map(|p| p.dims()[0]).sum();

        // The sphere prior has an extra coordinate per point and a wider
        // first folding layer; only the layer's weights may differ in count.
        let with_sphere = FoldingNetConfig::new(512)
            .with_prior(PriorShape::Sphere)
            .init::<TestBackend>(&device);
        let sphere_count: usize =
            with_sphere.trainable_params().iter().map(|p| p.dims()[0]).sum();

        assert_eq!(sphere_count - plane_count, 512); // one 512-out conv, one extra input channel
    }
}
