use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::encoder::FEATURE_WIDTH;
use crate::debug_assert_finite;

/// Number of points in every folding prior (45 * 45).
pub const PRIOR_POINTS: usize = 2025;

const GRID_SIDE: usize = 45;
const GRID_MIN: f32 = -3.0;
const GRID_MAX: f32 = 3.0;
const GAUSSIAN_SEED: u64 = 42;

/// Fixed, non-learned point set the decoder folds onto the target shape.
///
/// Resolved once at construction; the decoder stores the materialized prior
/// tensor and never branches on the shape again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorShape {
    /// 45x45 planar grid over [-3, 3]^2.
    Plane,
    /// Fibonacci lattice on the unit sphere.
    Sphere,
    /// Standard-normal 3D points drawn once from a fixed seed.
    Gaussian,
}

impl PriorShape {
    /// Dimensionality of the prior's coordinates (2 for the plane).
    pub fn dims(self) -> usize {
        match self {
            PriorShape::Plane => 2,
            PriorShape::Sphere | PriorShape::Gaussian => 3,
        }
    }

    /// Flattened [PRIOR_POINTS, dims] coordinates.
    fn build(self) -> Vec<f32> {
        match self {
            PriorShape::Plane => {
                let step = (GRID_MAX - GRID_MIN) / (GRID_SIDE - 1) as f32;
                let mut points = Vec::with_capacity(PRIOR_POINTS * 2);
                for i in 0..GRID_SIDE {
                    for j in 0..GRID_SIDE {
                        points.push(GRID_MIN + i as f32 * step);
                        points.push(GRID_MIN + j as f32 * step);
                    }
                }
                points
            }
            PriorShape::Sphere => {
                // Fibonacci lattice: near-uniform coverage of the unit sphere.
                let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
                let mut points = Vec::with_capacity(PRIOR_POINTS * 3);
                for i in 0..PRIOR_POINTS {
                    let y = 1.0 - 2.0 * (i as f32 + 0.5) / PRIOR_POINTS as f32;
                    let radius = (1.0 - y * y).sqrt();
                    let theta = golden * i as f32;
                    points.extend_from_slice(&[radius * theta.cos(), y, radius * theta.sin()]);
                }
                points
            }
            PriorShape::Gaussian => {
                let mut rng = StdRng::seed_from_u64(GAUSSIAN_SEED);
                (0..PRIOR_POINTS * 3)
                    .map(|_| rng.sample::<f32, _>(StandardNormal))
                    .collect()
            }
        }
    }
}

/// Two-stage folding decoder.
///
/// Replicates the latent code across the prior points, folds the prior into
/// an intermediate 3D point set, then folds again conditioned on that
/// intermediate result. When `num_features < 512` a bias-free linear layer
/// decompresses the latent back to the internal width first.
#[derive(Module, Debug)]
pub struct FoldNetDecoder<B: Backend> {
    /// Constant [M, D] prior coordinates; not a trainable parameter.
    prior: Tensor<B, 2>,
    folding1: Vec<Conv1d<B>>,
    folding2: Vec<Conv1d<B>>,
    decompress: Option<Linear<B>>,
    relu: Relu,
}

impl<B: Backend> FoldNetDecoder<B> {
    pub fn new(num_features: usize, shape: PriorShape, device: &B::Device) -> Self {
        let dims = shape.dims();
        let prior = Tensor::from_data(
            TensorData::new(shape.build(), [PRIOR_POINTS, dims]),
            device,
        );

        let folding1 = vec![
            Conv1dConfig::new(FEATURE_WIDTH + dims, 512, 1).init(device),
            Conv1dConfig::new(512, 512, 1).init(device),
            Conv1dConfig::new(512, 3, 1).init(device),
        ];
        let folding2 = vec![
            Conv1dConfig::new(FEATURE_WIDTH + 3, 512, 1).init(device),
            Conv1dConfig::new(512, 512, 1).init(device),
            Conv1dConfig::new(512, 3, 1).init(device),
        ];
        let decompress = (num_features < FEATURE_WIDTH).then(|| {
            LinearConfig::new(num_features, FEATURE_WIDTH)
                .with_bias(false)
                .init(device)
        });

        Self {
            prior,
            folding1,
            folding2,
            decompress,
            relu: Relu::new(),
        }
    }

    /// The materialized prior coordinates, [M, D].
    pub fn prior(&self) -> Tensor<B, 2> {
        self.prior.clone()
    }

    /// Number of points every reconstruction contains.
    pub fn num_output_points(&self) -> usize {
        self.prior.dims()[0]
    }

    /// latent: [B, num_features] -> (final [B, M, 3], intermediate [B, M, 3])
    pub fn forward(&self, latent: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let latent = match &self.decompress {
            Some(decompress) => decompress.forward(latent),
            None => latent,
        }; // [B, 512]

        let [batch_size, width] = latent.dims();
        let [m, dims] = self.prior.dims();

        let code = latent.unsqueeze_dim::<3>(2).expand([batch_size, width, m]); // [B, 512, M]
        let grid = self
            .prior
            .clone()
            .swap_dims(0, 1)
            .unsqueeze::<3>()
            .expand([batch_size, dims, m]); // [B, D, M]

        let fold1 = self.fold(&self.folding1, Tensor::cat(vec![code.clone(), grid], 1)); // [B, 3, M]
        let fold2 = self.fold(&self.folding2, Tensor::cat(vec![code, fold1.clone()], 1)); // [B, 3, M]
        debug_assert_finite!(fold2);

        (fold2.swap_dims(1, 2), fold1.swap_dims(1, 2)) // [B, M, 3] each
    }

    fn fold(&self, stack: &[Conv1d<B>], input: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = input;
        for (i, conv) in stack.iter().enumerate() {
            x = conv.forward(x);
            if i < stack.len() - 1 {
                x = self.relu.forward(x);
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample_latent(batch: usize, width: usize) -> Tensor<TestBackend, 2> {
        let data: Vec<f32> = (0..batch * width).map(|i| (i as f32 * 0.13).cos()).collect();
        Tensor::from_data(TensorData::new(data, [batch, width]), &Default::default())
    }

    #[test]
    fn every_prior_shape_produces_2025_points() {
        let device = Default::default();
        for shape in [PriorShape::Plane, PriorShape::Sphere, PriorShape::Gaussian] {
            let decoder = FoldNetDecoder::<TestBackend>::new(512, shape, &device);
            let (output, fold1) = decoder.forward(sample_latent(2, 512));

            assert_eq!(output.dims(), [2, PRIOR_POINTS, 3]);
            assert_eq!(fold1.dims(), [2, PRIOR_POINTS, 3]);
        }
    }

    #[test]
    fn decompression_accepts_narrow_latents() {
        let device = Default::default();
        let decoder = FoldNetDecoder::<TestBackend>::new(128, PriorShape::Plane, &device);
        let (output, _) = decoder.forward(sample_latent(3, 128));
        assert_eq!(output.dims(), [3, PRIOR_POINTS, 3]);
    }

    #[test]
    fn plane_prior_spans_the_grid_range() {
        let device = Default::default();
        let decoder = FoldNetDecoder::<TestBackend>::new(512, PriorShape::Plane, &device);
        let coords: Vec<f32> = decoder.prior().into_data().to_vec().unwrap();

        assert_eq!(coords.len(), PRIOR_POINTS * 2);
        let min = coords.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = coords.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        assert!((min - GRID_MIN).abs() < 1e-5);
        assert!((max - GRID_MAX).abs() < 1e-5);
    }

    #[test]
    fn sphere_prior_sits_on_the_unit_sphere() {
        let device = Default::default();
        let decoder = FoldNetDecoder::<TestBackend>::new(512, PriorShape::Sphere, &device);
        let coords: Vec<f32> = decoder.prior().into_data().to_vec().unwrap();

        for point in coords.chunks_exact(3) {
            let norm = (point[0].powi(2) + point[1].powi(2) + point[2].powi(2)).sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "off-sphere point {point:?}");
        }
    }

    #[test]
    fn gaussian_prior_is_identical_across_constructions() {
        let device = Default::default();
        let first = FoldNetDecoder::<TestBackend>::new(512, PriorShape::Gaussian, &device);
        let second = FoldNetDecoder::<TestBackend>::new(512, PriorShape::Gaussian, &device);

        let a: Vec<f32> = first.prior().into_data().to_vec().unwrap();
        let b: Vec<f32> = second.prior().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
