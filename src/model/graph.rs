use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Batched brute-force k-NN (squared L2).
///
/// `points`: [B, N, C] -> neighbor indices [B, N, k], computed independently
/// per batch sample. The self-distance is masked out, so a point never lists
/// itself as a neighbor. Ties fall to the backend's top-k selection order.
pub fn knn<B: Backend>(points: Tensor<B, 3>, k: usize) -> Tensor<B, 3, Int> {
    let device = points.device();
    let [batch_size, num_points, _] = points.dims();
    assert!(
        k + 1 <= num_points,
        "k-NN requires k <= N - 1 (got k = {k}, N = {num_points})"
    );

    // Pairwise squared distances: [B, N, N]
    let points_i = points.clone().unsqueeze_dim::<4>(2); // [B, N, 1, C]
    let points_j = points.unsqueeze_dim::<4>(1); // [B, 1, N, C]
    let dist2 = (points_i - points_j).powi_scalar(2).sum_dim(3).squeeze::<3>(3);

    // Push the diagonal to +inf so a point cannot select itself.
    let diagonal = Tensor::<B, 2>::eye(num_points, &device)
        .equal_elem(1.0)
        .unsqueeze::<3>()
        .expand([batch_size, num_points, num_points]);
    let dist2 = dist2.mask_fill(diagonal, f32::INFINITY);

    // topk returns the largest entries, so select on negated distances.
    let (_, indices) = dist2.neg().topk_with_indices(k, 2); // [B, N, k]
    indices
}

/// Gather each point's neighbor rows.
///
/// `x`: [B, N, F], `idx`: [B, N, k] -> [B, N, k, F]
fn gather_neighbors<B: Backend>(x: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 4> {
    let feat = x.dims()[2];
    let k = idx.dims()[2];

    let x_exp = x.unsqueeze_dim::<4>(2).repeat(&[1, 1, k, 1]); // [B, N, k, F]
    let idx_exp = idx.unsqueeze_dim::<4>(3).repeat(&[1, 1, 1, feat]); // [B, N, k, F]
    x_exp.gather(1, idx_exp)
}

/// Neighbor max-pool: replace each point's feature vector by the elementwise
/// maximum over its k neighbors.
///
/// `x`: [B, N, F], `idx`: [B, N, k] -> [B, N, F]
pub fn local_maxpool<B: Backend>(x: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 3> {
    gather_neighbors(x, idx).max_dim(2).squeeze::<3>(2)
}

/// Per-point local covariance feature.
///
/// For each point: its raw coordinate followed by the 9 entries of the
/// neighbor-mean-centered second-moment matrix. Pure function, no learned
/// state. Coincident neighbors produce a zero covariance block.
///
/// `points`: [B, N, 3], `idx`: [B, N, k] -> [B, N, 12]
pub fn local_covariance<B: Backend>(points: Tensor<B, 3>, idx: Tensor<B, 3, Int>) -> Tensor<B, 3> {
    let [batch_size, num_points, channels] = points.dims();
    assert_eq!(channels, 3, "covariance features expect 3D coordinates");
    let k = idx.dims()[2];

    let neighbors = gather_neighbors(points.clone(), idx); // [B, N, k, 3]
    let centered = neighbors.clone() - neighbors.mean_dim(2); // [B, N, k, 3]
    let cov = centered
        .clone()
        .swap_dims(2, 3)
        .matmul(centered)
        .div_scalar(k as f32); // [B, N, 3, 3]

    let cov = cov.reshape([batch_size, num_points, 9]);
    Tensor::cat(vec![points, cov], 2) // [B, N, 12]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn cloud<const N: usize>(points: [[f32; 3]; N]) -> Tensor<TestBackend, 3> {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [1, N, 3]), &Default::default())
    }

    #[test]
    fn knn_indices_in_range_and_self_excluded() {
        let device = Default::default();
        let n = 10;
        let data: Vec<f32> = (0..n * 3).map(|i| (i as f32 * 0.37).sin()).collect();
        let points = Tensor::<TestBackend, 3>::from_data(TensorData::new(data, [1, n, 3]), &device);

        let idx = knn(points, 4);
        assert_eq!(idx.dims(), [1, n, 4]);

        let flat: Vec<i64> = idx.into_data().to_vec().unwrap();
        for (slot, &neighbor) in flat.iter().enumerate() {
            let point = slot / 4;
            assert!((0..n as i64).contains(&neighbor));
            assert_ne!(neighbor, point as i64, "point {point} listed itself");
        }
    }

    #[test]
    fn knn_finds_exact_neighbors() {
        let points = cloud([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [10.0, 0.0, 0.0]]);
        let idx = knn(points, 2);
        let flat: Vec<i64> = idx.into_data().to_vec().unwrap();

        let neighbor_set = |p: usize| {
            let mut pair = [flat[p * 2], flat[p * 2 + 1]];
            pair.sort();
            pair
        };
        assert_eq!(neighbor_set(0), [1, 2]);
        assert_eq!(neighbor_set(1), [0, 2]);
        assert_eq!(neighbor_set(2), [0, 1]);
        assert_eq!(neighbor_set(3), [1, 2]);
    }

    #[test]
    fn local_maxpool_ignores_neighbor_order() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, -2.0, 5.0, 0.5, -1.0, 3.0], [1, 3, 2]),
            &device,
        );
        let idx = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::new(vec![1i64, 2, 0, 2, 0, 1], [1, 3, 2]),
            &device,
        );
        let idx_reversed = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::new(vec![2i64, 1, 2, 0, 1, 0], [1, 3, 2]),
            &device,
        );

        let pooled: Vec<f32> = local_maxpool(x.clone(), idx).into_data().to_vec().unwrap();
        let pooled_reversed: Vec<f32> =
            local_maxpool(x, idx_reversed).into_data().to_vec().unwrap();
        assert_eq!(pooled, pooled_reversed);
    }

    #[test]
    fn local_maxpool_takes_neighbor_maximum() {
        let device = Default::default();
        // One feature channel per point, value = point index.
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![0.0f32, 1.0, 2.0], [1, 3, 1]),
            &device,
        );
        let idx = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::new(vec![1i64, 2, 0, 2, 0, 1], [1, 3, 2]),
            &device,
        );

        let pooled: Vec<f32> = local_maxpool(x, idx).into_data().to_vec().unwrap();
        assert_eq!(pooled, vec![2.0, 2.0, 1.0]);
    }

    #[test]
    fn local_covariance_has_12_channels() {
        let device = Default::default();
        let n = 8;
        let data: Vec<f32> = (0..n * 3).map(|i| (i as f32 * 0.73).cos()).collect();
        let points = Tensor::<TestBackend, 3>::from_data(TensorData::new(data, [1, n, 3]), &device);

        for k in [2, 3, 5] {
            let idx = knn(points.clone(), k);
            let features = local_covariance(points.clone(), idx);
            assert_eq!(features.dims(), [1, n, 12]);
        }
    }

    #[test]
    fn local_covariance_matches_handcrafted_neighborhood() {
        // p0's two neighbors sit at +/-1 on the x axis: neighbor mean is the
        // origin and the only nonzero covariance entry is xx = 1.
        let points = cloud([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]]);
        let idx = knn(points.clone(), 2);
        let features: Vec<f32> = local_covariance(points, idx).into_data().to_vec().unwrap();

        let p0 = &features[..12];
        let expected = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        for (got, want) in p0.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "p0 features {p0:?}");
        }
    }
}
