use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Chamfer distance between two point sets.
///
/// Permutation-invariant: for each point the nearest neighbor in the other
/// set is found, distances are averaged per direction and summed, then
/// averaged over the batch. Zero iff the two sets coincide.
///
/// lhs: [B, N, 3], rhs: [B, M, 3] -> scalar
pub fn chamfer_distance<B: Backend>(lhs: &Tensor<B, 3>, rhs: &Tensor<B, 3>) -> Tensor<B, 1> {
    let distances = pairwise_distances(lhs, rhs); // [B, N, M]

    // Forward: nearest reconstruction point for every input point.
    let forward = distances.clone().min_dim(2).mean_dim(1); // [B, 1, 1]
    // Backward: nearest input point for every reconstruction point.
    let backward = distances.min_dim(1).mean_dim(2); // [B, 1, 1]

    (forward + backward).mean()
}

/// Euclidean distance between every cross-set pair of points.
///
/// lhs: [B, N, 3], rhs: [B, M, 3] -> [B, N, M]
fn pairwise_distances<B: Backend>(lhs: &Tensor<B, 3>, rhs: &Tensor<B, 3>) -> Tensor<B, 3> {
    let lhs_exp = lhs.clone().unsqueeze_dim::<4>(2); // [B, N, 1, 3]
    let rhs_exp = rhs.clone().unsqueeze_dim::<4>(1); // [B, 1, M, 3]

    let diff = lhs_exp - rhs_exp; // [B, N, M, 3]
    diff.powi_scalar(2).sum_dim(3).squeeze::<3>(3).sqrt()
}
