use nalgebra::Vector3;
use rand::distr::Uniform;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use stl_io::IndexedMesh;

type BoxError = Box<dyn std::error::Error>;

/// Sample `n_points` points from a mesh surface, area-weighted, then center
/// the cloud and scale it into the unit sphere.
///
/// Returns the cloud flattened to [n_points * 3].
pub fn sample_surface(mesh: &IndexedMesh, n_points: usize) -> Result<Vec<f32>, BoxError> {
    let vertex = |i: usize| Vector3::from(mesh.vertices[i].0);

    // Cumulative triangle areas drive the face choice; WeightedIndex rejects
    // meshes whose total area is zero.
    let areas: Vec<f32> = mesh
        .faces
        .iter()
        .map(|face| {
            let [a, b, c] = face.vertices.map(vertex);
            (b - a).cross(&(c - a)).norm() * 0.5
        })
        .collect();
    let face_choice = WeightedIndex::new(&areas)?;

    let mut rng = rand::rng();
    let unit = Uniform::new(0.0f32, 1.0)?;
    let mut points = Vec::with_capacity(n_points * 3);

    for _ in 0..n_points {
        let face = &mesh.faces[face_choice.sample(&mut rng)];
        let [a, b, c] = face.vertices.map(vertex);

        // Uniform barycentric sample, reflected into the triangle.
        let (mut u, mut v) = (unit.sample(&mut rng), unit.sample(&mut rng));
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        let p = a + u * (b - a) + v * (c - a);
        points.extend_from_slice(p.as_slice());
    }

    // Center on the centroid and scale the farthest point to unit norm.
    let mut cloud = ndarray::Array2::from_shape_vec((n_points, 3), points)?;
    let centroid = cloud.mean_axis(ndarray::Axis(0)).ok_or("empty point cloud")?;
    cloud -= &centroid;
    let max_norm = cloud
        .rows()
        .into_iter()
        .map(|row| (row[0].powi(2) + row[1].powi(2) + row[2].powi(2)).sqrt())
        .fold(0.0f32, f32::max);
    if max_norm > 0.0 {
        cloud /= max_norm;
    }

    Ok(cloud.into_raw_vec_and_offset().0)
}
