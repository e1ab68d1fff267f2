use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use log::info;
use serde::{Deserialize, Serialize};

use crate::data::sample_surface;
use crate::model::FoldingNet;
use crate::training::TrainingConfig;

/// Latent descriptor as stored on disk next to a reconstruction.
#[derive(Debug, Serialize, Deserialize)]
pub struct LatentCode {
    pub num_features: usize,
    pub values: Vec<f32>,
}

fn load_model<B: Backend>(artifact_dir: &str, device: &B::Device) -> (TrainingConfig, FoldingNet<B>) {
    let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
        .expect("Config should exist for the model; run train first");
    let record = CompactRecorder::new()
        .load(format!("{artifact_dir}/model").into(), device)
        .expect("Trained model should exist; run train first");

    let model = config.model.init::<B>(device).load_record(record);
    (config, model)
}

/// Encode an STL mesh, write its latent code and reconstructed cloud.
pub fn reconstruct<B: Backend>(artifact_dir: &str, device: B::Device, input: &Path) {
    let (config, model) = load_model::<B>(artifact_dir, &device);

    let mut file = File::open(input).expect("input mesh should be readable");
    let mesh = stl_io::read_stl(&mut file).expect("input should be a valid STL mesh");
    let points =
        sample_surface(&mesh, config.num_points).expect("mesh surface should be sampleable");

    let input_tensor = Tensor::<B, 3>::from_data(
        TensorData::new(points, [1, config.num_points, 3]),
        &device,
    );
    let (reconstructed, latent, _fold1) = model.forward(input_tensor);

    let latent_path = Path::new(artifact_dir).join("latent.json");
    let code = LatentCode {
        num_features: config.model.num_features,
        values: tensor_to_vec(latent.to_data()),
    };
    serde_json::to_writer_pretty(
        File::create(&latent_path).expect("latent file should be writable"),
        &code,
    )
    .expect("latent code should serialize");
    info!("latent code written to {}", latent_path.display());

    let out_path = Path::new(artifact_dir).join("reconstruction.vtk");
    write_vtk(&cloud_to_points(reconstructed), &out_path).expect("VTK output should be writable");
    info!("reconstruction written to {}", out_path.display());
}

/// Decode a stored latent code back into a point cloud.
pub fn generate<B: Backend>(artifact_dir: &str, device: B::Device, latent_path: &Path) {
    let (config, model) = load_model::<B>(artifact_dir, &device);

    let code: LatentCode = serde_json::from_reader(
        File::open(latent_path).expect("latent file should be readable"),
    )
    .expect("latent file should hold a latent code");
    let width = code.values.len();
    assert_eq!(
        width, config.model.num_features,
        "latent width {width} does not match the model's num_features {}",
        config.model.num_features
    );

    let latent =
        Tensor::<B, 2>::from_data(TensorData::new(code.values, [1, width]), &device);
    let (cloud, _fold1) = model.decoder.forward(latent);

    let out_path = Path::new(artifact_dir).join("generated.vtk");
    write_vtk(&cloud_to_points(cloud), &out_path).expect("VTK output should be writable");
    info!("generated cloud written to {}", out_path.display());
}

fn tensor_to_vec(data: TensorData) -> Vec<f32> {
    data.to_vec().expect("tensor data should convert to f32")
}

/// [1, M, 3] tensor -> point list.
fn cloud_to_points<B: Backend>(cloud: Tensor<B, 3>) -> Vec<[f32; 3]> {
    let data = cloud.into_data();
    let slice: &[f32] = data.as_slice().unwrap();
    slice.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

/// Legacy-ASCII VTK, one vertex cell per point.
fn write_vtk(points: &[[f32; 3]], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "foldnet point cloud")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    writeln!(w, "POINTS {} float", points.len())?;
    for &[x, y, z] in points {
        writeln!(w, "{x} {y} {z}")?;
    }

    // 1 = number of indices in the cell, then the vertex id
    writeln!(w, "CELLS {} {}", points.len(), points.len() * 2)?;
    for i in 0..points.len() {
        writeln!(w, "1 {i}")?;
    }

    // all cells are VTK_VERTEX (type 1)
    writeln!(w, "CELL_TYPES {}", points.len())?;
    for _ in 0..points.len() {
        writeln!(w, "1")?;
    }

    Ok(())
}
