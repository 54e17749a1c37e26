use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::PathBuf;

use crate::config::LinkConfig;
use crate::linking::link;
use crate::predict::PredictorKind;
use crate::structure::Position;
use crate::trajectory::{CsvTrajectory, Trajectory};

fn build_config(
    search_range: f64,
    memory: usize,
    max_subnet_size: usize,
    predictor: &str,
) -> PyResult<LinkConfig> {
    let predictor: PredictorKind = predictor
        .parse()
        .map_err(PyErr::new::<pyo3::exceptions::PyValueError, _>)?;
    Ok(LinkConfig {
        search_range,
        memory,
        max_subnet_size,
        predictor,
        ..LinkConfig::default()
    })
}

/// Python binding for linking a particle CSV file
#[pyfunction]
#[pyo3(signature = (input, search_range=1.5, memory=0, max_subnet_size=45, pos_columns=None, frame_column="frame", predictor="nearest-velocity", output=None))]
#[allow(clippy::too_many_arguments)]
fn link_csv(
    py: Python<'_>,
    input: &str,
    search_range: f64,
    memory: usize,
    max_subnet_size: usize,
    pos_columns: Option<Vec<String>>,
    frame_column: &str,
    predictor: &str,
    output: Option<&str>,
) -> PyResult<PyObject> {
    let mut config = build_config(search_range, memory, max_subnet_size, predictor)?;
    if let Some(columns) = pos_columns {
        config.pos_columns = columns;
    }
    config.frame_column = frame_column.to_string();

    let trajectory = CsvTrajectory::new(input);
    let output_path = output.map(PathBuf::from);

    let summary = trajectory
        .link(&config, output_path.as_deref(), false)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("Failed to link trajectories: {}", e)))?;

    let py_summary = PyDict::new_bound(py);
    py_summary.set_item("rows", summary.rows)?;
    py_summary.set_item("frames", summary.frames)?;
    py_summary.set_item("trajectories", summary.trajectories)?;
    py_summary.set_item("output", output.unwrap_or(input))?;

    Ok(py_summary.into())
}

/// Python binding for linking in-memory positions
#[pyfunction]
#[pyo3(signature = (frames, positions, search_range=1.5, memory=0, max_subnet_size=45, predictor="nearest-velocity"))]
fn link_positions(
    frames: Vec<i64>,
    positions: Vec<Vec<f64>>,
    search_range: f64,
    memory: usize,
    max_subnet_size: usize,
    predictor: &str,
) -> PyResult<Vec<i64>> {
    let mut config = build_config(search_range, memory, max_subnet_size, predictor)?;
    let dim = positions.first().map(Vec::len).unwrap_or(1);
    config.pos_columns = (0..dim.max(1)).map(|axis| format!("axis_{}", axis)).collect();

    let positions: Vec<Position> = positions.into_iter().map(Position::new).collect();
    link(&frames, &positions, &config)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("Failed to link positions: {}", e)))
}

/// Python module definition
#[pymodule]
fn particle_linking(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(link_csv, m)?)?;
    m.add_function(wrap_pyfunction!(link_positions, m)?)?;
    m.add("__doc__", "Particle trajectory linking with Python bindings")?;
    Ok(())
}
