use num_complex::Complex;
use pyo3::prelude::*;

use crate::{
    amplitudes::{compute_amplitude_display, SuperpositionReadout},
    controls::Controls,
    density::read_qubit_densities,
    engine::{initialize_global, Engine},
    error::SimError,
    gate::{self, Gate, GateKernel},
    matrix::Matrix,
    simulate::evaluate_column,
    state::AmplitudeState,
};

impl From<SimError> for PyErr {
    fn from(value: SimError) -> Self {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(value.to_string())
    }
}

/// A gate that can be placed in a column.
#[pyclass(name = "Gate", frozen)]
#[derive(Debug, Clone)]
pub struct PyGate(Gate);
#[pymethods]
impl PyGate {
    /// A gate applying the given square matrix, given as rows of complex numbers.
    #[staticmethod]
    fn matrix(symbol: &str, rows: Vec<Vec<Complex<f64>>>) -> PyResult<Self> {
        let rows: Vec<&[Complex<f64>]> = rows.iter().map(|r| r.as_slice()).collect();
        Ok(PyGate(Gate::from_matrix(symbol, symbol, Matrix::from_rows(&rows)?)?))
    }

    #[staticmethod]
    fn counting(span: u32) -> PyResult<Self> {
        Ok(PyGate(gate::counting_gate(span)?))
    }

    #[staticmethod]
    fn uncounting(span: u32) -> PyResult<Self> {
        Ok(PyGate(gate::uncounting_gate(span)?))
    }

    #[staticmethod]
    fn left_shift_cycling(span: u32) -> PyResult<Self> {
        Ok(PyGate(gate::left_shift_cycling_gate(span)?))
    }

    #[staticmethod]
    fn right_shift_cycling(span: u32) -> PyResult<Self> {
        Ok(PyGate(gate::right_shift_cycling_gate(span)?))
    }

    #[staticmethod]
    fn clock_pulse() -> Self {
        PyGate(gate::clock_pulse_gate())
    }

    #[staticmethod]
    fn quarter_phase_clock_pulse() -> Self {
        PyGate(gate::quarter_phase_clock_pulse_gate())
    }

    #[staticmethod]
    fn swap(other_wire: u32) -> Self {
        PyGate(Gate::swap(other_wire))
    }

    #[staticmethod]
    fn universal_not() -> Self {
        PyGate(Gate::universal_not())
    }

    #[getter]
    fn serialized_id(&self) -> String {
        self.0.serialized_id.clone()
    }

    #[getter]
    fn height(&self) -> u32 {
        self.0.height
    }

    fn __repr__(&self) -> String {
        format!("Gate({})", self.0.serialized_id)
    }
}

/// The result of an amplitude display.
#[pyclass(name = "Readout", frozen)]
#[derive(Debug, Clone)]
pub struct PyReadout(SuperpositionReadout);
#[pymethods]
impl PyReadout {
    /// The range's amplitudes, or `None` if it is entangled with other wires.
    #[getter]
    fn amplitudes(&self) -> Option<Vec<Complex<f32>>> {
        self.0.amplitudes().map(<[_]>::to_vec)
    }

    /// Per-state probabilities, or `None` if amplitudes are available.
    #[getter]
    fn probabilities(&self) -> Option<Vec<f32>> {
        self.0.probabilities().map(<[_]>::to_vec)
    }

    #[getter]
    fn phase_lock_index(&self) -> Option<usize> {
        self.0.phase_lock_index()
    }

    #[getter]
    fn is_pure(&self) -> bool {
        self.0.is_pure()
    }
}

fn state_from(amplitudes: &[Complex<f32>]) -> PyResult<AmplitudeState> {
    Ok(AmplitudeState::from_amplitudes(&Engine::global()?, amplitudes)?)
}

/// Apply one column of `(row, gate)` pairs to the given amplitudes.
#[pyfunction]
#[pyo3(name = "evaluate_column", signature = (amplitudes, gates, inclusion_mask=0, desired_value_mask=0, time=0.0))]
fn py_evaluate_column(
    amplitudes: Vec<Complex<f32>>,
    gates: Vec<(u32, PyGate)>,
    inclusion_mask: u32,
    desired_value_mask: u32,
    time: f64,
) -> PyResult<Vec<Complex<f32>>> {
    let state = state_from(&amplitudes)?;
    let gates: Vec<(u32, &dyn GateKernel)> = gates
        .iter()
        .map(|(row, gate)| (*row, &gate.0 as &dyn GateKernel))
        .collect();
    let controls = Controls::new(inclusion_mask, desired_value_mask);
    Ok(evaluate_column(&state, controls, &gates, time)?.read_amplitudes()?)
}

/// Per-qubit `(p00, p01, p11)` density entries.
#[pyfunction]
#[pyo3(name = "qubit_densities", signature = (amplitudes, kept=None))]
fn py_qubit_densities(
    amplitudes: Vec<Complex<f32>>,
    kept: Option<u32>,
) -> PyResult<Vec<(f32, Complex<f32>, f32)>> {
    let state = state_from(&amplitudes)?;
    Ok(read_qubit_densities(&state, kept)?
        .into_iter()
        .map(|d| (d.p00, d.p01, d.p11))
        .collect())
}

#[pyfunction]
#[pyo3(name = "amplitude_display", signature = (amplitudes, range_offset, range_length, inclusion_mask=0, desired_value_mask=0))]
fn py_amplitude_display(
    amplitudes: Vec<Complex<f32>>,
    range_offset: u32,
    range_length: u32,
    inclusion_mask: u32,
    desired_value_mask: u32,
) -> PyResult<PyReadout> {
    let state = state_from(&amplitudes)?;
    let controls = Controls::new(inclusion_mask, desired_value_mask);
    Ok(PyReadout(compute_amplitude_display(
        &state,
        controls,
        range_offset,
        range_length,
    )?))
}

#[pymodule]
#[pyo3(name = "qshade")]
pub fn python_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    initialize_global()?;
    m.add_class::<PyGate>()?;
    m.add_class::<PyReadout>()?;
    m.add_function(wrap_pyfunction!(py_evaluate_column, m)?)?;
    m.add_function(wrap_pyfunction!(py_qubit_densities, m)?)?;
    m.add_function(wrap_pyfunction!(py_amplitude_display, m)?)?;
    Ok(())
}
