use std::collections::HashMap;

use log::{debug, trace};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    circuit_shaders,
    controls::Controls,
    engine::Engine,
    error::{Result, SimError},
    gate::{self, EvalArgs, Gate, GateKernel},
    matrix::Matrix,
    state::AmplitudeState,
    texture::Texture,
};

/// Apply every gate of one circuit column to `state`, each anchored at its row
/// and conditioned on `controls`.
///
/// Gates are applied in order; the input state is left untouched.
pub fn evaluate_column(
    state: &AmplitudeState,
    controls: Controls,
    gates: &[(u32, &dyn GateKernel)],
    time: f64,
) -> Result<AmplitudeState> {
    let qubits = state.qubits();
    for &(row, gate) in gates {
        check_targets(gate.target_mask(row)?, controls, qubits)?;
    }

    let engine = state.engine();
    let controls_texture = circuit_shaders::control_mask(engine, controls, qubits)?;
    let mut scratch: HashMap<String, Texture> = HashMap::new();
    let mut current: Option<Texture> = None;
    for &(row, gate) in gates {
        let next = {
            let mut args = EvalArgs {
                engine,
                time,
                row,
                wire_count: qubits,
                controls,
                controls_texture: &controls_texture,
                state_texture: current.as_ref().unwrap_or(state.texture()),
                scratch: &mut scratch,
            };
            gate.apply(&mut args)?
        };
        if next.shape() != state.texture().shape() {
            return Err(SimError::StageSizeMismatch {
                kernel: "gate",
                expected: qubits,
                actual: next.qubits(),
            });
        }
        current = Some(next);
    }
    trace!("evaluated a column of {} gate(s) at t = {time}", gates.len());

    let texture = match current {
        Some(texture) => texture,
        None => circuit_shaders::cycle_all_bits(state.texture(), 0)?,
    };
    AmplitudeState::new(texture)
}

fn check_targets(targets: u32, controls: Controls, qubits: u32) -> Result<()> {
    let highest = targets.checked_ilog2().unwrap_or(0);
    if highest >= qubits {
        return Err(SimError::QubitOutOfRange {
            index: highest,
            qubits,
        });
    }
    let overlap = targets & controls.inclusion_mask();
    if overlap != 0 {
        return Err(SimError::ControlsOverlapTargets { overlap });
    }
    Ok(())
}

/// One column of a circuit: shared controls and the gates placed in it.
#[derive(Debug, Clone, Default)]
pub struct Column {
    controls: Controls,
    gates: Vec<(u32, Gate)>,
}
impl Column {
    pub fn new() -> Self {
        Column::default()
    }

    /// Condition the column on `qubit` being `desired`.
    pub fn with_control(mut self, qubit: u32, desired: bool) -> Result<Self> {
        self.controls = self.controls.and(Controls::bit(qubit, desired)?)?;
        Ok(self)
    }

    /// Place `gate` with its anchor on wire `row`.
    pub fn with_gate(mut self, row: u32, gate: Gate) -> Self {
        self.gates.push((row, gate));
        self
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn gates(&self) -> &[(u32, Gate)] {
        &self.gates
    }

    pub fn evaluate(&self, state: &AmplitudeState, time: f64) -> Result<AmplitudeState> {
        let gates: Vec<(u32, &dyn GateKernel)> = self
            .gates
            .iter()
            .map(|(row, gate)| (*row, gate as &dyn GateKernel))
            .collect();
        evaluate_column(state, self.controls, &gates, time)
    }
}

/// A sequence of columns over a fixed number of wires.
#[derive(Debug, Clone)]
pub struct Circuit {
    qubits: u32,
    columns: Vec<Column>,
}
impl Circuit {
    pub fn new(qubits: u32, columns: impl IntoIterator<Item = Column>) -> Result<Self> {
        if qubits == 0 {
            return Err(SimError::ZeroQubits);
        }
        let columns: Vec<Column> = columns.into_iter().collect();
        for column in &columns {
            let controls = column.controls.inclusion_mask();
            if controls != 0 && controls.ilog2() >= qubits {
                return Err(SimError::QubitOutOfRange {
                    index: controls.ilog2(),
                    qubits,
                });
            }
            for (row, gate) in &column.gates {
                check_targets(gate.target_mask(*row)?, column.controls, qubits)?;
            }
        }
        Ok(Circuit { qubits, columns })
    }

    /// A random circuit of single-qubit Paulis and Hadamards, controlled
    /// swaps and counting gates.
    pub fn random(qubits: u32, columns: usize, seed: u64) -> Result<Self> {
        if qubits == 0 {
            return Err(SimError::ZeroQubits);
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let columns = (0..columns)
            .map(|_| -> Result<Column> {
                let row = rng.random_range(0..qubits);
                let gate = match rng.random_range(0..=5) {
                    0 => Gate::from_matrix("X", "Pauli X Gate", Matrix::pauli_x())?,
                    1 => Gate::from_matrix("Y", "Pauli Y Gate", Matrix::pauli_y())?,
                    2 => Gate::from_matrix("Z", "Pauli Z Gate", Matrix::pauli_z())?,
                    3 => Gate::from_matrix("H", "Hadamard Gate", Matrix::hadamard())?,
                    4 if qubits > 1 => {
                        let mut other = row;
                        while other == row {
                            other = rng.random_range(0..qubits);
                        }
                        Gate::swap(other)
                    }
                    _ => gate::counting_gate(1)?,
                };
                let mut column = Column::new();
                let wires = u32::MAX >> (u32::BITS - qubits.min(u32::BITS));
                let free = !gate.target_mask(row)? & wires;
                if free != 0 && rng.random_bool(0.5) {
                    let candidates: Vec<u32> = (0..u32::BITS).filter(|q| free & (1 << q) != 0).collect();
                    let control = candidates[rng.random_range(0..candidates.len())];
                    column = column.with_control(control, rng.random_bool(0.5))?;
                }
                Ok(column.with_gate(row, gate))
            })
            .collect::<Result<Vec<Column>>>()?;
        Circuit::new(qubits, columns)
    }

    pub fn qubits(&self) -> u32 {
        self.qubits
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// Run `circuit` on `|0…0⟩` at `time`, returning the final state.
pub fn simulate_circuit(engine: &Engine, circuit: &Circuit, time: f64) -> Result<AmplitudeState> {
    let mut state = AmplitudeState::classical(engine, circuit.qubits(), 0)?;
    for column in &circuit.columns {
        state = column.evaluate(&state, time)?;
    }
    debug!(
        "simulated {} column(s) over {} qubit(s)",
        circuit.columns.len(),
        circuit.qubits
    );
    Ok(state)
}
