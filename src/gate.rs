use std::{collections::HashMap, fmt::Debug, sync::Arc};

use crate::{
    circuit_shaders,
    controls::{qubit_mask, Controls},
    engine::Engine,
    error::{Result, SimError},
    kernel::MAX_MATRIX_SPAN,
    matrix::Matrix,
    texture::Texture,
};

/// Everything a gate sees while one column of a circuit is evaluated.
pub struct EvalArgs<'a> {
    pub engine: &'a Engine,
    /// Circuit time, in `[0, 1)` for periodic gates.
    pub time: f64,
    /// The gate's anchor qubit: its lowest target wire.
    pub row: u32,
    pub wire_count: u32,
    pub controls: Controls,
    /// [`circuit_shaders::control_mask`] of `controls` over `wire_count` qubits.
    pub controls_texture: &'a Texture,
    pub state_texture: &'a Texture,
    /// Auxiliary textures shared by the gates of one column.
    pub scratch: &'a mut HashMap<String, Texture>,
}

/// The contract every gate kernel fulfills: return a new state texture of the
/// same size, acting only where the control mask allows it.
pub trait GateKernel: Send + Sync {
    fn apply(&self, args: &mut EvalArgs<'_>) -> Result<Texture>;

    /// The wires the gate acts on when anchored at `row`.
    fn target_mask(&self, row: u32) -> Result<u32> {
        qubit_mask(row)
    }
}

/// How a gate's matrix is known, if at all.
#[derive(Clone)]
pub enum MatrixSource {
    None,
    Fixed(Matrix),
    Varying(Arc<dyn Fn(f64) -> Matrix + Send + Sync>),
}
impl Debug for MatrixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixSource::None => write!(f, "None"),
            MatrixSource::Fixed(m) => f.debug_tuple("Fixed").field(m).finish(),
            MatrixSource::Varying(_) => write!(f, "Varying(..)"),
        }
    }
}

pub type KernelFn = Arc<dyn Fn(&mut EvalArgs<'_>) -> Result<Texture> + Send + Sync>;

/// A gate descriptor: display metadata, an optional reference matrix and an
/// optional custom kernel. Gates without a kernel are applied through their matrix.
#[derive(Clone)]
pub struct Gate {
    pub symbol: String,
    pub name: String,
    pub blurb: String,
    pub serialized_id: String,
    /// Number of consecutive wires the gate covers.
    pub height: u32,
    /// How long the gate's output stays constant as time advances, if periodic.
    pub stable_duration: Option<f64>,
    matrix: MatrixSource,
    kernel: Option<KernelFn>,
    /// Absolute wire targeted besides the consecutive block.
    paired_wire: Option<u32>,
}
impl Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("symbol", &self.symbol)
            .field("serialized_id", &self.serialized_id)
            .field("height", &self.height)
            .field("matrix", &self.matrix)
            .field("custom_kernel", &self.kernel.is_some())
            .finish()
    }
}

impl Gate {
    fn describe(symbol: &str, name: &str, blurb: &str, serialized_id: &str) -> Gate {
        Gate {
            symbol: symbol.to_string(),
            name: name.to_string(),
            blurb: blurb.to_string(),
            serialized_id: serialized_id.to_string(),
            height: 1,
            stable_duration: None,
            matrix: MatrixSource::None,
            kernel: None,
            paired_wire: None,
        }
    }

    /// A gate applied through a constant matrix.
    pub fn from_matrix(symbol: &str, name: &str, matrix: Matrix) -> Result<Gate> {
        let span = matrix.qubit_span();
        if span > MAX_MATRIX_SPAN {
            return Err(SimError::MatrixTooLarge {
                span,
                max: MAX_MATRIX_SPAN,
            });
        }
        let mut gate = Gate::describe(symbol, name, "", symbol);
        gate.height = span;
        gate.matrix = MatrixSource::Fixed(matrix);
        Ok(gate)
    }

    /// A gate applied through a matrix that depends on time.
    pub fn from_varying_matrix(
        symbol: &str,
        name: &str,
        height: u32,
        matrix: impl Fn(f64) -> Matrix + Send + Sync + 'static,
    ) -> Gate {
        let mut gate = Gate::describe(symbol, name, "", symbol);
        gate.height = height;
        gate.matrix = MatrixSource::Varying(Arc::new(matrix));
        gate
    }

    pub fn with_blurb(mut self, blurb: &str) -> Gate {
        self.blurb = blurb.to_string();
        self
    }

    pub fn with_serialized_id(mut self, id: &str) -> Gate {
        self.serialized_id = id.to_string();
        self
    }

    pub fn with_height(mut self, height: u32) -> Gate {
        self.height = height;
        self
    }

    pub fn with_stable_duration(mut self, duration: f64) -> Gate {
        self.stable_duration = Some(duration);
        self
    }

    pub fn with_known_matrix(mut self, matrix: MatrixSource) -> Gate {
        self.matrix = matrix;
        self
    }

    pub fn with_custom_kernel(
        mut self,
        kernel: impl Fn(&mut EvalArgs<'_>) -> Result<Texture> + Send + Sync + 'static,
    ) -> Gate {
        self.kernel = Some(Arc::new(kernel));
        self
    }

    pub fn has_custom_kernel(&self) -> bool {
        self.kernel.is_some()
    }

    /// The gate's matrix at `time`, if it has a known one.
    pub fn matrix_at(&self, time: f64) -> Option<Matrix> {
        match &self.matrix {
            MatrixSource::None => None,
            MatrixSource::Fixed(m) => Some(m.clone()),
            MatrixSource::Varying(f) => Some(f(time)),
        }
    }

    /// Swaps its anchor wire with `other_wire`.
    pub fn swap(other_wire: u32) -> Gate {
        let mut gate = Gate::describe("Swap", "Swap Gate", "Swaps two wires.", "Swap")
            .with_known_matrix(MatrixSource::None)
            .with_custom_kernel(move |args| swap(args, other_wire));
        gate.paired_wire = Some(other_wire);
        gate
    }

    /// The anti-linear map `|0⟩ → |1⟩`, `|1⟩ → -|0⟩` with conjugated amplitudes.
    pub fn universal_not() -> Gate {
        Gate::describe(
            "UniversalNot",
            "Universal Not Gate",
            "Mirrors through the origin of the Bloch sphere. Not a unitary operation.",
            "__unstable__UniversalNot",
        )
        .with_custom_kernel(|args| universal_not(args))
    }
}

impl GateKernel for Gate {
    fn apply(&self, args: &mut EvalArgs<'_>) -> Result<Texture> {
        if let Some(kernel) = &self.kernel {
            return kernel(args);
        }
        match self.matrix_at(args.time) {
            Some(matrix) => matrix_operation(args, &matrix),
            None => Err(SimError::GateWithoutKernel {
                name: self.name.clone(),
            }),
        }
    }

    fn target_mask(&self, row: u32) -> Result<u32> {
        let top = row.saturating_add(self.height.max(1) - 1);
        // Wraps to the full upper block when `top` is the last addressable wire.
        let mut mask = (qubit_mask(top)? << 1).wrapping_sub(qubit_mask(row)?);
        if let Some(wire) = self.paired_wire {
            mask |= qubit_mask(wire)?;
        }
        Ok(mask)
    }
}

/// Apply `matrix` to the wires starting at the anchor.
pub fn matrix_operation(args: &EvalArgs<'_>, matrix: &Matrix) -> Result<Texture> {
    circuit_shaders::apply_matrix(args.state_texture, args.controls_texture, args.row, matrix)
}

/// Exchange the anchor wire with `other_wire`.
pub fn swap(args: &EvalArgs<'_>, other_wire: u32) -> Result<Texture> {
    circuit_shaders::swap(args.state_texture, args.controls_texture, args.row, other_wire)
}

pub fn universal_not(args: &EvalArgs<'_>) -> Result<Texture> {
    circuit_shaders::universal_not(args.state_texture, args.controls_texture, args.row)
}

/// Add `amount` (mod `2^span`) to the little-endian number stored in the `span` anchor wires.
pub fn increment(args: &EvalArgs<'_>, span: u32, amount: i64) -> Result<Texture> {
    circuit_shaders::offset(args.state_texture, args.controls_texture, args.row, span, amount)
}

/// Left-rotate the `span` anchor wires by `shift`.
pub fn cycle_bits(args: &EvalArgs<'_>, span: u32, shift: i64) -> Result<Texture> {
    circuit_shaders::cycle_bits(args.state_texture, args.controls_texture, args.row, span, shift)
}

pub const COUNTING_SPANS: std::ops::RangeInclusive<u32> = 1..=16;
pub const CYCLING_SPANS: std::ops::RangeInclusive<u32> = 2..=16;

/// Families only carry a reference matrix below this span.
const KNOWN_MATRIX_SPAN_LIMIT: u32 = 4;

fn check_span(family: &'static str, span: u32, spans: std::ops::RangeInclusive<u32>) -> Result<()> {
    if !spans.contains(&span) {
        return Err(SimError::UnsupportedSpan { family, span });
    }
    Ok(())
}

fn count_at(time: f64, span: u32) -> i64 {
    (time * f64::from(1u32 << span)).floor() as i64
}

fn shift_at(time: f64, span: u32) -> i64 {
    (time * f64::from(span)).floor() as i64
}

fn counting_family(span: u32, sign: i64) -> Gate {
    let (symbol, name, blurb, id) = if sign > 0 {
        (
            "+⌈t⌉",
            "Counting Gate",
            "Adds an increasing little-endian count into a block of qubits.",
            "Counting",
        )
    } else {
        (
            "-⌈t⌉",
            "Down Counting Gate",
            "Subtracts an increasing little-endian count from a block of qubits.",
            "Uncounting",
        )
    };
    let matrix = if span < KNOWN_MATRIX_SPAN_LIMIT {
        MatrixSource::Varying(Arc::new(move |t| {
            Matrix::offset_matrix(span, sign * count_at(t, span))
        }))
    } else {
        MatrixSource::None
    };
    Gate::describe(symbol, name, blurb, &format!("{id}{span}"))
        .with_height(span)
        .with_stable_duration(1.0 / f64::from(1u32 << span))
        .with_known_matrix(matrix)
        .with_custom_kernel(move |args| increment(args, span, sign * count_at(args.time, span)))
}

fn cycling_family(span: u32, sign: i64) -> Gate {
    let (symbol, name, blurb, id) = if sign > 0 {
        (
            "↡⌈t⌉",
            "Left-Shift Cycling Gate",
            "Left-rotates a block of bits by more and more.",
            "<<t",
        )
    } else {
        (
            "↟⌈t⌉",
            "Right-Shift Cycling Gate",
            "Right-rotates a block of bits by more and more.",
            ">>t",
        )
    };
    let matrix = if span < KNOWN_MATRIX_SPAN_LIMIT {
        MatrixSource::Varying(Arc::new(move |t| {
            Matrix::cycle_bits_matrix(span, sign * shift_at(t, span))
        }))
    } else {
        MatrixSource::None
    };
    Gate::describe(symbol, name, blurb, &format!("{id}{span}"))
        .with_height(span)
        .with_stable_duration(1.0 / f64::from(span))
        .with_known_matrix(matrix)
        .with_custom_kernel(move |args| cycle_bits(args, span, sign * shift_at(args.time, span)))
}

/// Adds `⌊t·2^span⌋` into a block of `span` qubits.
pub fn counting_gate(span: u32) -> Result<Gate> {
    check_span("counting", span, COUNTING_SPANS)?;
    Ok(counting_family(span, 1))
}

/// Subtracts `⌊t·2^span⌋` from a block of `span` qubits.
pub fn uncounting_gate(span: u32) -> Result<Gate> {
    check_span("uncounting", span, COUNTING_SPANS)?;
    Ok(counting_family(span, -1))
}

/// Left-rotates a block of `span` qubits by `⌊t·span⌋`.
pub fn left_shift_cycling_gate(span: u32) -> Result<Gate> {
    check_span("left-shift cycling", span, CYCLING_SPANS)?;
    Ok(cycling_family(span, 1))
}

/// Right-rotates a block of `span` qubits by `⌊t·span⌋`.
pub fn right_shift_cycling_gate(span: u32) -> Result<Gate> {
    check_span("right-shift cycling", span, CYCLING_SPANS)?;
    Ok(cycling_family(span, -1))
}

/// Xors a square wave into the target: X during the second half of every period.
pub fn clock_pulse_gate() -> Gate {
    Gate::from_varying_matrix("X^⌈t⌉", "Clock Pulse Gate", 1, |t| {
        if t.rem_euclid(1.0) < 0.5 {
            Matrix::identity(2)
        } else {
            Matrix::pauli_x()
        }
    })
    .with_blurb("Xors a square wave into the target wire.")
    .with_stable_duration(0.5)
}

/// [`clock_pulse_gate`] shifted by a quarter period.
pub fn quarter_phase_clock_pulse_gate() -> Gate {
    Gate::from_varying_matrix("X^⌈t-¼⌉", "Clock Pulse Gate (Quarter Phase)", 1, |t| {
        if (t + 0.75).rem_euclid(1.0) < 0.5 {
            Matrix::identity(2)
        } else {
            Matrix::pauli_x()
        }
    })
    .with_blurb("Xors a quarter-phased square wave into the target wire.")
    .with_stable_duration(0.25)
}

/// Every time-dependent gate: the clock pulses and each member of the counting
/// and cycling families.
pub fn all_counting_gates() -> Vec<Gate> {
    let mut gates = vec![clock_pulse_gate(), quarter_phase_clock_pulse_gate()];
    gates.extend(COUNTING_SPANS.map(|s| counting_family(s, 1)));
    gates.extend(COUNTING_SPANS.map(|s| counting_family(s, -1)));
    gates.extend(CYCLING_SPANS.map(|s| cycling_family(s, -1)));
    gates.extend(CYCLING_SPANS.map(|s| cycling_family(s, 1)));
    gates
}
