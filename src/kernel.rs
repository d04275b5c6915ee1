use crate::{
    controls::Controls,
    error::{Result, SimError},
    texture::{Format, TextureShape},
};

/// Largest number of qubits a matrix passed to [`Kernel::ApplyMatrix`] may span.
pub const MAX_MATRIX_SPAN: u32 = 4;

/// Mask texels above this value mark a basis state as allowed.
pub(crate) const MASK_THRESHOLD: f32 = 0.5;

/// Preference for the first operand when folding representatives,
/// keeping the choice stable for uniform superpositions and noise.
pub(crate) const REPRESENTATIVE_BIAS: f32 = 1.001;

/// Relative error above which two ratio vectors are considered inconsistent.
pub(crate) const RATIO_TOLERANCE: f32 = 0.001;

/// Lower clamp of the ratio error denominator.
pub(crate) const RATIO_DENOMINATOR_FLOOR: f32 = 1e-11;

/// The layout an input binding accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Exactly(Format),
    /// Any layout; the output shares it.
    Any,
}

/// A data-parallel kernel: a pure function from basis index to output texel.
///
/// Every variant corresponds to one entry point of the compute backends.
/// A kernel never reads outside its inputs; out-of-range reads yield zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// 1.0 where the controls allow the basis state, 0.0 elsewhere.
    ControlMask { controls: Controls },
    /// Restrict the input to the allowed states and drop the controlled bits.
    ControlSelect { controls: Controls },
    /// One-hot amplitude texture.
    ClassicalState { index: u32 },
    /// Background (input 1) with the foreground (input 0) written from `offset` on.
    LinearOverlay { offset: u32 },
    /// Apply the matrix in input 2 to `span` qubits starting at `qubit`,
    /// where the control mask in input 1 allows it.
    ApplyMatrix { qubit: u32, span: u32 },
    Swap { qubit: u32, other: u32 },
    /// Rotate the `span` bits starting at `qubit` left by `shift`.
    CycleBits { qubit: u32, span: u32, shift: u32 },
    /// Add `amount` modulo `2^span` to the `span` bits starting at `qubit`.
    Offset { qubit: u32, span: u32, amount: u32 },
    /// The anti-linear map `a0' = conj(a1)`, `a1' = -conj(a0)`.
    UniversalNot { qubit: u32 },
    /// Rotate every bit of the index left by `shift`.
    CycleAllBits { shift: u32 },
    /// Partial density matrix terms for each qubit in the `kept` mask.
    QubitDensities { kept: u32 },
    AmplitudesToPolar,
    SpreadLength { bit: u32 },
    FoldRepresentative,
    ConvertAwayFromPolar,
    RatiosVsRepresentative,
    FoldConsistentRatios { bit: u32 },
    /// Add the upper half of the input onto the lower half.
    SumFold,
}

use Binding::*;
use Format::*;

impl Kernel {
    /// The entry point name.
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::ControlMask { .. } => "control_mask",
            Kernel::ControlSelect { .. } => "control_select",
            Kernel::ClassicalState { .. } => "classical_state",
            Kernel::LinearOverlay { .. } => "linear_overlay",
            Kernel::ApplyMatrix { .. } => "apply_matrix",
            Kernel::Swap { .. } => "swap",
            Kernel::CycleBits { .. } => "cycle_bits",
            Kernel::Offset { .. } => "offset",
            Kernel::UniversalNot { .. } => "universal_not",
            Kernel::CycleAllBits { .. } => "cycle_all_bits",
            Kernel::QubitDensities { .. } => "qubit_densities",
            Kernel::AmplitudesToPolar => "amplitudes_to_polar",
            Kernel::SpreadLength { .. } => "spread_length",
            Kernel::FoldRepresentative => "fold_representative",
            Kernel::ConvertAwayFromPolar => "convert_away_from_polar",
            Kernel::RatiosVsRepresentative => "ratios_vs_representative",
            Kernel::FoldConsistentRatios { .. } => "fold_consistent_ratios",
            Kernel::SumFold => "sum_fold",
        }
    }

    /// Every entry point, in the order the backends compile them.
    pub const ENTRY_POINTS: [&'static str; 18] = [
        "control_mask",
        "control_select",
        "classical_state",
        "linear_overlay",
        "apply_matrix",
        "swap",
        "cycle_bits",
        "offset",
        "universal_not",
        "cycle_all_bits",
        "qubit_densities",
        "amplitudes_to_polar",
        "spread_length",
        "fold_representative",
        "convert_away_from_polar",
        "ratios_vs_representative",
        "fold_consistent_ratios",
        "sum_fold",
    ];

    pub fn bindings(&self) -> &'static [Binding] {
        match self {
            Kernel::ControlMask { .. } | Kernel::ClassicalState { .. } => &[],
            Kernel::ControlSelect { .. } | Kernel::CycleAllBits { .. } | Kernel::SumFold => &[Any],
            Kernel::LinearOverlay { .. } => &[Any, Any],
            Kernel::ApplyMatrix { .. } => &[Exactly(Vec2), Exactly(Mask), Exactly(Vec2)],
            Kernel::Swap { .. }
            | Kernel::CycleBits { .. }
            | Kernel::Offset { .. }
            | Kernel::UniversalNot { .. } => &[Exactly(Vec2), Exactly(Mask)],
            Kernel::QubitDensities { .. } | Kernel::AmplitudesToPolar => &[Exactly(Vec2)],
            Kernel::SpreadLength { .. }
            | Kernel::FoldRepresentative
            | Kernel::ConvertAwayFromPolar
            | Kernel::FoldConsistentRatios { .. } => &[Exactly(Vec4)],
            Kernel::RatiosVsRepresentative => &[Exactly(Vec2), Exactly(Vec4)],
        }
    }

    /// The output layout, given the (already checked) input layouts.
    pub fn output_format(&self, inputs: &[Format]) -> Format {
        match self {
            Kernel::ControlMask { .. } => Mask,
            Kernel::ControlSelect { .. } | Kernel::CycleAllBits { .. } | Kernel::SumFold => {
                inputs.first().copied().unwrap_or(Vec2)
            }
            Kernel::LinearOverlay { .. } => inputs.get(1).copied().unwrap_or(Vec2),
            Kernel::ClassicalState { .. }
            | Kernel::ApplyMatrix { .. }
            | Kernel::Swap { .. }
            | Kernel::CycleBits { .. }
            | Kernel::Offset { .. }
            | Kernel::UniversalNot { .. } => Vec2,
            Kernel::QubitDensities { .. }
            | Kernel::AmplitudesToPolar
            | Kernel::SpreadLength { .. }
            | Kernel::FoldRepresentative
            | Kernel::ConvertAwayFromPolar
            | Kernel::RatiosVsRepresentative
            | Kernel::FoldConsistentRatios { .. } => Vec4,
        }
    }

    /// The scalar arguments handed to the backends.
    pub fn params(&self) -> [u32; 4] {
        match *self {
            Kernel::ControlMask { controls } | Kernel::ControlSelect { controls } => [
                controls.inclusion_mask(),
                controls.desired_value_mask(),
                0,
                0,
            ],
            Kernel::ClassicalState { index } => [index, 0, 0, 0],
            Kernel::LinearOverlay { offset } => [offset, 0, 0, 0],
            Kernel::ApplyMatrix { qubit, span } => [qubit, span, 0, 0],
            Kernel::Swap { qubit, other } => [qubit, other, 0, 0],
            Kernel::CycleBits { qubit, span, shift } => [qubit, span, shift, 0],
            Kernel::Offset { qubit, span, amount } => [qubit, span, amount, 0],
            Kernel::UniversalNot { qubit } => [qubit, 0, 0, 0],
            Kernel::CycleAllBits { shift } => [shift, 0, 0, 0],
            Kernel::QubitDensities { kept } => [kept, kept.count_ones(), 0, 0],
            Kernel::SpreadLength { bit } | Kernel::FoldConsistentRatios { bit } => [bit, 0, 0, 0],
            Kernel::AmplitudesToPolar
            | Kernel::FoldRepresentative
            | Kernel::ConvertAwayFromPolar
            | Kernel::RatiosVsRepresentative
            | Kernel::SumFold => [0; 4],
        }
    }

    /// Validate the input count, input layouts and sizes against an output of `out_qubits`.
    ///
    /// Returns the output shape.
    pub fn check(&self, inputs: &[TextureShape], out_qubits: u32) -> Result<TextureShape> {
        let kernel = self.name();
        let bindings = self.bindings();
        if inputs.len() != bindings.len() {
            return Err(SimError::InputCountMismatch {
                kernel,
                expected: bindings.len(),
                actual: inputs.len(),
            });
        }
        for (input, (binding, shape)) in bindings.iter().zip(inputs).enumerate() {
            if let Exactly(expected) = *binding {
                if shape.format() != expected {
                    return Err(SimError::FormatMismatch {
                        kernel,
                        input,
                        expected,
                        actual: shape.format(),
                    });
                }
            }
        }
        if let Kernel::LinearOverlay { .. } = self {
            if inputs[0].format() != inputs[1].format() {
                return Err(SimError::FormatMismatch {
                    kernel,
                    input: 0,
                    expected: inputs[1].format(),
                    actual: inputs[0].format(),
                });
            }
        }

        let expected_out = self.expected_output_qubits(inputs)?;
        if let Some(expected) = expected_out {
            if expected != out_qubits {
                return Err(SimError::StageSizeMismatch {
                    kernel,
                    expected,
                    actual: out_qubits,
                });
            }
        }
        self.check_arguments(out_qubits)?;

        let formats: Vec<Format> = inputs.iter().map(|s| s.format()).collect();
        Ok(TextureShape::new(out_qubits, self.output_format(&formats)))
    }

    /// The output size implied by the inputs, or `None` if the caller chooses it.
    fn expected_output_qubits(&self, inputs: &[TextureShape]) -> Result<Option<u32>> {
        let kernel = self.name();
        let same_size = |a: &TextureShape, b: &TextureShape| {
            if a.qubits() != b.qubits() {
                return Err(SimError::StageSizeMismatch {
                    kernel,
                    expected: a.qubits(),
                    actual: b.qubits(),
                });
            }
            Ok(())
        };
        let halved = |shape: &TextureShape| {
            shape
                .qubits()
                .checked_sub(1)
                .ok_or(SimError::StageSizeMismatch {
                    kernel,
                    expected: 1,
                    actual: 0,
                })
        };

        Ok(match self {
            Kernel::ControlMask { .. } | Kernel::ClassicalState { .. } => None,
            Kernel::ControlSelect { controls } => {
                let q = inputs[0].qubits();
                check_mask_in_range(controls.inclusion_mask(), q)?;
                Some(q - controls.included_qubit_count())
            }
            Kernel::LinearOverlay { .. } => Some(inputs[1].qubits()),
            Kernel::ApplyMatrix { span, .. } => {
                same_size(&inputs[0], &inputs[1])?;
                if *span > MAX_MATRIX_SPAN {
                    return Err(SimError::MatrixTooLarge {
                        span: *span,
                        max: MAX_MATRIX_SPAN,
                    });
                }
                if inputs[2].qubits() != 2 * span {
                    return Err(SimError::StageSizeMismatch {
                        kernel,
                        expected: 2 * span,
                        actual: inputs[2].qubits(),
                    });
                }
                Some(inputs[0].qubits())
            }
            Kernel::Swap { .. }
            | Kernel::CycleBits { .. }
            | Kernel::Offset { .. }
            | Kernel::UniversalNot { .. } => {
                same_size(&inputs[0], &inputs[1])?;
                Some(inputs[0].qubits())
            }
            Kernel::CycleAllBits { .. }
            | Kernel::AmplitudesToPolar
            | Kernel::SpreadLength { .. }
            | Kernel::ConvertAwayFromPolar => Some(inputs[0].qubits()),
            Kernel::QubitDensities { kept } => {
                let n = inputs[0].qubits();
                if *kept == 0 {
                    return Err(SimError::EmptyKeptMask);
                }
                check_mask_in_range(*kept, n)?;
                Some(ceil_log2(kept.count_ones()) + n - 1)
            }
            Kernel::RatiosVsRepresentative => {
                let (n, l) = (inputs[0].qubits(), inputs[1].qubits());
                if l > n {
                    return Err(SimError::StageSizeMismatch {
                        kernel,
                        expected: n,
                        actual: l,
                    });
                }
                Some(n)
            }
            Kernel::FoldRepresentative | Kernel::FoldConsistentRatios { .. } | Kernel::SumFold => {
                Some(halved(&inputs[0])?)
            }
        })
    }

    fn check_arguments(&self, out_qubits: u32) -> Result<()> {
        let in_range = |qubit: u32, span: u32| {
            if qubit.saturating_add(span) > out_qubits {
                return Err(SimError::QubitOutOfRange {
                    index: qubit.saturating_add(span).saturating_sub(1),
                    qubits: out_qubits,
                });
            }
            Ok(())
        };
        let power_of_two_below = |bit: u32, qubits: u32| {
            if !bit.is_power_of_two() || bit.ilog2() >= qubits {
                return Err(SimError::QubitOutOfRange {
                    index: bit.checked_ilog2().unwrap_or(u32::MAX),
                    qubits,
                });
            }
            Ok(())
        };
        match *self {
            Kernel::ControlMask { controls } => check_mask_in_range(controls.inclusion_mask(), out_qubits),
            Kernel::ClassicalState { index } => {
                if out_qubits < u32::BITS && index >= 1 << out_qubits {
                    return Err(SimError::QubitOutOfRange {
                        index: index.ilog2(),
                        qubits: out_qubits,
                    });
                }
                Ok(())
            }
            Kernel::ApplyMatrix { qubit, span }
            | Kernel::CycleBits { qubit, span, .. }
            | Kernel::Offset { qubit, span, .. } => in_range(qubit, span),
            Kernel::Swap { qubit, other } => {
                in_range(qubit, 1)?;
                in_range(other, 1)
            }
            Kernel::UniversalNot { qubit } => in_range(qubit, 1),
            Kernel::CycleAllBits { shift } => {
                if shift != 0 && shift >= out_qubits {
                    return Err(SimError::QubitOutOfRange {
                        index: shift,
                        qubits: out_qubits,
                    });
                }
                Ok(())
            }
            Kernel::SpreadLength { bit } => power_of_two_below(bit, out_qubits),
            Kernel::FoldConsistentRatios { bit } => power_of_two_below(bit, out_qubits + 1),
            _ => Ok(()),
        }
    }
}

fn check_mask_in_range(mask: u32, qubits: u32) -> Result<()> {
    if mask == 0 {
        return Ok(());
    }
    let highest = mask.ilog2();
    if highest >= qubits {
        return Err(SimError::QubitOutOfRange {
            index: highest,
            qubits,
        });
    }
    Ok(())
}

/// Smallest `b` with `2^b >= n`.
pub(crate) fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        u32::BITS - (n - 1).leading_zeros()
    }
}

/// Rotate the lowest `width` bits of `value` right by `shift`.
pub(crate) fn rotate_right(value: u32, shift: u32, width: u32) -> u32 {
    if width == 0 {
        return value;
    }
    let shift = shift % width;
    if shift == 0 {
        return value;
    }
    let mask = if width >= u32::BITS {
        u32::MAX
    } else {
        (1 << width) - 1
    };
    let v = value & mask;
    ((v >> shift) | (v << (width - shift))) & mask
}
