//! Amplitudes of a qubit range, when that range is not entangled with the rest.
//!
//! The pipeline restricts the state to the states the controls allow, moves
//! the range to the low bits, and then builds two things side by side: a
//! representative amplitude vector for the range (the branch of the other
//! qubits carrying the most mass) and a verdict on whether every branch is a
//! multiple of that representative. Inconsistent branches poison the verdict
//! with NaN.

use log::debug;
use num_complex::Complex;

use crate::{
    controls::Controls,
    error::{Result, SimError},
    kernel::Kernel,
    pipeline::{ShaderPipeline, Source, StageId},
    state::AmplitudeState,
};

/// A representative must beat every earlier candidate's squared magnitude by
/// this factor to become the phase reference.
pub const PHASE_LOCK_DOMINANCE: f32 = 10000.0;

/// What an amplitude display reports for its range.
#[derive(Debug, Clone, PartialEq)]
pub enum SuperpositionReadout {
    /// The range is separable: its amplitude vector, normalized, with the
    /// global phase fixed so the amplitude at `phase_lock_index` is real and positive.
    Amplitudes {
        amplitudes: Vec<Complex<f32>>,
        /// `None` when the range covers the whole register.
        phase_lock_index: Option<usize>,
    },
    /// The range is entangled with other qubits: per-state probabilities.
    Probabilities(Vec<f32>),
    /// There was no probability mass to normalize by.
    Ambiguous,
}
impl SuperpositionReadout {
    pub fn amplitudes(&self) -> Option<&[Complex<f32>]> {
        match self {
            SuperpositionReadout::Amplitudes { amplitudes, .. } => Some(amplitudes),
            _ => None,
        }
    }

    pub fn probabilities(&self) -> Option<&[f32]> {
        match self {
            SuperpositionReadout::Probabilities(p) => Some(p),
            _ => None,
        }
    }

    pub fn phase_lock_index(&self) -> Option<usize> {
        match self {
            SuperpositionReadout::Amplitudes {
                phase_lock_index, ..
            } => *phase_lock_index,
            _ => None,
        }
    }

    pub fn is_pure(&self) -> bool {
        matches!(self, SuperpositionReadout::Amplitudes { .. })
    }
}

/// The stages of an amplitude display, plus the stage holding the representative.
#[derive(Debug, Clone)]
pub struct AmplitudeSpanPipeline {
    pub pipeline: ShaderPipeline,
    pub representative: StageId,
}

/// Build the pipeline for a state of `qubits` qubits.
pub fn amplitude_span_pipeline(
    qubits: u32,
    controls: Controls,
    range_offset: u32,
    range_length: u32,
) -> Result<AmplitudeSpanPipeline> {
    if range_length == 0 {
        return Err(SimError::EmptyRange);
    }
    let end = range_offset.saturating_add(range_length);
    if end > qubits {
        return Err(SimError::QubitOutOfRange {
            index: end - 1,
            qubits,
        });
    }
    let range_mask = (((1u64 << range_length) - 1) << range_offset) as u32;
    let overlap = controls.inclusion_mask() & range_mask;
    if overlap != 0 {
        return Err(SimError::ControlsOverlapTargets { overlap });
    }

    let total = qubits - controls.included_qubit_count();
    let lost_head = (controls.inclusion_mask() & ((1u32 << range_offset) - 1)).count_ones();
    let len = range_length;
    let cycle_offset = range_offset - lost_head;

    let mut p = ShaderPipeline::new();
    p.add_step(Kernel::ControlSelect { controls }, total);
    let shift = if total == 0 {
        0
    } else {
        (total - cycle_offset % total) % total
    };
    let cycled = p.add_step(Kernel::CycleAllBits { shift }, total);

    p.add_step(Kernel::AmplitudesToPolar, total);
    for bit in 0..len {
        p.add_step(Kernel::SpreadLength { bit: 1 << bit }, total);
    }
    for i in 0..total - len {
        p.add_step(Kernel::FoldRepresentative, total - i - 1);
    }
    let representative = p.add_kept_step(Kernel::ConvertAwayFromPolar, len);

    p.add_step_reading(
        Kernel::RatiosVsRepresentative,
        total,
        &[Source::Stage(cycled), Source::Stage(representative)],
    );
    for i in 0..len {
        p.add_step(
            Kernel::FoldConsistentRatios {
                bit: 1 << (len - i - 1),
            },
            total - i - 1,
        );
    }
    for q in (0..total - len).rev() {
        p.add_step(Kernel::SumFold, q);
    }

    Ok(AmplitudeSpanPipeline {
        pipeline: p,
        representative,
    })
}

/// Run an amplitude display over `range_length` qubits starting at `range_offset`,
/// restricted to the states `controls` allows.
pub fn compute_amplitude_display(
    state: &AmplitudeState,
    controls: Controls,
    range_offset: u32,
    range_length: u32,
) -> Result<SuperpositionReadout> {
    let AmplitudeSpanPipeline {
        pipeline,
        representative,
    } = amplitude_span_pipeline(state.qubits(), controls, range_offset, range_length)?;
    let mut output = pipeline.run(state.engine(), state.texture())?;

    let consistent = output.output().read_pixels()?;
    let ket = match output.take_kept(representative) {
        Some(texture) => texture.read_vec4()?,
        None => return Err(SimError::EmptyPipeline),
    };
    let whole_register = range_length == state.qubits();
    Ok(finalize_readout(&ket, &consistent, whole_register))
}

/// Turn the representative texels and the consistency verdict into a readout.
pub(crate) fn finalize_readout(
    ket: &[[f32; 4]],
    consistent: &[f32],
    whole_register: bool,
) -> SuperpositionReadout {
    let is_pure = consistent.first().is_some_and(|v| !v.is_nan());
    let unity = ket.first().map_or(0.0, |t| t[2]);
    if !(unity > 0.0 && unity.is_finite()) {
        debug!("amplitude display has no probability mass (unity = {unity})");
        return SuperpositionReadout::Ambiguous;
    }
    if !is_pure {
        debug!("amplitude display range is entangled; reporting probabilities");
        return SuperpositionReadout::Probabilities(
            ket.iter()
                .map(|t| (t[0] * t[0] + t[1] * t[1]) / unity)
                .collect(),
        );
    }

    let phase_lock_index = (!whole_register).then(|| pick_phase_lock_index(ket));
    let phase = phase_lock_index.map_or(0.0, |i| ket[i][1].atan2(ket[i][0]));
    let rotation = Complex::from_polar(1.0 / unity.sqrt(), -phase);
    debug!("amplitude display range is separable; phase lock {phase_lock_index:?}");
    SuperpositionReadout::Amplitudes {
        amplitudes: ket
            .iter()
            .map(|t| Complex::new(t[0], t[1]) * rotation)
            .collect(),
        phase_lock_index,
    }
}

fn pick_phase_lock_index(ket: &[[f32; 4]]) -> usize {
    let mut best = 0.0;
    let mut result = 0;
    for (k, t) in ket.iter().enumerate() {
        let m = t[0] * t[0] + t[1] * t[1];
        if m > best * PHASE_LOCK_DOMINANCE {
            best = m;
            result = k;
        }
    }
    result
}
