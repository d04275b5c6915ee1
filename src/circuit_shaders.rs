//! Texture-producing building blocks used by gates and displays.
//!
//! Every function renders a fresh texture on the engine owning its inputs
//! and leaves the inputs untouched.

use crate::{
    controls::Controls,
    engine::Engine,
    error::{Result, SimError},
    kernel::{ceil_log2, Kernel, MAX_MATRIX_SPAN},
    matrix::Matrix,
    texture::{Format, Texture},
};

/// A mask texture with 1.0 for every basis state `controls` allows.
pub fn control_mask(engine: &Engine, controls: Controls, qubits: u32) -> Result<Texture> {
    engine.render(&Kernel::ControlMask { controls }, &[], qubits)
}

/// Keep only the states `controls` allows, removing the controlled bits.
///
/// The output has `popcount(inclusion_mask)` fewer qubits.
/// Works on textures of any layout.
pub fn control_select(controls: Controls, source: &Texture) -> Result<Texture> {
    let qubits = source
        .qubits()
        .checked_sub(controls.included_qubit_count())
        .ok_or(SimError::QubitOutOfRange {
            index: controls.inclusion_mask().checked_ilog2().unwrap_or(0),
            qubits: source.qubits(),
        })?;
    source
        .engine()
        .render(&Kernel::ControlSelect { controls }, &[source], qubits)
}

/// The classical basis state `|index⟩` over `qubits` qubits.
pub fn classical_state(engine: &Engine, qubits: u32, index: u32) -> Result<Texture> {
    engine.render(&Kernel::ClassicalState { index }, &[], qubits)
}

/// A copy of `background` with `foreground` written over texels
/// `[offset, offset + foreground.len())`, truncated at the background's end.
pub fn linear_overlay(offset: u32, foreground: &Texture, background: &Texture) -> Result<Texture> {
    background.engine().render(
        &Kernel::LinearOverlay { offset },
        &[foreground, background],
        background.qubits(),
    )
}

/// Apply `matrix` to the qubits starting at `qubit`, where `mask` allows it.
pub fn apply_matrix(state: &Texture, mask: &Texture, qubit: u32, matrix: &Matrix) -> Result<Texture> {
    let span = matrix.qubit_span();
    if span > MAX_MATRIX_SPAN {
        return Err(SimError::MatrixTooLarge {
            span,
            max: MAX_MATRIX_SPAN,
        });
    }
    let engine = state.engine();
    let matrix_texture = engine.upload(Format::Vec2, &matrix.to_texture_data())?;
    engine.render(
        &Kernel::ApplyMatrix { qubit, span },
        &[state, mask, &matrix_texture],
        state.qubits(),
    )
}

/// Exchange the amplitudes of states differing in exactly bits `qubit` and `other`.
pub fn swap(state: &Texture, mask: &Texture, qubit: u32, other: u32) -> Result<Texture> {
    state
        .engine()
        .render(&Kernel::Swap { qubit, other }, &[state, mask], state.qubits())
}

/// Rotate the `span` bits starting at `qubit` left by `shift` (negative rotates right).
pub fn cycle_bits(state: &Texture, mask: &Texture, qubit: u32, span: u32, shift: i64) -> Result<Texture> {
    let shift = shift.rem_euclid(i64::from(span.max(1))) as u32;
    state.engine().render(
        &Kernel::CycleBits { qubit, span, shift },
        &[state, mask],
        state.qubits(),
    )
}

/// Add `amount` modulo `2^span` to the `span` bits starting at `qubit`.
pub fn offset(state: &Texture, mask: &Texture, qubit: u32, span: u32, amount: i64) -> Result<Texture> {
    let modulus = 1i64 << span.min(32);
    let amount = amount.rem_euclid(modulus) as u32;
    state.engine().render(
        &Kernel::Offset {
            qubit,
            span,
            amount,
        },
        &[state, mask],
        state.qubits(),
    )
}

/// The anti-linear "universal not" on `qubit`.
pub fn universal_not(state: &Texture, mask: &Texture, qubit: u32) -> Result<Texture> {
    state
        .engine()
        .render(&Kernel::UniversalNot { qubit }, &[state, mask], state.qubits())
}

/// Rotate every index bit so that bit `offset` lands at bit 0.
pub fn cycle_all_bits(source: &Texture, offset: u32) -> Result<Texture> {
    let qubits = source.qubits();
    let shift = if qubits == 0 {
        0
    } else {
        (qubits - offset % qubits) % qubits
    };
    source
        .engine()
        .render(&Kernel::CycleAllBits { shift }, &[source], qubits)
}

/// Raw partial density terms for every qubit in `kept`.
///
/// Entry `j = other * slots + slot` holds the contribution of the `other`-th
/// value of the remaining bits to the `slot`-th kept qubit, where
/// `slots = 2^⌈log2 popcount(kept)⌉`. Padding slots are zero.
pub fn qubit_densities(state: &Texture, kept: u32) -> Result<Texture> {
    if kept == 0 {
        return Err(SimError::EmptyKeptMask);
    }
    let n = state.qubits();
    if kept.ilog2() >= n {
        return Err(SimError::QubitOutOfRange {
            index: kept.ilog2(),
            qubits: n,
        });
    }
    state.engine().render(
        &Kernel::QubitDensities { kept },
        &[state],
        ceil_log2(kept.count_ones()) + n - 1,
    )
}
