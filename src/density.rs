use num_complex::Complex;

use crate::{
    circuit_shaders,
    error::{Result, SimError},
    kernel::{ceil_log2, Kernel},
    pipeline::ShaderPipeline,
    state::AmplitudeState,
    texture::Texture,
};

/// The reduced 2×2 density matrix of a single qubit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QubitDensity {
    pub p00: f32,
    pub p01: Complex<f32>,
    pub p11: f32,
}
impl QubitDensity {
    fn from_texel(t: [f32; 4]) -> QubitDensity {
        QubitDensity {
            p00: t[0],
            p01: Complex::new(t[1], t[2]),
            p11: t[3],
        }
    }

    /// The Bloch vector `(x, y, z)`, normalized by the trace.
    pub fn bloch_vector(&self) -> [f32; 3] {
        let trace = self.p00 + self.p11;
        if trace == 0.0 {
            return [0.0; 3];
        }
        [
            2.0 * self.p01.re / trace,
            -2.0 * self.p01.im / trace,
            (self.p00 - self.p11) / trace,
        ]
    }
}

/// Per-qubit density texels `(ρ00, ρ01.re, ρ01.im, ρ11)` for every qubit in
/// `kept` (all qubits when `None`), in ascending qubit order.
///
/// The texture has `2^⌈log2 popcount(kept)⌉` texels; any beyond the kept count are zero.
pub fn compute_qubit_densities(state: &AmplitudeState, kept: Option<u32>) -> Result<Texture> {
    let n = state.qubits();
    let kept = kept.unwrap_or(((1u64 << n) - 1) as u32);
    if kept == 0 {
        return Err(SimError::EmptyKeptMask);
    }
    let slots = ceil_log2(kept.count_ones());
    let terms = circuit_shaders::qubit_densities(state.texture(), kept)?;

    let mut folds = ShaderPipeline::new();
    for q in (slots..terms.qubits()).rev() {
        folds.add_step(Kernel::SumFold, q);
    }
    if folds.is_empty() {
        return Ok(terms);
    }
    Ok(folds.run(state.engine(), &terms)?.into_output())
}

/// Like [`compute_qubit_densities`], read back to the host.
pub fn read_qubit_densities(state: &AmplitudeState, kept: Option<u32>) -> Result<Vec<QubitDensity>> {
    let count = kept.map_or(state.qubits(), |mask| mask.count_ones()) as usize;
    let texels = compute_qubit_densities(state, kept)?.read_vec4()?;
    Ok(texels
        .into_iter()
        .take(count)
        .map(QubitDensity::from_texel)
        .collect())
}
