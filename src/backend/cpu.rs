use num_complex::Complex;
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    error::{Result, SimError},
    kernel::{
        ceil_log2, rotate_right, Kernel, MASK_THRESHOLD, RATIO_DENOMINATOR_FLOOR, RATIO_TOLERANCE,
        REPRESENTATIVE_BIAS,
    },
    texture::TextureShape,
};

/// Runs kernels on a dedicated rayon pool, one task per output texel chunk.
pub(crate) struct CpuBackend {
    pool: ThreadPool,
}
impl CpuBackend {
    pub fn new(threads: usize) -> Result<CpuBackend> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("qshade-cpu-{i}"))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;
        Ok(CpuBackend { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn dispatch(
        &self,
        kernel: &Kernel,
        inputs: &[(&[f32], TextureShape)],
        out: &mut [f32],
        out_shape: TextureShape,
    ) {
        let samplers: Vec<Sampler> = inputs
            .iter()
            .map(|&(data, shape)| Sampler::new(data, shape))
            .collect();
        let comps = out_shape.format().components();
        let qubits = out_shape.qubits();
        self.pool.install(|| {
            out.par_chunks_mut(comps)
                .enumerate()
                .for_each(|(k, texel)| {
                    let value = output_for(kernel, k as u32, qubits, &samplers);
                    texel.copy_from_slice(&value[..comps]);
                });
        });
    }
}

/// Read access to an input texture; texels past the end read as zero.
#[derive(Clone, Copy)]
struct Sampler<'a> {
    data: &'a [f32],
    comps: usize,
    len: u32,
}
impl<'a> Sampler<'a> {
    fn new(data: &'a [f32], shape: TextureShape) -> Self {
        Sampler {
            data,
            comps: shape.format().components(),
            len: shape.len() as u32,
        }
    }

    fn texel(&self, k: u32) -> [f32; 4] {
        let mut t = [0.0; 4];
        let start = k as usize * self.comps;
        if let Some(src) = self.data.get(start..start + self.comps) {
            t[..self.comps].copy_from_slice(src);
        }
        t
    }

    fn amplitude(&self, k: u32) -> Complex<f32> {
        let t = self.texel(k);
        Complex::new(t[0], t[1])
    }

    fn allows(&self, k: u32) -> bool {
        self.texel(k)[0] > MASK_THRESHOLD
    }
}

fn amp(c: Complex<f32>) -> [f32; 4] {
    [c.re, c.im, 0.0, 0.0]
}

/// The value of output texel `k` of an `out_qubits` sized output.
fn output_for(kernel: &Kernel, k: u32, out_qubits: u32, inputs: &[Sampler]) -> [f32; 4] {
    match *kernel {
        Kernel::ControlMask { controls } => {
            [if controls.allows_state(k) { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0]
        }
        Kernel::ControlSelect { controls } => inputs[0].texel(controls.expand_index(k)),
        Kernel::ClassicalState { index } => [if k == index { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        Kernel::LinearOverlay { offset } => {
            let (fore, back) = (&inputs[0], &inputs[1]);
            match k.checked_sub(offset) {
                Some(i) if i < fore.len => fore.texel(i),
                _ => back.texel(k),
            }
        }
        Kernel::ApplyMatrix { qubit, span } => {
            let (state, mask, matrix) = (&inputs[0], &inputs[1], &inputs[2]);
            if !mask.allows(k) {
                return state.texel(k);
            }
            let dim = 1 << span;
            let field = (dim - 1) << qubit;
            let row = (k & field) >> qubit;
            let base = k & !field;
            let mut total = Complex::ZERO;
            for col in 0..dim {
                total += matrix.amplitude(row * dim + col) * state.amplitude(base | (col << qubit));
            }
            amp(total)
        }
        Kernel::Swap { qubit, other } => {
            let (state, mask) = (&inputs[0], &inputs[1]);
            if !mask.allows(k) || (k >> qubit) & 1 == (k >> other) & 1 {
                return state.texel(k);
            }
            state.texel(k ^ (1 << qubit) ^ (1 << other))
        }
        Kernel::CycleBits { qubit, span, shift } => permute_field(inputs, k, qubit, span, |f| {
            rotate_right(f, shift, span)
        }),
        Kernel::Offset {
            qubit,
            span,
            amount,
        } => permute_field(inputs, k, qubit, span, |f| f.wrapping_sub(amount)),
        Kernel::UniversalNot { qubit } => {
            let (state, mask) = (&inputs[0], &inputs[1]);
            if !mask.allows(k) {
                return state.texel(k);
            }
            let partner = state.amplitude(k ^ (1 << qubit)).conj();
            if (k >> qubit) & 1 == 0 {
                amp(partner)
            } else {
                amp(-partner)
            }
        }
        Kernel::CycleAllBits { shift } => inputs[0].texel(rotate_right(k, shift, out_qubits)),
        Kernel::QubitDensities { kept } => density_term(&inputs[0], k, kept),
        Kernel::AmplitudesToPolar => {
            let a = inputs[0].amplitude(k);
            let mag = a.norm_sqr();
            let phase = if mag == 0.0 { 0.0 } else { a.arg() };
            [mag, phase, mag, 0.0]
        }
        Kernel::SpreadLength { bit } => {
            let v = inputs[0].texel(k);
            let p = inputs[0].texel(k ^ bit);
            [v[0], v[1], v[2] + p[2], 0.0]
        }
        Kernel::FoldRepresentative => {
            let offset = 1 << out_qubits;
            fold_representative(inputs[0].texel(k), inputs[0].texel(k + offset))
        }
        Kernel::ConvertAwayFromPolar => {
            let polar = inputs[0].texel(k);
            let c = Complex::from_polar(polar[0].sqrt(), polar[1]);
            [c.re, c.im, polar[2], 0.0]
        }
        Kernel::RatiosVsRepresentative => {
            let (ket, rep) = (&inputs[0], &inputs[1]);
            let a = ket.amplitude(k);
            let r = rep.texel(k % rep.len);
            [a.re, a.im, r[0], r[1]]
        }
        Kernel::FoldConsistentRatios { bit } => {
            let s1 = k % bit + (k / bit) * 2 * bit;
            let s2 = s1 + bit;
            merge_ratios(inputs[0].texel(s1), inputs[0].texel(s2))
        }
        Kernel::SumFold => {
            let offset = 1 << out_qubits;
            let (a, b) = (inputs[0].texel(k), inputs[0].texel(k + offset));
            [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
        }
    }
}

/// Controlled permutation of the `span` bits starting at `qubit`:
/// output field `f` takes its value from input field `source(f)`.
fn permute_field(
    inputs: &[Sampler],
    k: u32,
    qubit: u32,
    span: u32,
    source: impl Fn(u32) -> u32,
) -> [f32; 4] {
    let (state, mask) = (&inputs[0], &inputs[1]);
    if !mask.allows(k) {
        return state.texel(k);
    }
    let field_mask = (1 << span) - 1;
    let field = (k >> qubit) & field_mask;
    let from = (source(field) & field_mask) << qubit;
    state.texel((k & !(field_mask << qubit)) | from)
}

/// One partial term of a kept qubit's density matrix.
///
/// Output index `j = other * slots + slot`, where `slot` picks the kept qubit
/// and `other` enumerates the values of every remaining bit.
fn density_term(state: &Sampler, j: u32, kept: u32) -> [f32; 4] {
    let count = kept.count_ones();
    let slots = 1 << ceil_log2(count);
    let (slot, other) = (j % slots, j / slots);
    if slot >= count {
        return [0.0; 4];
    }
    let qubit = nth_set_bit(kept, slot);
    let low = other & ((1 << qubit) - 1);
    let k0 = low | ((other ^ low) << 1);
    let k1 = k0 | (1 << qubit);
    let (a0, a1) = (state.amplitude(k0), state.amplitude(k1));
    let off = a0 * a1.conj();
    [a0.norm_sqr(), off.re, off.im, a1.norm_sqr()]
}

fn nth_set_bit(mask: u32, n: u32) -> u32 {
    let mut m = mask;
    for _ in 0..n {
        m &= m - 1;
    }
    m.trailing_zeros()
}

/// Combine two polar kets, keeping the phase of whichever has more accumulated mass.
pub(crate) fn fold_representative(p: [f32; 4], q: [f32; 4]) -> [f32; 4] {
    let phase = if p[2] * REPRESENTATIVE_BIAS >= q[2] {
        p[1]
    } else {
        q[1]
    };
    [p[0] + q[0], phase, p[2] + q[2], 0.0]
}

/// Merge two `(ket, representative)` ratio vectors.
///
/// Inconsistent ratios poison the result with NaN; otherwise the vector
/// with the larger norm survives.
pub(crate) fn merge_ratios(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    let c1 = Complex::new(a[0], a[1]) * Complex::new(b[2], b[3]);
    let c2 = Complex::new(a[2], a[3]) * Complex::new(b[0], b[1]);
    let denominator = c1
        .norm_sqr()
        .min(c2.norm_sqr())
        .max(RATIO_DENOMINATOR_FLOOR);
    let err = (c1 - c2).norm_sqr() / denominator;
    if err.is_nan() || err > RATIO_TOLERANCE {
        return [f32::NAN; 4];
    }
    let dot = |v: [f32; 4]| v.iter().map(|x| x * x).sum::<f32>();
    if dot(a) >= dot(b) {
        a
    } else {
        b
    }
}
