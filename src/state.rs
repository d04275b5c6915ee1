use num_complex::Complex;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    circuit_shaders,
    engine::Engine,
    error::{Result, SimError},
    texture::{Format, Texture},
};

/// The amplitude vector of an `n ≥ 1` qubit system, held in a `Vec2` texture.
///
/// The total squared magnitude is not required to be 1.
#[derive(Debug)]
pub struct AmplitudeState {
    texture: Texture,
}
impl AmplitudeState {
    /// Wrap an existing amplitude texture.
    pub fn new(texture: Texture) -> Result<AmplitudeState> {
        if texture.format() != Format::Vec2 {
            return Err(SimError::FormatMismatch {
                kernel: "amplitude state",
                input: 0,
                expected: Format::Vec2,
                actual: texture.format(),
            });
        }
        if texture.qubits() == 0 {
            return Err(SimError::ZeroQubits);
        }
        Ok(AmplitudeState { texture })
    }

    pub fn from_amplitudes(engine: &Engine, amplitudes: &[Complex<f32>]) -> Result<AmplitudeState> {
        AmplitudeState::new(engine.upload_complex(amplitudes)?)
    }

    /// The classical basis state `|index⟩`.
    pub fn classical(engine: &Engine, qubits: u32, index: u32) -> Result<AmplitudeState> {
        if qubits == 0 {
            return Err(SimError::ZeroQubits);
        }
        AmplitudeState::new(circuit_shaders::classical_state(engine, qubits, index)?)
    }

    /// A normalized state with amplitudes drawn uniformly from the unit square.
    pub fn random(engine: &Engine, qubits: u32, seed: u64) -> Result<AmplitudeState> {
        if qubits == 0 {
            return Err(SimError::ZeroQubits);
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut amplitudes: Vec<Complex<f32>> = (0..1usize << qubits)
            .map(|_| Complex::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect();
        let norm = amplitudes.iter().map(|a| a.norm_sqr()).sum::<f32>().sqrt();
        if norm > 0.0 {
            amplitudes.iter_mut().for_each(|a| *a /= norm);
        }
        AmplitudeState::from_amplitudes(engine, &amplitudes)
    }

    pub fn qubits(&self) -> u32 {
        self.texture.qubits()
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn into_texture(self) -> Texture {
        self.texture
    }

    pub fn engine(&self) -> &Engine {
        self.texture.engine()
    }

    /// Read every amplitude back, in basis-index order.
    pub fn read_amplitudes(&self) -> Result<Vec<Complex<f32>>> {
        self.texture.read_complex()
    }
}
