//! Data-parallel state-vector simulation of quantum circuits.
//!
//! Amplitude vectors live in [`Texture`]s owned by an [`Engine`], and every
//! operation is a [`Kernel`] computing one output texel per basis index, run
//! either on a dedicated CPU worker pool or, with the `gpu` feature, as WGSL
//! compute shaders.

pub mod amplitudes;
mod backend;
pub mod circuit_shaders;
pub mod config;
pub mod controls;
pub mod density;
pub mod engine;
pub mod error;
pub mod gate;
pub mod kernel;
pub mod matrix;
pub mod pipeline;
mod pool;
#[cfg(feature = "python")]
mod python;
pub mod simulate;
pub mod state;
pub mod texture;

pub use amplitudes::{compute_amplitude_display, SuperpositionReadout};
#[cfg(feature = "gpu")]
pub use backend::initialize_gpu;
pub use config::{BackendKind, EngineConfig};
pub use controls::Controls;
pub use density::{compute_qubit_densities, read_qubit_densities, QubitDensity};
pub use engine::{initialize_global, reset_texture_pool, Engine, PoolStats};
pub use error::{Result, SimError};
pub use gate::{EvalArgs, Gate, GateKernel};
pub use kernel::Kernel;
pub use matrix::Matrix;
pub use pipeline::{ShaderPipeline, Source, StageId};
pub use simulate::{evaluate_column, simulate_circuit, Circuit, Column};
pub use state::AmplitudeState;
pub use texture::{Format, Texture, TextureShape};
#[cfg(feature = "python")]
pub use python::python_module;
