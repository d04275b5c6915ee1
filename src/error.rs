use thiserror::Error;

use crate::texture::Format;

/// Everything that can make the engine refuse work.
///
/// Numerical ambiguity in the purity test is not an error; it is
/// reported through [`crate::SuperpositionReadout`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("texture of {len} texels requested; the length must be a nonzero power of two")]
    InvalidTextureLength { len: usize },

    #[error("{len} values cannot be packed into {format:?} texels")]
    RaggedTextureData { len: usize, format: Format },

    #[error("an amplitude state needs at least one qubit")]
    ZeroQubits,

    #[error("{kernel} expected {expected} input texture(s), got {actual}")]
    InputCountMismatch {
        kernel: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kernel} input {input} must be {expected:?}, got {actual:?}")]
    FormatMismatch {
        kernel: &'static str,
        input: usize,
        expected: Format,
        actual: Format,
    },

    #[error("{kernel} expected a {expected}-qubit texture, got {actual} qubits")]
    StageSizeMismatch {
        kernel: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("qubit index {index} is out of range for {qubits} qubits")]
    QubitOutOfRange { index: u32, qubits: u32 },

    #[error("controls on qubit mask {overlap:#b} overlap the targeted qubits")]
    ControlsOverlapTargets { overlap: u32 },

    #[error("qubit {qubit} is required to be both on and off")]
    ConflictingControls { qubit: u32 },

    #[error("a {rows}x{cols} matrix cannot act on whole qubits")]
    InvalidMatrixShape { rows: usize, cols: usize },

    #[error("matrices acting on {span} qubits are not supported (maximum {max})")]
    MatrixTooLarge { span: u32, max: u32 },

    #[error("gate span {span} is not part of the {family} family")]
    UnsupportedSpan { family: &'static str, span: u32 },

    #[error("gate {name} has neither a matrix nor a kernel")]
    GateWithoutKernel { name: String },

    #[error("an amplitude display must cover at least one qubit")]
    EmptyRange,

    #[error("kept-qubit mask must select at least one qubit")]
    EmptyKeptMask,

    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("pipeline stage {stage} reads from stage {source_stage}, which has not run yet")]
    DanglingStageInput { stage: usize, source_stage: usize },

    #[error(
        "{qubits}-qubit {format:?} texture needs {bytes} bytes, exceeding the device limit of {limit} bytes"
    )]
    ResourceExhausted {
        qubits: u32,
        format: Format,
        bytes: u64,
        limit: u64,
    },

    #[error("texture was allocated by a different engine")]
    ForeignTexture,

    #[error("failed to build the CPU worker pool: {0}")]
    ThreadPool(String),

    #[error("the gpu backend was requested but qshade was built without the `gpu` feature")]
    GpuUnavailable,

    #[error("no compatible WGPU adapter was found")]
    NoAdapter,

    #[error("failed to acquire WGPU device: {0}")]
    RequestDevice(String),

    #[error("failed to map GPU buffer for readback")]
    Map,
}

pub type Result<T> = std::result::Result<T, SimError>;
