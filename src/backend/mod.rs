mod cpu;
#[cfg(feature = "gpu")]
mod gpu;

use cpu::CpuBackend;
#[cfg(feature = "gpu")]
use gpu::GpuBackend;
#[cfg(feature = "gpu")]
pub use gpu::initialize_gpu;

use crate::{
    config::{BackendKind, EngineConfig},
    error::Result,
    kernel::Kernel,
    texture::TextureShape,
};

/// Backing memory of a texture.
pub(crate) enum Storage {
    Cpu(Vec<f32>),
    #[cfg(feature = "gpu")]
    Gpu(wgpu::Buffer),
}
impl Storage {
    fn cpu(&self) -> &[f32] {
        match self {
            Storage::Cpu(data) => data,
            #[cfg(feature = "gpu")]
            Storage::Gpu(_) => unreachable!("GPU texture handed to the CPU backend"),
        }
    }

    fn cpu_mut(&mut self) -> &mut [f32] {
        match self {
            Storage::Cpu(data) => data,
            #[cfg(feature = "gpu")]
            Storage::Gpu(_) => unreachable!("GPU texture handed to the CPU backend"),
        }
    }

    #[cfg(feature = "gpu")]
    fn gpu(&self) -> &wgpu::Buffer {
        match self {
            Storage::Gpu(buffer) => buffer,
            Storage::Cpu(_) => unreachable!("CPU texture handed to the GPU backend"),
        }
    }
}

pub(crate) enum Backend {
    Cpu(CpuBackend),
    #[cfg(feature = "gpu")]
    Gpu(GpuBackend),
}
impl Backend {
    pub fn new(config: &EngineConfig) -> Result<Backend> {
        match config.backend {
            BackendKind::Cpu => {
                let cpu = CpuBackend::new(config.thread_count())?;
                log::info!("using CPU backend with {} threads", cpu.threads());
                Ok(Backend::Cpu(cpu))
            }
            #[cfg(feature = "gpu")]
            BackendKind::Gpu => Ok(Backend::Gpu(GpuBackend::new()?)),
            #[cfg(not(feature = "gpu"))]
            BackendKind::Gpu => Err(crate::error::SimError::GpuUnavailable),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Cpu(_) => BackendKind::Cpu,
            #[cfg(feature = "gpu")]
            Backend::Gpu(_) => BackendKind::Gpu,
        }
    }

    /// Largest single texture the backend can hold.
    pub fn max_texture_bytes(&self) -> u64 {
        match self {
            Backend::Cpu(_) => isize::MAX as u64,
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.max_buffer_bytes(),
        }
    }

    /// Fresh zeroed storage.
    pub fn alloc(&self, shape: TextureShape) -> Storage {
        match self {
            Backend::Cpu(_) => Storage::Cpu(vec![0.0; shape.float_len()]),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => Storage::Gpu(gpu.alloc(shape)),
        }
    }

    pub fn clear(&self, storage: &mut Storage) {
        match self {
            Backend::Cpu(_) => storage.cpu_mut().fill(0.0),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.clear(storage.gpu()),
        }
    }

    /// Overwrite the storage with `data`, which must have exactly its length.
    pub fn write(&self, storage: &mut Storage, data: &[f32]) {
        match self {
            Backend::Cpu(_) => storage.cpu_mut().copy_from_slice(data),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.write(storage.gpu(), data),
        }
    }

    pub fn dispatch(
        &self,
        kernel: &Kernel,
        inputs: &[(&Storage, TextureShape)],
        out: &mut Storage,
        out_shape: TextureShape,
    ) -> Result<()> {
        match self {
            Backend::Cpu(cpu) => {
                let inputs: Vec<(&[f32], TextureShape)> = inputs
                    .iter()
                    .map(|&(storage, shape)| (storage.cpu(), shape))
                    .collect();
                cpu.dispatch(kernel, &inputs, out.cpu_mut(), out_shape);
                Ok(())
            }
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => {
                let inputs: Vec<(&wgpu::Buffer, TextureShape)> = inputs
                    .iter()
                    .map(|&(storage, shape)| (storage.gpu(), shape))
                    .collect();
                gpu.dispatch(kernel, &inputs, out.gpu(), out_shape);
                Ok(())
            }
        }
    }

    /// Copy the texture back to the host. Blocks on the GPU.
    pub fn read(&self, storage: &Storage, shape: TextureShape) -> Result<Vec<f32>> {
        match self {
            Backend::Cpu(_) => {
                debug_assert_eq!(storage.cpu().len(), shape.float_len());
                Ok(storage.cpu().to_vec())
            }
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.read(storage.gpu(), shape),
        }
    }
}
