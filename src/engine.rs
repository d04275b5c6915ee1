use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, OnceLock, PoisonError,
};

use num_complex::Complex;

use crate::{
    backend::{Backend, Storage},
    config::{BackendKind, EngineConfig},
    error::{Result, SimError},
    kernel::Kernel,
    pool::TexturePool,
    texture::{Format, Texture, TextureShape},
};

/// Snapshot of an engine's texture accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Spare textures waiting for reuse.
    pub pooled: usize,
    /// Texture handles currently alive.
    pub live: usize,
}

/// A compute backend together with its texture pool.
///
/// Cloning is cheap and yields a handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}
struct EngineInner {
    config: EngineConfig,
    backend: Backend,
    pool: Mutex<TexturePool>,
    live: AtomicUsize,
}

static GLOBAL_ENGINE: OnceLock<Result<Engine>> = OnceLock::new();

/// Initialize the process-wide engine from [`EngineConfig::from_env`].
///
/// This will happen automatically the first time [`Engine::global`] is called,
/// but this can be called to preempt that work at a more appropriate time.
pub fn initialize_global() -> Result<()> {
    Engine::global().map(|_| ())
}

/// Free every spare texture held by the global engine.
/// Does nothing if the global engine was never initialized.
pub fn reset_texture_pool() -> usize {
    match GLOBAL_ENGINE.get() {
        Some(Ok(engine)) => engine.drain_pool(),
        _ => 0,
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Engine> {
        let backend = Backend::new(&config)?;
        Ok(Engine {
            inner: Arc::new(EngineInner {
                pool: Mutex::new(TexturePool::new(config.pool_limit)),
                config,
                backend,
                live: AtomicUsize::new(0),
            }),
        })
    }

    /// A CPU engine with default settings.
    pub fn cpu() -> Result<Engine> {
        Engine::new(EngineConfig::default())
    }

    /// The process-wide engine.
    pub fn global() -> Result<Engine> {
        GLOBAL_ENGINE
            .get_or_init(|| Engine::new(EngineConfig::from_env()))
            .clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// A zero-initialized texture.
    pub fn alloc(&self, qubits: u32, format: Format) -> Result<Texture> {
        let shape = TextureShape::new(qubits, format);
        let storage = match self.take_spare(shape)? {
            Some(mut storage) => {
                self.inner.backend.clear(&mut storage);
                storage
            }
            None => self.inner.backend.alloc(shape),
        };
        Ok(self.wrap(shape, storage))
    }

    /// A texture holding `data`, interpreted as texels of `format` in basis-index order.
    pub fn upload(&self, format: Format, data: &[f32]) -> Result<Texture> {
        let comps = format.components();
        if data.len() % comps != 0 {
            return Err(SimError::RaggedTextureData {
                len: data.len(),
                format,
            });
        }
        let shape = TextureShape::for_len(data.len() / comps, format)?;
        let mut storage = match self.take_spare(shape)? {
            Some(storage) => storage,
            None => self.inner.backend.alloc(shape),
        };
        self.inner.backend.write(&mut storage, data);
        Ok(self.wrap(shape, storage))
    }

    /// An amplitude texture.
    pub fn upload_complex(&self, amplitudes: &[Complex<f32>]) -> Result<Texture> {
        let data: Vec<f32> = amplitudes.iter().flat_map(|a| [a.re, a.im]).collect();
        self.upload(Format::Vec2, &data)
    }

    /// Run `kernel` over `inputs`, producing a fresh texture of `out_qubits` qubits.
    pub fn render(&self, kernel: &Kernel, inputs: &[&Texture], out_qubits: u32) -> Result<Texture> {
        let shapes: Vec<TextureShape> = inputs.iter().map(|t| t.shape()).collect();
        let out_shape = kernel.check(&shapes, out_qubits)?;
        if inputs.iter().any(|t| !Arc::ptr_eq(&t.engine().inner, &self.inner)) {
            return Err(SimError::ForeignTexture);
        }

        let mut storage = match self.take_spare(out_shape)? {
            Some(storage) => storage,
            None => self.inner.backend.alloc(out_shape),
        };
        log::trace!(
            "{} -> {} qubit(s) {:?}",
            kernel.name(),
            out_qubits,
            out_shape.format()
        );
        let bound: Vec<(&Storage, TextureShape)> =
            inputs.iter().map(|t| (t.storage(), t.shape())).collect();
        if let Err(e) = self
            .inner
            .backend
            .dispatch(kernel, &bound, &mut storage, out_shape)
        {
            self.lock_pool().put(out_shape, storage);
            return Err(e);
        }
        Ok(self.wrap(out_shape, storage))
    }

    /// Free every spare texture. Returns how many were freed.
    pub fn drain_pool(&self) -> usize {
        let freed = self.lock_pool().drain();
        log::debug!("drained {freed} pooled texture(s)");
        freed
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pooled: self.lock_pool().len(),
            live: self.inner.live.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn read(&self, texture: &Texture) -> Result<Vec<f32>> {
        self.inner.backend.read(texture.storage(), texture.shape())
    }

    pub(crate) fn recycle(&self, shape: TextureShape, storage: Storage) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
        self.lock_pool().put(shape, storage);
    }

    fn wrap(&self, shape: TextureShape, storage: Storage) -> Texture {
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        Texture::new(self.clone(), shape, storage)
    }

    /// A pooled storage of the given class, after checking it may exist at all.
    fn take_spare(&self, shape: TextureShape) -> Result<Option<Storage>> {
        self.check_limits(shape)?;
        Ok(self.lock_pool().take(shape))
    }

    fn check_limits(&self, shape: TextureShape) -> Result<()> {
        let max_qubits = self.inner.config.max_qubits;
        let too_wide = shape.qubits() > max_qubits;
        let limit = if too_wide {
            TextureShape::new(max_qubits, shape.format()).byte_len()
        } else {
            self.inner.backend.max_texture_bytes()
        };
        let bytes = shape.byte_len();
        if too_wide || bytes > limit {
            log::warn!(
                "refusing {} qubit {:?} texture of {bytes} bytes (limit {limit})",
                shape.qubits(),
                shape.format()
            );
            return Err(SimError::ResourceExhausted {
                qubits: shape.qubits(),
                format: shape.format(),
                bytes,
                limit,
            });
        }
        Ok(())
    }

    fn lock_pool(&self) -> MutexGuard<'_, TexturePool> {
        self.inner.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend_kind())
            .field("stats", &self.stats())
            .finish()
    }
}
