use std::{env, str::FromStr};

/// Which compute backend an [`crate::Engine`] runs its kernels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Data-parallel kernels on a dedicated rayon pool.
    #[default]
    Cpu,
    /// WGSL compute kernels through wgpu. Requires the `gpu` feature.
    Gpu,
}
impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" => Ok(BackendKind::Gpu),
            other => Err(format!("unknown backend {other:?}, expected \"cpu\" or \"gpu\"")),
        }
    }
}

/// Default largest state the engine will allocate, in qubits.
pub const DEFAULT_MAX_QUBITS: u32 = 26;

/// Default number of spare textures kept per size class.
pub const DEFAULT_POOL_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Textures above this many qubits are refused with [`crate::SimError::ResourceExhausted`].
    pub max_qubits: u32,
    /// Worker threads for the CPU backend; `None` uses one per logical CPU.
    pub threads: Option<usize>,
    /// Spare textures retained per `(qubits, format)` class.
    pub pool_limit: usize,
}
impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            backend: BackendKind::default(),
            max_qubits: DEFAULT_MAX_QUBITS,
            threads: None,
            pool_limit: DEFAULT_POOL_LIMIT,
        }
    }
}
impl EngineConfig {
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_max_qubits(mut self, max_qubits: u32) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn with_pool_limit(mut self, pool_limit: usize) -> Self {
        self.pool_limit = pool_limit;
        self
    }

    /// The default configuration overridden by `QSHADE_BACKEND`,
    /// `QSHADE_MAX_QUBITS` and `QSHADE_THREADS`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();
        if let Some(backend) = parse_var::<BackendKind>("QSHADE_BACKEND") {
            config.backend = backend;
        }
        if let Some(max_qubits) = parse_var::<u32>("QSHADE_MAX_QUBITS") {
            config.max_qubits = max_qubits;
        }
        if let Some(threads) = parse_var::<usize>("QSHADE_THREADS") {
            config = config.with_threads(threads);
        }
        config
    }

    /// Number of CPU worker threads this configuration asks for.
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

fn parse_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("ignoring {name}={value:?}: {e}");
            None
        }
    }
}
