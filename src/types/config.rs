use std::env;
use std::path::PathBuf;

use crate::prelude::*;

/// Which implementation the kernel façade dispatches to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KernelPolicy {
    /// Strictly sequential reference kernels.
    Reference,
    /// Task-parallel kernels running on the worker pool.
    Optimized,
}

impl Default for KernelPolicy {
    fn default() -> Self {
        KernelPolicy::Optimized
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kernels: KernelConfig,
    pub worker: WorkerConfig,
    pub halo: HaloConfig,
    pub trace_file: Option<PathBuf>,
}

impl Config {
    pub fn new(kernels: KernelConfig, worker: WorkerConfig, halo: HaloConfig) -> Self {
        Self {
            kernels,
            worker,
            halo,
            trace_file: None,
        }
    }

    pub fn from_env() -> Self {
        let mut trace_file = None;

        if let Ok(filename) = env::var("GHOSTFLOW_TRACE") {
            let filename = filename.trim();

            if !filename.is_empty() {
                info!("writing trace to {:?}", filename);
                trace_file = Some(filename.into());
            }
        }

        Self {
            kernels: KernelConfig::from_env(),
            worker: WorkerConfig::from_env(),
            halo: HaloConfig::from_env(),
            trace_file,
        }
    }

    pub fn reference() -> Self {
        let mut config = Self::default();
        config.kernels.policy = KernelPolicy::Reference;
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default(), default(), default())
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub policy: KernelPolicy,
    pub profiling: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            policy: default(),
            profiling: true,
        }
    }
}

impl KernelConfig {
    pub fn from_env() -> Self {
        let mut policy = default();

        if let Ok(level) = env::var("GHOSTFLOW_OPTIMIZED") {
            use KernelPolicy::*;

            policy = match level.trim() {
                "0" | "off" | "reference" => Reference,
                "1" | "on" | "optimized" | "" => Optimized,
                s => {
                    warn!("unknown kernel policy {:?}, using optimized kernels", s);
                    Optimized
                }
            }
        }

        let profiling = match env::var("GHOSTFLOW_PROFILE") {
            Ok(s) => !matches!(s.trim(), "0" | "off"),
            Err(_) => true,
        };

        Self { policy, profiling }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// Number of threads in the task pool. `None` lets rayon decide.
    pub num_threads: Option<usize>,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let num_threads = parse_env::<usize>("GHOSTFLOW_THREADS").filter(|&n| {
            if n == 0 {
                warn!("GHOSTFLOW_THREADS cannot be zero, ignoring");
            }

            n > 0
        });

        Self { num_threads }
    }
}

#[derive(Debug, Clone)]
pub struct HaloConfig {
    /// Number of consumed steps a receive channel remembers before forgetting them.
    pub recv_window: u64,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self { recv_window: 8 }
    }
}

impl HaloConfig {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(window) = parse_env("GHOSTFLOW_RECV_WINDOW") {
            out.recv_window = window;
        }

        out
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;

    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("invalid value {:?} for {}, ignoring", value, key);
            None
        }
    }
}
