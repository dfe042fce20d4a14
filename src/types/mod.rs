//! Common types used throughout the ghostflow runtime.
mod config;
mod grid;
mod hierarchy;
mod matrix;
mod vector;

pub use self::config::*;
pub use self::grid::*;
pub use self::hierarchy::*;
pub use self::matrix::*;
pub use self::vector::*;

/// Result of a kernel invocation together with the path that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution<T = ()> {
    pub value: T,
    /// `true` if the task-parallel implementation was used, `false` for the reference one.
    pub optimized: bool,
}

impl<T> Execution<T> {
    pub fn new(value: T, optimized: bool) -> Self {
        Self { value, optimized }
    }

    pub fn map<R, F: FnOnce(T) -> R>(self, fun: F) -> Execution<R> {
        Execution {
            value: fun(self.value),
            optimized: self.optimized,
        }
    }
}

/// Out-of-band record of which kernels ran their optimized implementation.
///
/// A flag is `true` only if _every_ recorded invocation of that kernel was optimized, so the
/// record can be accumulated over a whole solve and reported afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct KernelPath {
    pub dot_product: bool,
    pub spmv: bool,
    pub waxpby: bool,
    pub mg: bool,
}

impl Default for KernelPath {
    fn default() -> Self {
        Self {
            dot_product: true,
            spmv: true,
            waxpby: true,
            mg: true,
        }
    }
}

impl KernelPath {
    pub fn record_dot_product<T>(&mut self, e: &Execution<T>) {
        self.dot_product &= e.optimized;
    }

    pub fn record_spmv<T>(&mut self, e: &Execution<T>) {
        self.spmv &= e.optimized;
    }

    pub fn record_waxpby<T>(&mut self, e: &Execution<T>) {
        self.waxpby &= e.optimized;
    }

    pub fn record_mg<T>(&mut self, e: &Execution<T>) {
        self.mg &= e.optimized;
    }

    pub fn all_optimized(&self) -> bool {
        self.dot_product && self.spmv && self.waxpby && self.mg
    }
}
