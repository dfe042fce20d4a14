//! Numeric kernels of the CG benchmark.
//!
//! Every kernel exists twice with the same numerical contract: a strictly sequential version
//! in [`reference`] and a task-parallel version in [`task`]. The [`crate::Runtime`] façade picks
//! one per call and reports which one it used.
use crate::prelude::*;
use crate::types::Vector;

mod mg;
pub mod reference;
pub mod task;

pub use self::mg::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("length mismatch for {what}: expected at least {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("malformed multigrid hierarchy at level {level}: {reason}")]
    MalformedHierarchy { level: usize, reason: String },

    #[error("invalid coarsening: {reason}")]
    InvalidCoarsening { reason: String },

    #[error("row {row} has a zero or missing diagonal entry")]
    ZeroDiagonal { row: usize },

    #[error("kernel {kernel} failed with code {code}")]
    Failed { kernel: &'static str, code: i32 },
}

impl KernelError {
    /// Non-zero integer status of this error, as reported by the benchmark.
    pub fn status(&self) -> i32 {
        use KernelError::*;

        match self {
            LengthMismatch { .. } => 1,
            MalformedHierarchy { .. } => 2,
            ZeroDiagonal { .. } => 3,
            InvalidCoarsening { .. } => 4,
            Failed { code, .. } if *code != 0 => *code,
            Failed { .. } => -1,
        }
    }
}

/// Status code of a kernel result: `0` on success, non-zero otherwise.
pub fn status<T>(result: &Result<T, KernelError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status(),
    }
}

#[inline]
pub(crate) fn check_length(what: &'static str, vector: &Vector, expected: usize) -> Result<(), KernelError> {
    if vector.len() < expected {
        Err(KernelError::LengthMismatch {
            what,
            expected,
            found: vector.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes_are_nonzero() {
        let errors = vec![
            KernelError::LengthMismatch {
                what: "x",
                expected: 2,
                found: 1,
            },
            KernelError::MalformedHierarchy {
                level: 1,
                reason: "missing".into(),
            },
            KernelError::ZeroDiagonal { row: 0 },
            KernelError::InvalidCoarsening {
                reason: "f2c".into(),
            },
            KernelError::Failed {
                kernel: "symgs",
                code: 0,
            },
            KernelError::Failed {
                kernel: "symgs",
                code: 7,
            },
        ];

        for e in &errors {
            assert_ne!(e.status(), 0, "{}", e);
        }

        assert_eq!(errors[5].status(), 7);
        assert_eq!(status::<()>(&Ok(())), 0);
        assert_eq!(status::<()>(&Err(errors[0].clone())), 1);
    }
}
