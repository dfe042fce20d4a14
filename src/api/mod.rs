//! User-facing functions and types of ghostflow.
mod runtime;

pub use self::runtime::*;
