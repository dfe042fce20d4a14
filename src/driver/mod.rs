//! Drivers composing the kernels and the halo exchange into complete applications: the
//! multigrid preconditioned CG solve and the halo-exchanging stencil.
mod cg;
mod stencil;
mod trace;

pub use self::cg::{cg, CgOptions, CgReport};
pub use self::stencil::{Decomposition, StencilReport, StencilSimulation, Subdomain};
pub use self::trace::Trace;
