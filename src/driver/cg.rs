use crate::api::Runtime;
use crate::kernels::{check_length, KernelError};
use crate::prelude::*;
use crate::types::{Hierarchy, KernelPath, Vector};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct CgReport {
    pub iterations: usize,
    /// Norm of the initial residual.
    pub normr0: f64,
    /// Norm of the final residual.
    pub normr: f64,
    /// Residual norm after every iteration.
    pub history: Vec<f64>,
    /// Which kernels ran their optimized implementation during the whole solve.
    pub path: KernelPath,
    pub time_allreduce: Duration,
}

impl CgReport {
    pub fn scaled_residual(&self) -> f64 {
        if self.normr0 == 0.0 {
            0.0
        } else {
            self.normr / self.normr0
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CgOptions {
    pub max_iterations: usize,
    /// Stop once `|r| / |r0|` drops to or below this value.
    pub tolerance: f64,
    /// Apply one multigrid V-cycle as preconditioner each iteration.
    pub precondition: bool,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 0.0,
            precondition: true,
        }
    }
}

struct Solver<'a> {
    runtime: &'a Runtime,
    path: KernelPath,
    time_allreduce: Duration,
}

impl<'a> Solver<'a> {
    fn dot(&mut self, x: &Vector, y: &Vector) -> Result<f64, KernelError> {
        let e = self.runtime.dot_product(x.len(), x, y)?;
        self.path.record_dot_product(&e);
        self.time_allreduce += e.value.time_allreduce;
        Ok(e.value.result)
    }

    fn waxpby(&mut self, alpha: f64, x: &Vector, beta: f64, y: &Vector, w: &mut Vector) -> Result<(), KernelError> {
        let e = self.runtime.waxpby(x.len(), alpha, x, beta, y, w)?;
        self.path.record_waxpby(&e);
        Ok(())
    }

    fn spmv(&mut self, h: &Hierarchy, x: &Vector, y: &mut Vector) -> Result<(), KernelError> {
        let e = self.runtime.spmv(h.finest(), x, y)?;
        self.path.record_spmv(&e);
        Ok(())
    }

    fn mg(&mut self, h: &mut Hierarchy, r: &Vector, z: &mut Vector) -> Result<(), KernelError> {
        let e = self.runtime.mg(h, r, z)?;
        self.path.record_mg(&e);
        Ok(())
    }
}

/// Solves `A·x = b` with (optionally multigrid preconditioned) conjugate gradients, where `A`
/// is the finest matrix of `hierarchy`. `x` holds the initial guess on entry.
///
/// The first kernel failure aborts the solve and is returned.
pub fn cg(
    runtime: &Runtime,
    hierarchy: &mut Hierarchy,
    b: &Vector,
    x: &mut Vector,
    options: &CgOptions,
) -> Result<CgReport, KernelError> {
    let n = hierarchy.finest().local_number_of_rows();
    let ncol = hierarchy.finest().local_number_of_columns();
    check_length("cg b", b, n)?;
    check_length("cg x", x, ncol)?;

    let mut solver = Solver {
        runtime,
        path: KernelPath::default(),
        time_allreduce: Duration::default(),
    };

    let mut r = Vector::zeros(n);
    let mut z = Vector::zeros(ncol);
    let mut p = Vector::zeros(ncol);
    let mut ap = Vector::zeros(n);
    let mut tmp = Vector::zeros(ncol);

    // r = b - A·x
    p.copy_from(x);
    solver.spmv(hierarchy, &p, &mut ap)?;
    solver.waxpby(1.0, b, -1.0, &ap, &mut r)?;

    let normr0 = solver.dot(&r, &r)?.sqrt();
    let mut normr = normr0;
    let mut history = vec![];
    let mut rtz = 0.0;
    let mut iterations = 0;

    debug!("cg: initial residual {:e}", normr0);

    while iterations < options.max_iterations && normr0 > 0.0 && normr / normr0 > options.tolerance {
        iterations += 1;

        if options.precondition {
            solver.mg(hierarchy, &r, &mut z)?;
        } else {
            z.copy_from(&r);
        }

        if iterations == 1 {
            p.copy_from(&z);
            rtz = solver.dot(&r, &z)?;
        } else {
            let old_rtz = rtz;
            rtz = solver.dot(&r, &z)?;
            let beta = rtz / old_rtz;

            // p = z + beta·p
            solver.waxpby(1.0, &z, beta, &p, &mut tmp)?;
            swap(&mut p, &mut tmp);
        }

        solver.spmv(hierarchy, &p, &mut ap)?;
        let pap = solver.dot(&p, &ap)?;
        let alpha = rtz / pap;

        // x = x + alpha·p
        solver.waxpby(1.0, x, alpha, &p, &mut tmp)?;
        swap(x, &mut tmp);

        // r = r - alpha·A·p
        solver.waxpby(1.0, &r, -alpha, &ap, &mut tmp)?;
        swap(&mut r, &mut tmp);

        normr = solver.dot(&r, &r)?.sqrt();
        history.push(normr);

        trace!("cg: iteration {} residual {:e}", iterations, normr / normr0);
    }

    info!(
        "cg finished after {} iterations, scaled residual {:e}",
        iterations,
        if normr0 > 0.0 { normr / normr0 } else { 0.0 }
    );

    let report = CgReport {
        iterations,
        normr0,
        normr,
        history,
        path: solver.path,
        time_allreduce: solver.time_allreduce,
    };

    runtime.trace("cg", &report);
    runtime.trace_profile();

    Ok(report)
}
