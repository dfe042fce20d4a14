//! Task-parallel kernels built on the elementwise operations of `ghostflow-memops`.
//!
//! All functions are generic over the execution [`Policy`]. With [`ghostflow_memops::RayonPolicy`]
//! they must be called from inside the task pool (see [`crate::worker::TaskPool::install`]) to
//! run on its workers. Preconditions are checked before any task is created.
use super::{check_length, KernelError};
use crate::types::{Coarsening, SparseMatrix, Vector};
use ghostflow_memops::{host_for_each, host_for_each_range, host_transform_reduce, Policy, SharedMut};

pub fn compute_dot_product<P: Policy>(
    policy: P,
    n: usize,
    x: &Vector,
    y: &Vector,
) -> Result<f64, KernelError> {
    check_length("dot product x", x, n)?;
    check_length("dot product y", y, n)?;

    let xv = x.values();
    let yv = y.values();
    let add = |a: f64, b: f64| a + b;

    // Dot product of a vector with itself: one load per element.
    let result = if x.is_aliased(y) {
        host_transform_reduce(policy, n, 0.0, |i| xv[i] * xv[i], add)
    } else {
        host_transform_reduce(policy, n, 0.0, |i| xv[i] * yv[i], add)
    };

    Ok(result)
}

pub fn compute_spmv<P: Policy>(
    policy: P,
    a: &SparseMatrix,
    x: &Vector,
    y: &mut Vector,
) -> Result<(), KernelError> {
    check_length("spmv x", x, a.local_number_of_columns())?;
    check_length("spmv y", y, a.local_number_of_rows())?;

    let xv = x.values();
    let yv = SharedMut::new(y.values_mut());

    host_for_each_range(policy, a.local_number_of_rows(), |rows| {
        for i in rows {
            let (cols, vals) = a.row(i);
            let mut sum = 0.0;

            for (&j, &v) in cols.iter().zip(vals) {
                sum += v * xv[j];
            }

            unsafe { yv.write(i, sum) };
        }
    });

    Ok(())
}

pub fn compute_waxpby<P: Policy>(
    policy: P,
    n: usize,
    alpha: f64,
    x: &Vector,
    beta: f64,
    y: &Vector,
    w: &mut Vector,
) -> Result<(), KernelError> {
    check_length("waxpby x", x, n)?;
    check_length("waxpby y", y, n)?;
    check_length("waxpby w", w, n)?;

    let xv = x.values();
    let yv = y.values();
    let wv = SharedMut::new(w.values_mut());

    if alpha == 1.0 {
        host_for_each(policy, n, |i| unsafe { wv.write(i, xv[i] + beta * yv[i]) });
    } else if beta == 1.0 {
        host_for_each(policy, n, |i| unsafe { wv.write(i, alpha * xv[i] + yv[i]) });
    } else {
        host_for_each(policy, n, |i| unsafe {
            wv.write(i, alpha * xv[i] + beta * yv[i])
        });
    }

    Ok(())
}

pub fn compute_restriction<P: Policy>(
    policy: P,
    c: &mut Coarsening,
    rf: &Vector,
) -> Result<(), KernelError> {
    check_length("restriction rf", rf, c.min_fine_len())?;

    let Coarsening { f2c, rc, axf, .. } = c;
    let f2c = &f2c[..];
    let rfv = rf.values();
    let axfv = axf.values();
    let rcv = SharedMut::new(rc.values_mut());

    host_for_each(policy, f2c.len(), |i| unsafe {
        rcv.write(i, rfv[f2c[i]] - axfv[f2c[i]])
    });

    Ok(())
}

pub fn compute_prolongation<P: Policy>(
    policy: P,
    c: &Coarsening,
    xf: &mut Vector,
) -> Result<(), KernelError> {
    check_length("prolongation xf", xf, c.min_fine_len())?;

    let f2c = c.f2c();
    let xcv = c.coarse_solution().values();
    let xfv = SharedMut::new(xf.values_mut());

    // `f2c` is injective (checked by `Coarsening::new`), so every task updates a distinct
    // fine point.
    host_for_each(policy, f2c.len(), |i| unsafe {
        *xfv.get_mut(f2c[i]) += xcv[i];
    });

    Ok(())
}
