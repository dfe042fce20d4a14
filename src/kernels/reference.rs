//! Sequential reference kernels. These are always available and define the numerical contract
//! which the task-parallel kernels must reproduce within floating-point tolerance.
use super::{check_length, KernelError};
use crate::types::{Coarsening, SparseMatrix, Vector};

/// Returns `sum(x[i] * y[i])` over `0..n`.
pub fn compute_dot_product_ref(n: usize, x: &Vector, y: &Vector) -> Result<f64, KernelError> {
    check_length("dot product x", x, n)?;
    check_length("dot product y", y, n)?;

    let (xv, yv) = (x.values(), y.values());
    let mut result = 0.0;

    for i in 0..n {
        result += xv[i] * yv[i];
    }

    Ok(result)
}

/// Computes `y = A·x`.
pub fn compute_spmv_ref(a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), KernelError> {
    check_length("spmv x", x, a.local_number_of_columns())?;
    check_length("spmv y", y, a.local_number_of_rows())?;

    let xv = x.values();
    let yv = y.values_mut();

    for i in 0..a.local_number_of_rows() {
        let (cols, vals) = a.row(i);
        let mut sum = 0.0;

        for (&j, &v) in cols.iter().zip(vals) {
            sum += v * xv[j];
        }

        yv[i] = sum;
    }

    Ok(())
}

/// Computes `w = alpha·x + beta·y` over `0..n`.
pub fn compute_waxpby_ref(
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

    let (xv, yv) = (x.values(), y.values());
    let wv = w.values_mut();

    if alpha == 1.0 {
        for i in 0..n {
            wv[i] = xv[i] + beta * yv[i];
        }
    } else if beta == 1.0 {
        for i in 0..n {
            wv[i] = alpha * xv[i] + yv[i];
        }
    } else {
        for i in 0..n {
            wv[i] = alpha * xv[i] + beta * yv[i];
        }
    }

    Ok(())
}

/// Computes the coarse residual `rc[i] = rf[f2c[i]] - Axf[f2c[i]]`, using the `A·x` product
/// already stored in `c`.
pub fn compute_restriction_ref(c: &mut Coarsening, rf: &Vector) -> Result<(), KernelError> {
    check_length("restriction rf", rf, c.min_fine_len())?;

    let Coarsening { f2c, rc, axf, .. } = c;
    let (rfv, axfv) = (rf.values(), axf.values());
    let rcv = rc.values_mut();

    for (i, &f) in f2c.iter().enumerate() {
        rcv[i] = rfv[f] - axfv[f];
    }

    Ok(())
}

/// Adds the coarse correction to the fine solution: `xf[f2c[i]] += xc[i]`.
pub fn compute_prolongation_ref(c: &Coarsening, xf: &mut Vector) -> Result<(), KernelError> {
    check_length("prolongation xf", xf, c.min_fine_len())?;

    let xcv = c.coarse_solution().values();
    let xfv = xf.values_mut();

    for (i, &f) in c.f2c().iter().enumerate() {
        xfv[f] += xcv[i];
    }

    Ok(())
}

/// One symmetric Gauss-Seidel sweep (forward, then backward) on `A·x = r`.
pub fn compute_symgs_ref(a: &SparseMatrix, r: &Vector, x: &mut Vector) -> Result<(), KernelError> {
    let nrow = a.local_number_of_rows();
    check_length("symgs r", r, nrow)?;
    check_length("symgs x", x, a.local_number_of_columns())?;

    let rv = r.values();
    let xv = x.values_mut();

    let mut relax = |i: usize| -> Result<(), KernelError> {
        let diag = match a.diagonal_value(i) {
            Some(d) if d != 0.0 => d,
            _ => return Err(KernelError::ZeroDiagonal { row: i }),
        };

        let (cols, vals) = a.row(i);
        let mut sum = rv[i];

        for (&j, &v) in cols.iter().zip(vals) {
            sum -= v * xv[j];
        }

        // Remove the diagonal contribution subtracted above.
        sum += xv[i] * diag;
        xv[i] = sum / diag;
        Ok(())
    };

    for i in 0..nrow {
        relax(i)?;
    }

    for i in (0..nrow).rev() {
        relax(i)?;
    }

    Ok(())
}
