//! Generation of the benchmark problem: the 27-point operator on a regular `nx × ny × nz` grid
//! and its multigrid hierarchy.
use crate::kernels::KernelError;
use crate::prelude::*;
use crate::types::{Coarsening, Hierarchy, Level, SparseMatrix, Vector};

/// Linear system `A·x = b` together with its known solution.
#[derive(Debug, Clone)]
pub struct Problem {
    pub dims: [usize; 3],
    pub hierarchy: Hierarchy,
    pub b: Vector,
    /// Initial guess, all zeros.
    pub x: Vector,
    /// Exact solution, all ones.
    pub exact: Vector,
}

impl Problem {
    pub fn matrix(&self) -> &SparseMatrix {
        self.hierarchy.finest()
    }
}

#[inline]
fn linearize([nx, ny, _]: [usize; 3], x: usize, y: usize, z: usize) -> usize {
    x + nx * (y + ny * z)
}

/// Builds the 27-point stencil matrix: 26 on the diagonal and -1 for every neighbor inside the
/// grid. Also returns the right-hand side for which the solution is all ones, i.e. the row sums.
pub fn generate_matrix(dims: [usize; 3]) -> Result<(SparseMatrix, Vector), KernelError> {
    let [nx, ny, nz] = dims;
    let n = nx * ny * nz;

    if n == 0 {
        return Err(KernelError::MalformedHierarchy {
            level: 0,
            reason: format!("grid {}x{}x{} is empty", nx, ny, nz),
        });
    }

    let mut rows = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);

    for iz in 0..nz {
        for iy in 0..ny {
            for ix in 0..nx {
                let row = linearize(dims, ix, iy, iz);
                let mut entries = Vec::with_capacity(27);

                for sz in iz.saturating_sub(1)..min(iz + 2, nz) {
                    for sy in iy.saturating_sub(1)..min(iy + 2, ny) {
                        for sx in ix.saturating_sub(1)..min(ix + 2, nx) {
                            let col = linearize(dims, sx, sy, sz);
                            let value = if col == row { 26.0 } else { -1.0 };
                            entries.push((col, value));
                        }
                    }
                }

                b.push(27.0 - entries.len() as f64);
                rows.push(entries);
            }
        }
    }

    let matrix = SparseMatrix::from_rows(n, rows)?;
    Ok((matrix, Vector::from(b)))
}

/// Single-level problem on an `nx × ny × nz` grid.
pub fn generate_problem(nx: usize, ny: usize, nz: usize) -> Result<Problem, KernelError> {
    generate_hierarchy(nx, ny, nz, 1, 0, 0)
}

/// Problem with a multigrid hierarchy of `levels` levels. Every coarser level halves the grid
/// along each axis and injects the fine points with even coordinates.
pub fn generate_hierarchy(
    nx: usize,
    ny: usize,
    nz: usize,
    levels: usize,
    pre_smoother_steps: usize,
    post_smoother_steps: usize,
) -> Result<Problem, KernelError> {
    if levels == 0 {
        return Err(KernelError::MalformedHierarchy {
            level: 0,
            reason: "at least one level is required".into(),
        });
    }

    let fine_dims = [nx, ny, nz];
    let (matrix, b) = generate_matrix(fine_dims)?;
    let num_rows = matrix.local_number_of_rows();

    let mut dims = fine_dims;
    let mut matrices = vec![matrix];
    let mut transfers = vec![];

    for level in 1..levels {
        if dims.iter().any(|&d| d % 2 != 0) {
            return Err(KernelError::MalformedHierarchy {
                level: level - 1,
                reason: format!("grid {:?} cannot be coarsened", dims),
            });
        }

        let coarse = [dims[0] / 2, dims[1] / 2, dims[2] / 2];
        let mut f2c = Vec::with_capacity(coarse.iter().product());

        for iz in 0..coarse[2] {
            for iy in 0..coarse[1] {
                for ix in 0..coarse[0] {
                    f2c.push(linearize(dims, 2 * ix, 2 * iy, 2 * iz));
                }
            }
        }

        let fine_columns = matrices[level - 1].local_number_of_columns();
        let coarse_matrix = generate_matrix(coarse)?.0;
        transfers.push(Coarsening::new(
            f2c,
            fine_columns,
            coarse_matrix.local_number_of_columns(),
            pre_smoother_steps,
            post_smoother_steps,
        )?);

        matrices.push(coarse_matrix);
        dims = coarse;
    }

    debug!(
        "generated {} level hierarchy for {}x{}x{} grid",
        levels, nx, ny, nz
    );

    let mut transfers = transfers.into_iter();
    let levels = matrices
        .into_iter()
        .map(|matrix| Level::new(matrix, transfers.next()))
        .collect();

    Ok(Problem {
        dims: fine_dims,
        hierarchy: Hierarchy::new(levels)?,
        b,
        x: Vector::zeros(num_rows),
        exact: Vector::filled(num_rows, 1.0),
    })
}
