use crate::kernels::KernelError;
use crate::prelude::*;
use crate::types::{SparseMatrix, Vector};

/// Transfer data between a level and the next coarser one.
#[derive(Debug, Clone)]
pub struct Coarsening {
    pub(crate) f2c: Vec<usize>,
    min_fine_len: usize,
    pub pre_smoother_steps: usize,
    pub post_smoother_steps: usize,
    /// Coarse residual, right-hand side of the next level.
    pub(crate) rc: Vector,
    /// Coarse solution, the correction computed by the next level.
    pub(crate) xc: Vector,
    /// Scratch for `A·x` on this level.
    pub(crate) axf: Vector,
}

impl Coarsening {
    /// Transfer data injecting fine point `f2c[i]` into coarse point `i`.
    ///
    /// `fine_columns` is the number of columns of the matrix on this level and
    /// `coarse_columns` that of the next coarser level; they determine the lengths of the
    /// `A·x` scratch vector and of the coarse solution. Every entry of `f2c` must be a
    /// distinct index below `fine_columns`.
    pub fn new(
        f2c: Vec<usize>,
        fine_columns: usize,
        coarse_columns: usize,
        pre_smoother_steps: usize,
        post_smoother_steps: usize,
    ) -> Result<Self, KernelError> {
        let invalid = |reason: String| KernelError::InvalidCoarsening { reason };
        let nc = f2c.len();

        if coarse_columns < nc {
            return Err(invalid(format!(
                "{} coarse points but only {} coarse columns",
                nc, coarse_columns
            )));
        }

        let mut seen = vec![false; fine_columns];
        for &f in &f2c {
            if f >= fine_columns {
                return Err(invalid(format!(
                    "f2c index {} out of range for {} fine columns",
                    f, fine_columns
                )));
            }

            if replace(&mut seen[f], true) {
                return Err(invalid(format!("fine point {} injected twice", f)));
            }
        }

        let min_fine_len = f2c.iter().map(|&f| f + 1).max().unwrap_or(0);

        Ok(Self {
            f2c,
            min_fine_len,
            pre_smoother_steps,
            post_smoother_steps,
            rc: Vector::zeros(nc),
            xc: Vector::zeros(coarse_columns),
            axf: Vector::zeros(fine_columns),
        })
    }

    /// Fine-to-coarse map: coarse point `i` corresponds to fine point `f2c[i]`.
    pub fn f2c(&self) -> &[usize] {
        &self.f2c
    }

    /// Minimum length of a fine-level vector addressed through `f2c`.
    pub fn min_fine_len(&self) -> usize {
        self.min_fine_len
    }

    pub fn coarse_residual(&self) -> &Vector {
        &self.rc
    }

    pub fn coarse_solution(&self) -> &Vector {
        &self.xc
    }

    pub fn fine_product(&self) -> &Vector {
        &self.axf
    }
}

#[derive(Debug, Clone)]
pub struct Level {
    pub matrix: SparseMatrix,
    /// `None` exactly on the coarsest level.
    pub coarsening: Option<Coarsening>,
}

impl Level {
    pub fn new(matrix: SparseMatrix, coarsening: Option<Coarsening>) -> Self {
        Self { matrix, coarsening }
    }
}

/// Multigrid hierarchy: levels ordered from finest (index 0) to coarsest.
///
/// The number of levels is fixed at construction, which also bounds the recursion depth of
/// the V-cycle.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    levels: Vec<Level>,
}

impl Hierarchy {
    pub fn new(levels: Vec<Level>) -> Result<Self, KernelError> {
        let malformed = |level: usize, reason: String| KernelError::MalformedHierarchy { level, reason };

        if levels.is_empty() {
            return Err(malformed(0, "hierarchy has no levels".into()));
        }

        let last = levels.len() - 1;

        for (l, level) in enumerate(&levels) {
            let rows = level.matrix.local_number_of_rows();

            let c = match (&level.coarsening, l == last) {
                (None, true) => continue,
                (Some(_), true) => {
                    return Err(malformed(l, "coarsest level has coarsening data".into()))
                }
                (None, false) => return Err(malformed(l, "missing coarsening data".into())),
                (Some(c), false) => c,
            };

            let coarse = &levels[l + 1].matrix;
            if c.f2c.len() != coarse.local_number_of_rows() {
                return Err(malformed(
                    l,
                    format!(
                        "f2c maps {} points but the next level has {} rows",
                        c.f2c.len(),
                        coarse.local_number_of_rows()
                    ),
                ));
            }

            if c.xc.len() < coarse.local_number_of_columns() {
                return Err(malformed(
                    l,
                    format!(
                        "coarse solution has {} entries but the next level has {} columns",
                        c.xc.len(),
                        coarse.local_number_of_columns()
                    ),
                ));
            }

            if c.axf.len() < level.matrix.local_number_of_columns() {
                return Err(malformed(l, "scratch vector shorter than the level".into()));
            }

            if c.min_fine_len > rows {
                return Err(malformed(
                    l,
                    format!("f2c index {} out of range", c.min_fine_len - 1),
                ));
            }
        }

        Ok(Self { levels })
    }

    /// Hierarchy with a single level, on which the V-cycle reduces to one smoother pass.
    pub fn single(matrix: SparseMatrix) -> Self {
        Self {
            levels: vec![Level::new(matrix, None)],
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub(crate) fn levels_mut(&mut self) -> &mut [Level] {
        &mut self.levels
    }

    pub fn finest(&self) -> &SparseMatrix {
        &self.levels[0].matrix
    }

    pub fn level(&self, index: usize) -> &Level {
        &self.levels[index]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_level(f2c: Vec<usize>) -> Result<Hierarchy, KernelError> {
        let coarse = f2c.len();
        Hierarchy::new(vec![
            Level::new(SparseMatrix::identity(4), Some(Coarsening::new(f2c, 4, coarse, 1, 1)?)),
            Level::new(SparseMatrix::identity(coarse), None),
        ])
    }

    #[test]
    fn test_valid() {
        let h = two_level(vec![0, 2]).unwrap();
        assert_eq!(h.num_levels(), 2);
        assert_eq!(h.level(0).coarsening.as_ref().unwrap().f2c(), &[0, 2]);
    }

    #[test]
    fn test_invalid_coarsening() {
        assert!(matches!(
            Coarsening::new(vec![0, 1, 0], 4, 3, 1, 1),
            Err(KernelError::InvalidCoarsening { .. })
        ));
        assert!(matches!(
            Coarsening::new(vec![0; 1000], 1, 1000, 0, 0),
            Err(KernelError::InvalidCoarsening { .. })
        ));
        assert!(Coarsening::new(vec![0, 4], 4, 2, 1, 1).is_err());
        assert!(Coarsening::new(vec![0, 2], 4, 1, 1, 1).is_err());

        let c = Coarsening::new(vec![3, 1], 4, 5, 1, 1).unwrap();
        assert_eq!(c.coarse_residual().len(), 2);
        assert_eq!(c.coarse_solution().len(), 5);
        assert_eq!(c.fine_product().len(), 4);
        assert_eq!(c.min_fine_len(), 4);
    }

    #[test]
    fn test_malformed() {
        assert!(two_level(vec![0, 4]).is_err());
        assert!(two_level(vec![1, 1]).is_err());
        assert!(Hierarchy::new(vec![]).is_err());

        let result = Hierarchy::new(vec![Level::new(
            SparseMatrix::identity(2),
            Some(Coarsening::new(vec![0], 2, 1, 1, 1).unwrap()),
        )]);
        assert!(matches!(
            result,
            Err(KernelError::MalformedHierarchy { level: 0, .. })
        ));

        let result = Hierarchy::new(vec![
            Level::new(SparseMatrix::identity(2), None),
            Level::new(SparseMatrix::identity(1), None),
        ]);
        assert!(result.is_err());

        // f2c addresses a ghost column of the fine level, which has no row.
        let wide = SparseMatrix::from_rows(3, vec![vec![(0, 1.0)], vec![(1, 1.0), (2, -1.0)]]).unwrap();
        let result = Hierarchy::new(vec![
            Level::new(wide, Some(Coarsening::new(vec![2], 3, 1, 1, 1).unwrap())),
            Level::new(SparseMatrix::identity(1), None),
        ]);
        assert!(matches!(
            result,
            Err(KernelError::MalformedHierarchy { level: 0, .. })
        ));
    }

    #[test]
    fn test_coarse_columns_exceeding_solution_are_rejected() {
        // Coarse matrix with 2 rows but 3 columns, whose solution needs 3 entries.
        let coarse = SparseMatrix::from_rows(3, vec![vec![(0, 1.0)], vec![(1, 1.0), (2, -1.0)]]).unwrap();
        assert_eq!(coarse.local_number_of_columns(), 3);

        let short = Coarsening::new(vec![0, 2], 4, 2, 1, 1).unwrap();
        let result = Hierarchy::new(vec![
            Level::new(SparseMatrix::identity(4), Some(short)),
            Level::new(coarse.clone(), None),
        ]);
        assert!(matches!(
            result,
            Err(KernelError::MalformedHierarchy { level: 0, .. })
        ));

        let sized = Coarsening::new(vec![0, 2], 4, 3, 1, 1).unwrap();
        let h = Hierarchy::new(vec![
            Level::new(SparseMatrix::identity(4), Some(sized)),
            Level::new(coarse, None),
        ])
        .unwrap();
        assert_eq!(h.level(0).coarsening.as_ref().unwrap().coarse_solution().len(), 3);
    }
}
