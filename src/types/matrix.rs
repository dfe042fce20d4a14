use crate::kernels::KernelError;

/// Sparse matrix in compressed row storage.
///
/// Row `i` owns the entries `row_offsets[i]..row_offsets[i + 1]` of `columns` and `values`.
/// Column indices are local; `num_cols` may exceed `num_rows` when the matrix references
/// external (halo) entries of the input vector.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    num_rows: usize,
    num_cols: usize,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
    diagonal: Vec<Option<usize>>,
}

impl SparseMatrix {
    /// Builds a matrix from per-row lists of `(column, value)` pairs.
    pub fn from_rows<I, R>(num_cols: usize, rows: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (usize, f64)>,
    {
        let mut row_offsets = vec![0];
        let mut columns = vec![];
        let mut values = vec![];
        let mut diagonal = vec![];

        for (i, row) in rows.into_iter().enumerate() {
            let mut diag = None;

            for (j, v) in row {
                if j >= num_cols {
                    return Err(KernelError::LengthMismatch {
                        what: "matrix column index",
                        expected: num_cols,
                        found: j,
                    });
                }

                if j == i {
                    diag = Some(values.len());
                }

                columns.push(j);
                values.push(v);
            }

            diagonal.push(diag);
            row_offsets.push(columns.len());
        }

        Ok(Self {
            num_rows: diagonal.len(),
            num_cols,
            row_offsets,
            columns,
            values,
            diagonal,
        })
    }

    pub fn identity(n: usize) -> Self {
        Self::from_diagonal(&vec![1.0; n])
    }

    pub fn from_diagonal(values: &[f64]) -> Self {
        let n = values.len();
        Self {
            num_rows: n,
            num_cols: n,
            row_offsets: (0..=n).collect(),
            columns: (0..n).collect(),
            values: values.to_vec(),
            diagonal: (0..n).map(Some).collect(),
        }
    }

    #[inline]
    pub fn local_number_of_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn local_number_of_columns(&self) -> usize {
        self.num_cols
    }

    #[inline]
    pub fn nonzeros_in_row(&self, row: usize) -> usize {
        self.row_offsets[row + 1] - self.row_offsets[row]
    }

    pub fn number_of_nonzeros(&self) -> usize {
        self.values.len()
    }

    /// Returns the column indices and values of `row`.
    #[inline]
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        (&self.columns[range.clone()], &self.values[range])
    }

    /// Value of the diagonal entry of `row`, if it is stored.
    #[inline]
    pub fn diagonal_value(&self, row: usize) -> Option<f64> {
        self.diagonal[row].map(|index| self.values[index])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_rows() {
        let m = SparseMatrix::from_rows(3, vec![vec![(0, 2.0), (1, -1.0)], vec![(2, 5.0)], vec![]])
            .unwrap();

        assert_eq!(m.local_number_of_rows(), 3);
        assert_eq!(m.local_number_of_columns(), 3);
        assert_eq!(m.nonzeros_in_row(0), 2);
        assert_eq!(m.nonzeros_in_row(2), 0);
        assert_eq!(m.row(0), (&[0usize, 1][..], &[2.0, -1.0][..]));
        assert_eq!(m.diagonal_value(0), Some(2.0));
        assert_eq!(m.diagonal_value(1), None);
    }

    #[test]
    fn test_invalid_column() {
        let result = SparseMatrix::from_rows(2, vec![vec![(2, 1.0)]]);
        assert!(matches!(result, Err(KernelError::LengthMismatch { .. })));
    }
}
