//! Compressed sparse row matrix for feature diffusion.
//!
//! The propagation operators built by the normalizer are CSR matrices
//! with one operation: multiply against a dense feature matrix. Each
//! output row depends only on one sparse row, so rows are computed in
//! parallel with rayon.

use rayon::prelude::*;

use crate::autograd::Tensor;

/// Sparse matrix in compressed sparse row format.
///
/// Rows are stored as `indptr[i]..indptr[i + 1]` ranges into `indices`
/// (column ids) and `values` (entries). The matrix is square (N x N) and
/// owned exclusively by the graph it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl CsrMatrix {
    /// Build a CSR matrix from coordinate triplets.
    ///
    /// Triplets must not contain duplicate (row, col) pairs; the
    /// normalizer guarantees this by deduplicating edges first.
    ///
    /// # Panics
    ///
    /// Panics if a triplet is out of bounds (the normalizer validates
    /// edges before reaching here).
    #[must_use]
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, f32)]) -> Self {
        let mut counts = vec![0usize; n];
        for &(r, c, _) in triplets {
            assert!(r < n && c < n, "triplet ({r}, {c}) out of bounds for n={n}");
            counts[r] += 1;
        }

        let mut indptr = vec![0usize; n + 1];
        for i in 0..n {
            indptr[i + 1] = indptr[i] + counts[i];
        }

        let nnz = indptr[n];
        let mut indices = vec![0usize; nnz];
        let mut values = vec![0.0f32; nnz];
        let mut cursor = indptr.clone();
        for &(r, c, v) in triplets {
            let pos = cursor[r];
            indices[pos] = c;
            values[pos] = v;
            cursor[r] += 1;
        }

        // Sorted columns within each row keep iteration cache-friendly
        // and make equality checks meaningful.
        let mut result = Self {
            n,
            indptr,
            indices,
            values,
        };
        result.sort_rows();
        result
    }

    fn sort_rows(&mut self) {
        for r in 0..self.n {
            let range = self.indptr[r]..self.indptr[r + 1];
            let mut row: Vec<(usize, f32)> = range
                .clone()
                .map(|i| (self.indices[i], self.values[i]))
                .collect();
            row.sort_unstable_by_key(|&(c, _)| c);
            for (offset, (c, v)) in row.into_iter().enumerate() {
                self.indices[range.start + offset] = c;
                self.values[range.start + offset] = v;
            }
        }
    }

    /// Matrix dimension (the matrix is square).
    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entry at (row, col), zero if not stored.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let range = self.indptr[row]..self.indptr[row + 1];
        for i in range {
            if self.indices[i] == col {
                return self.values[i];
            }
        }
        0.0
    }

    /// Sparse x dense product: `self (n x n) @ x (n x d) -> (n x d)`.
    ///
    /// Pure diffusion, no non-linearity; deterministic given the operator
    /// and input. Output rows are independent and computed in parallel.
    ///
    /// # Panics
    ///
    /// Panics if `x` is not a 2-D tensor with `n` rows.
    #[must_use]
    pub fn matmul_dense(&self, x: &Tensor) -> Tensor {
        assert_eq!(x.ndim(), 2, "matmul_dense() expects a 2-D feature matrix");
        assert_eq!(
            x.shape()[0],
            self.n,
            "matmul_dense() row count mismatch: operator is {} x {}, features have {} rows",
            self.n,
            self.n,
            x.shape()[0]
        );
        let d = x.shape()[1];
        let xd = x.data();

        let mut out = vec![0.0f32; self.n * d];
        out.par_chunks_mut(d.max(1))
            .enumerate()
            .for_each(|(row, out_row)| {
                for i in self.indptr[row]..self.indptr[row + 1] {
                    let col = self.indices[i];
                    let w = self.values[i];
                    let src = &xd[col * d..(col + 1) * d];
                    for (o, &s) in out_row.iter_mut().zip(src.iter()) {
                        *o += w * s;
                    }
                }
            });

        Tensor::new(&out, &[self.n, d])
    }

    /// Whether the matrix is symmetric within `tol`.
    #[must_use]
    pub fn is_symmetric(&self, tol: f32) -> bool {
        for r in 0..self.n {
            for i in self.indptr[r]..self.indptr[r + 1] {
                let c = self.indices[i];
                if (self.values[i] - self.get(c, r)).abs() > tol {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_and_get() {
        let m = CsrMatrix::from_triplets(3, &[(0, 1, 2.0), (1, 0, 3.0), (2, 2, 1.0)]);
        assert_eq!(m.n(), 3);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(1, 0), 3.0);
        assert_eq!(m.get(2, 2), 1.0);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_matmul_dense_identity() {
        let eye = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let y = eye.matmul_dense(&x);
        assert_eq!(y.data(), x.data());
    }

    #[test]
    fn test_matmul_dense_permutes() {
        // Swap matrix moves row 1 into row 0 and vice versa.
        let swap = CsrMatrix::from_triplets(2, &[(0, 1, 1.0), (1, 0, 1.0)]);
        let x = Tensor::new(&[1.0, 2.0], &[2, 1]);
        let y = swap.matmul_dense(&x);
        assert_eq!(y.data(), &[2.0, 1.0]);
    }

    #[test]
    fn test_matmul_dense_empty_rows_are_zero() {
        let m = CsrMatrix::from_triplets(3, &[(0, 1, 1.0)]);
        let x = Tensor::new(&[5.0, 7.0, 9.0], &[3, 1]);
        let y = m.matmul_dense(&x);
        assert_eq!(y.data(), &[7.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_matrix() {
        let m = CsrMatrix::from_triplets(0, &[]);
        assert_eq!(m.n(), 0);
        let x = Tensor::zeros(&[0, 4]);
        let y = m.matmul_dense(&x);
        assert_eq!(y.shape(), &[0, 4]);
    }

    #[test]
    fn test_is_symmetric() {
        let sym = CsrMatrix::from_triplets(2, &[(0, 1, 0.5), (1, 0, 0.5)]);
        assert!(sym.is_symmetric(1e-6));

        let asym = CsrMatrix::from_triplets(2, &[(0, 1, 0.5)]);
        assert!(!asym.is_symmetric(1e-6));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_from_triplets_out_of_bounds() {
        let _ = CsrMatrix::from_triplets(2, &[(0, 5, 1.0)]);
    }
}
