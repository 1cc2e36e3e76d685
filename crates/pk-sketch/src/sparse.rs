//! Sparse Linear Algebra
//!
//! Row-major sparse matrices with the two operations the solver needs on
//! Jacobians: a regularized minimum-norm solve and a numerical rank.

use std::cmp::Ordering;

/// Matrix stored by row as `(column, value)` pairs in column order
#[derive(Debug, Clone)]
pub(crate) struct SparseRows {
    rows: Vec<Vec<(usize, f64)>>,
    cols: usize,
}

impl SparseRows {
    pub(crate) fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![Vec::new(); rows],
            cols,
        }
    }

    /// Add an entry. Entries of one row must be pushed in column order.
    pub(crate) fn push(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.rows[row].push((col, value));
        }
    }

    /// `A * x`
    pub(crate) fn mul(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&(c, v)| v * x[c]).sum())
            .collect()
    }

    /// `A^T * y`
    pub(crate) fn mul_transposed(&self, y: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.cols];
        for (row, &yr) in self.rows.iter().zip(y) {
            for &(c, v) in row {
                x[c] += v * yr;
            }
        }
        x
    }

    /// Smallest `x` with `A * x = b`:
    /// x = A^T * (A * A^T + reg * I)^-1 * b
    ///
    /// `regularization` is relative to the largest squared row norm.
    pub(crate) fn min_norm_solve(&self, b: &[f64], regularization: f64) -> Option<Vec<f64>> {
        let gram = Envelope::factor(self, regularization)?;
        Some(self.mul_transposed(&gram.solve(b)))
    }

    /// Numerical rank by row reduction with partial pivoting
    #[allow(clippy::needless_range_loop)]
    pub(crate) fn rank(&self, tolerance: f64) -> usize {
        let scale = self
            .rows
            .iter()
            .flatten()
            .fold(0.0f64, |acc, &(_, v)| acc.max(v.abs()));
        if scale == 0.0 {
            return 0;
        }
        let threshold = tolerance * scale;

        let rows = self.rows.len();
        let mut m = vec![vec![0.0f64; self.cols]; rows];
        // Last column that can be nonzero in each row
        let mut last = vec![0usize; rows];
        for (r, row) in self.rows.iter().enumerate() {
            for &(c, v) in row {
                m[r][c] = v;
                last[r] = c;
            }
        }

        let mut rank = 0;
        for col in 0..self.cols {
            if rank == rows {
                break;
            }
            let mut pivot = rank;
            for r in (rank + 1)..rows {
                if m[r][col].abs() > m[pivot][col].abs() {
                    pivot = r;
                }
            }
            if m[pivot][col].abs() <= threshold {
                continue;
            }
            m.swap(rank, pivot);
            last.swap(rank, pivot);

            let end = last[rank];
            for r in (rank + 1)..rows {
                let factor = m[r][col] / m[rank][col];
                if factor == 0.0 {
                    continue;
                }
                for c in col..=end {
                    m[r][c] -= factor * m[rank][c];
                }
                last[r] = last[r].max(end);
            }
            rank += 1;
        }
        rank
    }
}

/// Cholesky factor `L` of `A * A^T + reg * I` in envelope storage, with rows
/// permuted to keep the envelope narrow
struct Envelope {
    /// Row of `A` placed at each position
    order: Vec<usize>,
    /// First stored column of each row of `L`
    first: Vec<usize>,
    /// `L[i][first[i]..=i]`
    rows: Vec<Vec<f64>>,
}

impl Envelope {
    #[allow(clippy::needless_range_loop)]
    fn factor(a: &SparseRows, regularization: f64) -> Option<Self> {
        let graph = row_graph(a);
        let order = reverse_cuthill_mckee(&graph);
        let n = order.len();
        let mut position = vec![0usize; n];
        for (i, &r) in order.iter().enumerate() {
            position[r] = i;
        }

        let scale = a
            .rows
            .iter()
            .map(|row| dot(row, row))
            .fold(0.0f64, f64::max);
        let lambda = regularization * scale.max(1.0);

        let mut first = Vec::with_capacity(n);
        let mut rows = Vec::with_capacity(n);
        for (i, &r) in order.iter().enumerate() {
            let start = graph[r]
                .iter()
                .map(|&s| position[s])
                .filter(|&p| p < i)
                .min()
                .unwrap_or(i);
            let mut row = vec![0.0; i - start + 1];
            for &s in &graph[r] {
                let p = position[s];
                if p < i {
                    row[p - start] = dot(&a.rows[r], &a.rows[s]);
                }
            }
            row[i - start] = dot(&a.rows[r], &a.rows[r]) + lambda;
            first.push(start);
            rows.push(row);
        }

        for i in 0..n {
            let (done, rest) = rows.split_at_mut(i);
            let row = &mut rest[0];
            let fi = first[i];
            for j in fi..i {
                let fj = first[j];
                let lj = &done[j];
                let mut s = row[j - fi];
                for k in fi.max(fj)..j {
                    s -= row[k - fi] * lj[k - fj];
                }
                row[j - fi] = s / lj[j - fj];
            }
            let mut d = row[i - fi];
            for k in fi..i {
                d -= row[k - fi] * row[k - fi];
            }
            if !(d > 0.0 && d.is_finite()) {
                return None;
            }
            row[i - fi] = d.sqrt();
        }

        Some(Self { order, first, rows })
    }

    /// Solve `L * L^T * y = b` in the original row order
    #[allow(clippy::needless_range_loop)]
    fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.order.len();
        let mut z: Vec<f64> = self.order.iter().map(|&r| b[r]).collect();

        for i in 0..n {
            let fi = self.first[i];
            let row = &self.rows[i];
            let mut s = z[i];
            for k in fi..i {
                s -= row[k - fi] * z[k];
            }
            z[i] = s / row[i - fi];
        }
        for i in (0..n).rev() {
            let fi = self.first[i];
            let row = &self.rows[i];
            z[i] /= row[i - fi];
            let zi = z[i];
            for k in fi..i {
                z[k] -= row[k - fi] * zi;
            }
        }

        let mut y = vec![0.0; n];
        for (i, &r) in self.order.iter().enumerate() {
            y[r] = z[i];
        }
        y
    }
}

/// Rows sharing at least one column
fn row_graph(a: &SparseRows) -> Vec<Vec<usize>> {
    let mut col_rows = vec![Vec::new(); a.cols];
    for (r, row) in a.rows.iter().enumerate() {
        for &(c, _) in row {
            col_rows[c].push(r);
        }
    }

    let mut graph = vec![Vec::new(); a.rows.len()];
    for rows in &col_rows {
        for &r in rows {
            graph[r].extend(rows.iter().copied().filter(|&s| s != r));
        }
    }
    for neighbors in &mut graph {
        neighbors.sort_unstable();
        neighbors.dedup();
    }
    graph
}

/// Reverse Cuthill-McKee ordering, starting each connected part from its
/// lowest-degree node
fn reverse_cuthill_mckee(graph: &[Vec<usize>]) -> Vec<usize> {
    let n = graph.len();
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    let mut by_degree: Vec<usize> = (0..n).collect();
    by_degree.sort_by_key(|&r| graph[r].len());

    for &start in &by_degree {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut head = order.len();
        order.push(start);
        while head < order.len() {
            let node = order[head];
            head += 1;
            let mut next: Vec<usize> = graph[node]
                .iter()
                .copied()
                .filter(|&r| !visited[r])
                .collect();
            next.sort_by_key(|&r| graph[r].len());
            for r in next {
                visited[r] = true;
                order.push(r);
            }
        }
    }

    order.reverse();
    order
}

/// Dot product of two rows sorted by column
fn dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix(dense: &[&[f64]]) -> SparseRows {
        let cols = dense.first().map_or(0, |row| row.len());
        let mut m = SparseRows::new(dense.len(), cols);
        for (r, row) in dense.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                m.push(r, c, v);
            }
        }
        m
    }

    #[test]
    fn test_rank() {
        let m = matrix(&[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &[1.0, 1.0, 0.0]]);
        assert_eq!(m.rank(1e-9), 2);
        assert_eq!(matrix(&[&[0.0, 0.0], &[0.0, 0.0]]).rank(1e-9), 0);
        assert_eq!(matrix(&[&[0.0, 2.0], &[3.0, 0.0]]).rank(1e-9), 2);
    }

    #[test]
    fn test_min_norm_solve() {
        // A A^T = [[2, 1], [1, 2]], y = (0, 1), x = A^T y
        let a = matrix(&[&[1.0, 1.0, 0.0], &[0.0, 1.0, 1.0]]);
        let x = a.min_norm_solve(&[1.0, 2.0], 1e-14).unwrap();
        assert_relative_eq!(x[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_min_norm_solve_banded() {
        // Chain of differences x[k] - x[k+1] = 1 listed out of order
        let n = 12;
        let mut a = SparseRows::new(n - 1, n);
        for r in 0..n - 1 {
            let k = (r * 5) % (n - 1);
            a.push(r, k, 1.0);
            a.push(r, k + 1, -1.0);
        }
        let b = vec![1.0; n - 1];
        let x = a.min_norm_solve(&b, 1e-14).unwrap();
        for (residual, target) in a.mul(&x).iter().zip(&b) {
            assert_relative_eq!(*residual, *target, epsilon = 1e-8);
        }
        // Minimum norm keeps the mean at zero
        assert_relative_eq!(x.iter().sum::<f64>(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_ordering_is_a_permutation() {
        let a = matrix(&[
            &[1.0, 0.0, 0.0, 1.0],
            &[0.0, 1.0, 0.0, 0.0],
            &[0.0, 0.0, 1.0, 1.0],
            &[1.0, 0.0, 1.0, 0.0],
        ]);
        let mut order = reverse_cuthill_mckee(&row_graph(&a));
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
