//! `SparseMatrix<T>` — a fixed-shape sparse table keyed by `i * cols + j`.
//!
//! # Storage
//!
//! Entries live in a `BTreeMap<u32, T>` under their linearized key and are
//! stored only when different from `T::default()`.  The `BTreeMap` (rather
//! than a hash map) matters: every scan over entries is key-ordered, which is
//! what makes the simulator's stochastic decisions reproducible.
//!
//! Because `rows * cols` must fit in a `u32` key, the side length of a
//! square matrix is limited to 65,535.  Importers check this before
//! constructing a matrix.
//!
//! # Shape errors
//!
//! Out-of-bounds access and shape-incompatible arithmetic return
//! [`MatrixError`]; they never panic.  Reading an in-bounds cell that holds
//! no entry yields a reference to the default value.

use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use crate::{MatrixError, MatrixResult};

// ── Scalar ────────────────────────────────────────────────────────────────────

/// Value types that the normalization and strength/degree family can reduce
/// to `f64`.
pub trait Scalar: Copy + Default + PartialEq {
    fn to_f64(self) -> f64;
}

impl Scalar for bool {
    #[inline]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

impl Scalar for i32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Scalar for u32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Scalar for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

// ── SparseMatrix ──────────────────────────────────────────────────────────────

/// A `rows x cols` sparse matrix with entries under the linearized key
/// `i * cols + j`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SparseMatrix<T> {
    rows: u32,
    cols: u32,
    data: BTreeMap<u32, T>,
    /// Returned by reference for mapped-but-absent cells.
    default: T,
}

impl<T: Copy + Default + PartialEq> Default for SparseMatrix<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<T: Copy + Default + PartialEq> SparseMatrix<T> {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            data: BTreeMap::new(),
            default: T::default(),
        }
    }

    /// A one-column matrix: the vector shorthand used by the degree and
    /// strength reductions.
    pub fn vector(rows: u32) -> Self {
        Self::new(rows, 1)
    }

    // ── Shape ─────────────────────────────────────────────────────────────

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn shape(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Number of stored (non-default) entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of addressable cells.
    pub fn max_len(&self) -> u32 {
        self.rows * self.cols
    }

    #[inline]
    fn check(&self, row: u32, col: u32) -> MatrixResult<u32> {
        if row >= self.rows || col >= self.cols {
            return Err(MatrixError::OutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    #[inline]
    fn split(&self, key: u32) -> (u32, u32) {
        let cols = self.cols.max(1);
        (key / cols, key % cols)
    }

    fn check_shape(&self, other: &Self) -> MatrixResult<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MatrixError::DimensionMismatch {
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: other.rows,
                rhs_cols: other.cols,
            });
        }
        Ok(())
    }

    fn check_square(&self) -> MatrixResult<()> {
        if self.rows != self.cols {
            return Err(MatrixError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    // ── Insertion ─────────────────────────────────────────────────────────

    /// Insert a value at `(row, col)`, rejecting overwrites of an existing
    /// entry.  Inserting the default value into an empty cell is a no-op.
    pub fn insert(&mut self, row: u32, col: u32, value: T) -> MatrixResult<()> {
        let key = self.check(row, col)?;
        if self.data.contains_key(&key) {
            return Err(MatrixError::DuplicateEntry { row, col });
        }
        if value != self.default {
            self.data.insert(key, value);
        }
        Ok(())
    }

    /// [`insert`](Self::insert) under a linearized key.
    pub fn insert_linear(&mut self, key: u32, value: T) -> MatrixResult<()> {
        let (row, col) = self.split(key);
        self.insert(row, col, value)
    }

    /// Insert a value at `(row, col)`, overwriting any existing entry.
    /// Assigning the default value erases the entry.
    pub fn insert_or_assign(&mut self, row: u32, col: u32, value: T) -> MatrixResult<()> {
        let key = self.check(row, col)?;
        if value == self.default {
            self.data.remove(&key);
        } else {
            self.data.insert(key, value);
        }
        Ok(())
    }

    /// Grow the matrix (if needed) so that `(row, col)` is addressable, then
    /// assign.
    ///
    /// Growth is square-ish: both dimensions grow by the same delta, the
    /// larger of the two shortfalls, bumped once more when the target cell
    /// would still not be representable.  One-column vectors grow rows only.
    pub fn insert_and_expand(&mut self, row: u32, col: u32, value: T) {
        if row >= self.rows || col >= self.cols {
            let mut delta = row
                .saturating_sub(self.rows)
                .max(col.saturating_sub(self.cols));
            if self.cols == 1 {
                if row >= self.rows + delta {
                    delta += 1;
                }
                self.reshape_vec(self.rows + delta);
            } else {
                let (r, c) = (u64::from(self.rows + delta), u64::from(self.cols + delta));
                if u64::from(row) * c + u64::from(col) >= r * c {
                    delta += 1;
                }
                self.reshape(self.rows + delta, self.cols + delta);
            }
        }
        let key = row * self.cols + col;
        if value == self.default {
            self.data.remove(&key);
        } else {
            self.data.insert(key, value);
        }
    }

    // ── Removal ───────────────────────────────────────────────────────────

    /// Remove the entry at `(row, col)`.
    pub fn erase(&mut self, row: u32, col: u32) -> MatrixResult<()> {
        let key = self.check(row, col)?;
        match self.data.remove(&key) {
            Some(_) => Ok(()),
            None => Err(MatrixError::NotFound { row, col }),
        }
    }

    /// Remove row `row` and renumber: entries above it keep their keys,
    /// entries below shift up by one row.  The row count decreases by one.
    pub fn erase_row(&mut self, row: u32) -> MatrixResult<()> {
        self.check(row, 0)?;
        let old = std::mem::take(&mut self.data);
        for (key, value) in old {
            match (key / self.cols).cmp(&row) {
                std::cmp::Ordering::Less => {
                    self.data.insert(key, value);
                }
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Greater => {
                    self.data.insert(key - self.cols, value);
                }
            }
        }
        self.rows -= 1;
        Ok(())
    }

    /// Remove column `col` and renumber: entries to its left keep their
    /// column, entries to its right shift left by one.  The column count
    /// decreases by one.
    pub fn erase_column(&mut self, col: u32) -> MatrixResult<()> {
        self.check(0, col)?;
        let old = std::mem::take(&mut self.data);
        for (key, value) in old {
            let (i, j) = (key / self.cols, key % self.cols);
            match j.cmp(&col) {
                std::cmp::Ordering::Less => {
                    self.data.insert(i * (self.cols - 1) + j, value);
                }
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Greater => {
                    self.data.insert(i * (self.cols - 1) + j - 1, value);
                }
            }
        }
        self.cols -= 1;
        Ok(())
    }

    /// Zero every entry in row `row` without renumbering.
    pub fn empty_row(&mut self, row: u32) -> MatrixResult<()> {
        self.check(row, 0)?;
        let start = row * self.cols;
        let keys: Vec<u32> = self
            .data
            .range(start..start.saturating_add(self.cols))
            .map(|(&k, _)| k)
            .collect();
        for key in keys {
            self.data.remove(&key);
        }
        Ok(())
    }

    /// Zero every entry in column `col` without renumbering.
    pub fn empty_column(&mut self, col: u32) -> MatrixResult<()> {
        self.check(0, col)?;
        let keys: Vec<u32> = self
            .data
            .keys()
            .copied()
            .filter(|k| k % self.cols == col)
            .collect();
        for key in keys {
            self.data.remove(&key);
        }
        Ok(())
    }

    /// Drop every entry and reset the shape to `0 x 0`.
    pub fn clear(&mut self) {
        self.data.clear();
        self.rows = 0;
        self.cols = 0;
    }

    // ── Access ────────────────────────────────────────────────────────────

    /// `true` if `(row, col)` holds a stored entry.
    pub fn contains(&self, row: u32, col: u32) -> MatrixResult<bool> {
        let key = self.check(row, col)?;
        Ok(self.data.contains_key(&key))
    }

    /// Reference to the value at `(row, col)`; the default value for an
    /// in-bounds cell with no entry.
    pub fn get(&self, row: u32, col: u32) -> MatrixResult<&T> {
        let key = self.check(row, col)?;
        Ok(self.data.get(&key).unwrap_or(&self.default))
    }

    /// [`get`](Self::get) under a linearized key.
    pub fn get_linear(&self, key: u32) -> MatrixResult<&T> {
        let (row, col) = self.split(key);
        self.get(row, col)
    }

    /// Copy of the value at `key`, default when absent.  No bounds check;
    /// used by the arithmetic kernels which only see existing keys.
    #[inline]
    fn value_at(&self, key: u32) -> T {
        self.data.get(&key).copied().unwrap_or(self.default)
    }

    /// Key-ordered iteration over stored entries as `(linear_key, &value)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.data.iter().map(|(&k, v)| (k, v))
    }

    /// Key-ordered iteration over stored entries as `(row, col, &value)`.
    pub fn entries(&self) -> impl Iterator<Item = (u32, u32, &T)> + '_ {
        let cols = self.cols;
        self.data.iter().map(move |(&k, v)| (k / cols, k % cols, v))
    }

    /// The stored entries of row `row` as `(col, &value)`, key-ordered.
    pub fn row_entries(&self, row: u32) -> impl Iterator<Item = (u32, &T)> + '_ {
        let cols = self.cols;
        let start = row * cols;
        self.data
            .range(start..start.saturating_add(cols))
            .map(move |(&k, v)| (k % cols, v))
    }

    // ── Projections ───────────────────────────────────────────────────────

    /// Row `row` as a `1 x cols` matrix; with `keep_index` the result keeps
    /// the original shape with only that row populated.
    pub fn row(&self, row: u32, keep_index: bool) -> MatrixResult<SparseMatrix<T>> {
        self.check(row, 0)?;
        let mut out = if keep_index {
            SparseMatrix::new(self.rows, self.cols)
        } else {
            SparseMatrix::new(1, self.cols)
        };
        let start = row * self.cols;
        for (&key, &value) in self.data.range(start..start.saturating_add(self.cols)) {
            let k = if keep_index { key } else { key % self.cols };
            out.data.insert(k, value);
        }
        Ok(out)
    }

    /// Column `col` as a `rows x 1` matrix; with `keep_index` the result
    /// keeps the original shape with only that column populated.
    pub fn col(&self, col: u32, keep_index: bool) -> MatrixResult<SparseMatrix<T>> {
        self.check(0, col)?;
        let mut out = if keep_index {
            SparseMatrix::new(self.rows, self.cols)
        } else {
            SparseMatrix::new(self.rows, 1)
        };
        for (&key, &value) in &self.data {
            if key % self.cols == col {
                let k = if keep_index { key } else { key / self.cols };
                out.data.insert(k, value);
            }
        }
        Ok(out)
    }

    // ── Reshaping ─────────────────────────────────────────────────────────

    /// Resize in place.  Entries keep their `(row, col)` position; entries
    /// whose linear key or position falls outside the new shape are dropped.
    pub fn reshape(&mut self, rows: u32, cols: u32) {
        let old_cols = self.cols.max(1);
        let old = std::mem::take(&mut self.data);
        self.rows = rows;
        self.cols = cols;
        for (key, value) in old {
            if u64::from(key) >= u64::from(rows) * u64::from(cols) {
                continue;
            }
            let (i, j) = (key / old_cols, key % old_cols);
            if i < rows && j < cols {
                self.data.insert(i * cols + j, value);
            }
        }
    }

    /// Resize to a one-column vector, preserving entries whose linear key
    /// remains in range.
    pub fn reshape_vec(&mut self, rows: u32) {
        self.rows = rows;
        self.cols = 1;
        self.data.retain(|&k, _| k < rows);
    }

    /// The transpose as a new `cols x rows` matrix.
    pub fn transpose(&self) -> SparseMatrix<T> {
        let mut out = SparseMatrix::new(self.cols, self.rows);
        for (&key, &value) in &self.data {
            let (i, j) = self.split(key);
            out.data.insert(j * self.rows + i, value);
        }
        out
    }

    // ── Arithmetic ────────────────────────────────────────────────────────

    /// Element-wise sum.  Cells summing to the default value are left
    /// unstored, so `m.try_sub(&m)` equals the all-default matrix.
    pub fn try_add(&self, other: &Self) -> MatrixResult<Self>
    where
        T: Add<Output = T>,
    {
        self.check_shape(other)?;
        let mut out = SparseMatrix::new(self.rows, self.cols);
        for &key in self.data.keys().chain(other.data.keys()) {
            let sum = self.value_at(key) + other.value_at(key);
            if sum != out.default {
                out.data.insert(key, sum);
            }
        }
        Ok(out)
    }

    /// Element-wise difference.
    pub fn try_sub(&self, other: &Self) -> MatrixResult<Self>
    where
        T: Sub<Output = T>,
    {
        self.check_shape(other)?;
        let mut out = SparseMatrix::new(self.rows, self.cols);
        for &key in self.data.keys().chain(other.data.keys()) {
            let diff = self.value_at(key) - other.value_at(key);
            if diff != out.default {
                out.data.insert(key, diff);
            }
        }
        Ok(out)
    }

    /// In-place element-wise sum.
    pub fn try_add_assign(&mut self, other: &Self) -> MatrixResult<()>
    where
        T: Add<Output = T>,
    {
        self.check_shape(other)?;
        for (&key, &value) in &other.data {
            let sum = self.value_at(key) + value;
            if sum == self.default {
                self.data.remove(&key);
            } else {
                self.data.insert(key, sum);
            }
        }
        Ok(())
    }

    /// In-place element-wise difference.
    pub fn try_sub_assign(&mut self, other: &Self) -> MatrixResult<()>
    where
        T: Sub<Output = T>,
    {
        self.check_shape(other)?;
        for (&key, &value) in &other.data {
            let diff = self.value_at(key) - value;
            if diff == self.default {
                self.data.remove(&key);
            } else {
                self.data.insert(key, diff);
            }
        }
        Ok(())
    }

    /// `M + M^T`, making the sparsity pattern symmetric.
    pub fn symmetrize(&mut self) -> MatrixResult<()>
    where
        T: Add<Output = T>,
    {
        let t = self.transpose();
        self.try_add_assign(&t)
    }
}

// ── Reductions over Scalar values ─────────────────────────────────────────────

impl<T: Scalar> SparseMatrix<T> {
    /// Each row scaled so its absolute values sum to 1.  Rows whose sum is
    /// below machine epsilon are copied through unscaled.
    pub fn norm_rows(&self) -> SparseMatrix<f64> {
        let mut sums: BTreeMap<u32, f64> = BTreeMap::new();
        for (&key, &value) in &self.data {
            *sums.entry(key / self.cols).or_default() += value.to_f64().abs();
        }
        let mut out = SparseMatrix::new(self.rows, self.cols);
        for (&key, &value) in &self.data {
            let sum = sums[&(key / self.cols)];
            let sum = if sum < f64::EPSILON { 1.0 } else { sum };
            out.data.insert(key, value.to_f64() / sum);
        }
        out
    }

    /// Each column scaled so its absolute values sum to 1.  Columns whose
    /// sum is below machine epsilon are copied through unscaled.
    pub fn norm_cols(&self) -> SparseMatrix<f64> {
        let mut sums: BTreeMap<u32, f64> = BTreeMap::new();
        for (&key, &value) in &self.data {
            *sums.entry(key % self.cols).or_default() += value.to_f64().abs();
        }
        let mut out = SparseMatrix::new(self.rows, self.cols);
        for (&key, &value) in &self.data {
            let sum = sums[&(key % self.cols)];
            let sum = if sum < f64::EPSILON { 1.0 } else { sum };
            out.data.insert(key, value.to_f64() / sum);
        }
        out
    }

    /// Out-degree of each row of a square matrix, as a one-column vector.
    pub fn degree_vector(&self) -> MatrixResult<SparseMatrix<i32>> {
        self.check_square()?;
        let mut out = SparseMatrix::vector(self.rows);
        for &key in self.data.keys() {
            let row = key / self.cols;
            let d = out.value_at(row) + 1;
            out.data.insert(row, d);
        }
        Ok(out)
    }

    /// Sum of each row's values of a square matrix, as a one-column vector.
    pub fn strength_vector(&self) -> MatrixResult<SparseMatrix<f64>> {
        self.check_square()?;
        let mut out = SparseMatrix::vector(self.rows);
        for (&key, &value) in &self.data {
            let row = key / self.cols;
            let s = out.value_at(row) + value.to_f64();
            if s == 0.0 {
                out.data.remove(&row);
            } else {
                out.data.insert(row, s);
            }
        }
        Ok(out)
    }

    /// The graph Laplacian `D - A` of a square matrix: `-1` at every stored
    /// entry, the row degree on the diagonal.
    pub fn laplacian(&self) -> MatrixResult<SparseMatrix<i32>> {
        self.check_square()?;
        let degree = self.degree_vector()?;
        let mut out = SparseMatrix::new(self.rows, self.cols);
        for &key in self.data.keys() {
            out.data.insert(key, -1);
        }
        for (&row, &d) in &degree.data {
            out.data.insert(row * self.cols + row, d);
        }
        Ok(out)
    }
}
