//! Matrix error type.

use thiserror::Error;

/// Errors produced by `mts-matrix`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("index ({row}, {col}) out of range for {rows}x{cols} matrix")]
    OutOfRange { row: u32, col: u32, rows: u32, cols: u32 },

    #[error("shape mismatch: {lhs_rows}x{lhs_cols} vs {rhs_rows}x{rhs_cols}")]
    DimensionMismatch {
        lhs_rows: u32,
        lhs_cols: u32,
        rhs_rows: u32,
        rhs_cols: u32,
    },

    #[error("matrix is {rows}x{cols}, not square")]
    NotSquare { rows: u32, cols: u32 },

    #[error("entry ({row}, {col}) already set")]
    DuplicateEntry { row: u32, col: u32 },

    #[error("no entry at ({row}, {col})")]
    NotFound { row: u32, col: u32 },
}

pub type MatrixResult<T> = Result<T, MatrixError>;
