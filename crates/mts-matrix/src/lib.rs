//! `mts-matrix` — dimensioned sparse table over unsigned indices.
//!
//! # Crate layout
//!
//! | Module     | Contents                                    |
//! |------------|---------------------------------------------|
//! | [`matrix`] | `SparseMatrix<T>`, the `Scalar` value trait |
//! | [`error`]  | `MatrixError`, `MatrixResult<T>`            |
//!
//! The matrix backs two distinct roles in the simulator: the graph's boolean
//! adjacency table and each itinerary's successor table.  A one-column
//! matrix doubles as a vector (degree and strength vectors); it is the same
//! type, not a separate one.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public types.  |

pub mod error;
pub mod matrix;


pub use error::{MatrixError, MatrixResult};
pub use matrix::{Scalar, SparseMatrix};
