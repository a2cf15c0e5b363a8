//! Engine error type.

use thiserror::Error;

use mts_core::{AgentId, ItineraryId};
use mts_matrix::MatrixError;
use mts_net::NetError;

/// Errors produced by `mts-dynamics`.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("itinerary {0} not found")]
    ItineraryNotFound(ItineraryId),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

pub type SimResult<T> = Result<T, SimError>;
