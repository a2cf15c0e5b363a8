//! Network-subsystem error type.

use thiserror::Error;

use mts_core::{AgentId, NodeId, StreetId};
use mts_matrix::MatrixError;

/// Errors produced by `mts-net`.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("node {0} is full")]
    NodeFull(NodeId),

    #[error("street {0} is full")]
    StreetFull(StreetId),

    #[error("agent {0} is already present")]
    DuplicateOccupant(AgentId),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("street {0} not found")]
    StreetNotFound(StreetId),

    #[error("traffic light delay has not been set")]
    DelayNotSet,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

pub type NetResult<T> = Result<T, NetError>;
