//! A destination plus its routing table.

use mts_core::{ItineraryId, NodeId};
use mts_matrix::SparseMatrix;

use crate::{SimError, SimResult};

/// Routing target shared by any number of agents.
///
/// The `path` matrix marks valid next hops: `path(u, v)` is set exactly when
/// the street `u -> v` begins a shortest path from `u` to `destination`.
/// It is absent until the engine computes routes and is rebuilt on demand
/// when the topology changes.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Itinerary {
    id: ItineraryId,
    destination: NodeId,
    path: Option<SparseMatrix<bool>>,
}

impl Itinerary {
    pub fn new(id: ItineraryId, destination: NodeId) -> Self {
        Self {
            id,
            destination,
            path: None,
        }
    }

    pub fn id(&self) -> ItineraryId {
        self.id
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn path(&self) -> Option<&SparseMatrix<bool>> {
        self.path.as_ref()
    }

    /// Retarget the itinerary; the stale routing table is dropped.
    pub fn set_destination(&mut self, destination: NodeId) {
        self.destination = destination;
        self.path = None;
    }

    /// Install a routing table; must be square.
    pub fn set_path(&mut self, path: SparseMatrix<bool>) -> SimResult<()> {
        if path.rows() != path.cols() {
            return Err(SimError::InvalidInput(format!(
                "routing table must be square, got {}x{}",
                path.rows(),
                path.cols()
            )));
        }
        self.path = Some(path);
        Ok(())
    }
}
