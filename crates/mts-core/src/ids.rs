//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as `BTreeMap` keys and
//! sorted collection elements without ceremony.  The inner integer is `pub`
//! to allow direct arithmetic where the id encoding matters (street ids are
//! derived from their endpoints), but callers should prefer the `.index()`
//! helper and [`StreetId::between`] for clarity.

use std::fmt;

/// Unsigned count type: node/street capacities, occupancies, admission tallies.
pub type Size = u32;

/// Unsigned tick count: traverse delays and traffic-light counters.
pub type Delay = u32;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID" — equivalent to `u32::MAX`.
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// Identifier of a vehicle.  Assigned monotonically by the engine.
    pub struct AgentId(u32);
}

typed_id! {
    /// Identifier of a road-network node.
    pub struct NodeId(u32);
}

typed_id! {
    /// Identifier of a directed street.
    ///
    /// After `Graph::build_adj` every street id encodes its endpoints as
    /// `src * n + dst`, where `n` is one past the largest node id.  This is
    /// the same linearization the adjacency matrix uses, so a street id and
    /// its matrix cell coincide.
    pub struct StreetId(u32);
}

typed_id! {
    /// Identifier of an itinerary (a destination plus its routing table).
    pub struct ItineraryId(u32);
}

impl StreetId {
    /// The canonical id of the street from `src` to `dst` in an `n`-node
    /// network: `src * n + dst`.
    #[inline]
    pub fn between(src: NodeId, dst: NodeId, n: u32) -> StreetId {
        StreetId(src.0 * n + dst.0)
    }

    /// Recover `(src, dst)` from a canonical street id in an `n`-node network.
    #[inline]
    pub fn endpoints(self, n: u32) -> (NodeId, NodeId) {
        (NodeId(self.0 / n), NodeId(self.0 % n))
    }
}
