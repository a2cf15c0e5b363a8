//! `mts-net` — the road network: streets, nodes, the owning graph, and
//! topology I/O.
//!
//! # Crate layout
//!
//! | Module     | Contents                                                 |
//! |------------|----------------------------------------------------------|
//! | [`street`] | `Street` (directed FIFO edge), spire counters            |
//! | [`node`]   | `Node` + `NodeKind` (intersection, light, roundabout)    |
//! | [`graph`]  | `Graph` (owner of nodes/streets/adjacency), Dijkstra     |
//! | [`io`]     | matrix/coordinate/OSM-CSV importers, matrix exporter     |
//! | [`error`]  | `NetError`, `NetResult<T>`                               |
//!
//! # Ownership
//!
//! The [`Graph`] is the single owner of every node and street, keyed by id in
//! `BTreeMap`s.  Nothing in this crate holds references across components;
//! the engine navigates by id.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public types.  |

pub mod error;
pub mod graph;
pub mod io;
pub mod node;
pub mod street;


pub use error::{NetError, NetResult};
pub use graph::Graph;
pub use node::{Intersection, Node, NodeKind, Roundabout, TrafficLight};
pub use street::{SpireCounters, Street, DEFAULT_MAX_SPEED};
