//! `mts-dynamics` — the discrete-time traffic engine.
//!
//! # Crate layout
//!
//! | Module          | Contents                                           |
//! |-----------------|----------------------------------------------------|
//! | [`agent`]       | `Agent` (one vehicle)                              |
//! | [`itinerary`]   | `Itinerary` (destination + routing table)          |
//! | [`measurement`] | `Measurement` (mean and standard deviation)        |
//! | [`dynamics`]    | `Dynamics` (the tick loop), `SpawnConfig`          |
//! | [`error`]       | `SimError`, `SimResult<T>`                         |
//!
//! # The tick
//!
//! [`Dynamics::evolve`] advances the network by one tick in a fixed phase
//! order: signal counters, in-transit movement, street-head transfers,
//! node discharges, spawning, clock.  Every phase completes over the whole
//! network before the next begins, and every map it walks is key-ordered,
//! so a seeded run is bit-reproducible.
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                  |
//! |------------|---------------------------------------------------------|
//! | `serde`    | Derives `Serialize`/`Deserialize` on public types.      |
//! | `parallel` | Runs the in-transit phase on Rayon's thread pool.       |

pub mod agent;
pub mod dynamics;
pub mod error;
pub mod itinerary;
pub mod measurement;

#[cfg(test)]
mod tests;

pub use agent::Agent;
pub use dynamics::{Dynamics, SpawnConfig, TurnCounts};
pub use error::{SimError, SimResult};
pub use itinerary::Itinerary;
pub use measurement::Measurement;
