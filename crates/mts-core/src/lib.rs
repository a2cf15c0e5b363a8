//! `mts-core` — foundational types for the `rust_mts` traffic simulator.
//!
//! This crate is a dependency of every other `mts-*` crate.  It intentionally
//! has no `mts-*` dependencies and minimal external ones (only `rand`, plus
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module   | Contents                                                |
//! |----------|---------------------------------------------------------|
//! | [`ids`]  | `AgentId`, `NodeId`, `StreetId`, `ItineraryId`, aliases |
//! | [`rng`]  | `SimRng` (seeded, deterministic)                        |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                               |
//! |---------|------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.  |

pub mod ids;
pub mod rng;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use ids::{AgentId, Delay, ItineraryId, NodeId, Size, StreetId};
pub use rng::SimRng;
