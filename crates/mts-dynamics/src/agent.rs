//! One vehicle.

use mts_core::{AgentId, Delay, ItineraryId, NodeId, StreetId};

use crate::{SimError, SimResult};

/// A vehicle: where it is, where it is headed, and what it has accumulated.
///
/// An agent is either on a street (`street` is set; `delay` ticks remain in
/// the body before it reaches the head queue) or held by a node (`street` is
/// empty).  `next_street` carries the turn committed at node admission until
/// the discharge that consumes it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Agent {
    id: AgentId,
    itinerary: ItineraryId,
    src_node: NodeId,
    street: Option<StreetId>,
    next_street: Option<StreetId>,
    speed: f64,
    delay: Delay,
    distance: f64,
    time: u64,
}

impl Agent {
    pub fn new(id: AgentId, itinerary: ItineraryId, src_node: NodeId) -> Self {
        Self {
            id,
            itinerary,
            src_node,
            street: None,
            next_street: None,
            speed: 0.0,
            delay: 0,
            distance: 0.0,
            time: 0,
        }
    }

    // ── Getters ───────────────────────────────────────────────────────────

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn itinerary(&self) -> ItineraryId {
        self.itinerary
    }

    pub fn src_node(&self) -> NodeId {
        self.src_node
    }

    pub fn street(&self) -> Option<StreetId> {
        self.street
    }

    pub fn next_street(&self) -> Option<StreetId> {
        self.next_street
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Ticks remaining in the current street's body.
    pub fn delay(&self) -> Delay {
        self.delay
    }

    /// Metres travelled since insertion.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Ticks lived since insertion.
    pub fn time(&self) -> u64 {
        self.time
    }

    // ── State transitions ─────────────────────────────────────────────────

    pub fn set_itinerary(&mut self, itinerary: ItineraryId) {
        self.itinerary = itinerary;
    }

    pub fn set_src_node(&mut self, node: NodeId) {
        self.src_node = node;
    }

    pub fn set_speed(&mut self, speed: f64) -> SimResult<()> {
        if !(speed >= 0.0) {
            return Err(SimError::InvalidInput(format!(
                "agent speed must be non-negative, got {speed}"
            )));
        }
        self.speed = speed;
        Ok(())
    }

    /// Place the agent on a street with a freshly computed traverse delay.
    pub(crate) fn enter_street(&mut self, street: StreetId, speed: f64, delay: Delay) {
        self.street = Some(street);
        self.next_street = None;
        self.speed = speed;
        self.delay = delay;
    }

    /// Hand the agent over to a node, remembering the committed turn.
    pub(crate) fn enter_node(&mut self, next_street: Option<StreetId>) {
        self.street = None;
        self.next_street = next_street;
        self.speed = 0.0;
    }

    pub(crate) fn clear_next_street(&mut self) {
        self.next_street = None;
    }

    pub(crate) fn decrement_delay(&mut self) {
        self.delay = self.delay.saturating_sub(1);
    }

    pub(crate) fn add_distance(&mut self, metres: f64) {
        self.distance += metres;
    }

    pub(crate) fn add_time(&mut self) {
        self.time += 1;
    }
}
