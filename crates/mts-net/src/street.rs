//! Directed street: a FIFO-queued edge between two nodes.
//!
//! # Two-stage occupancy
//!
//! A street holds agents in two stages.  Agents first travel the street's
//! *body* (each counting down a per-agent delay held by the engine), then
//! wait in the *head queue* for their turn through the destination node.
//! The street itself tracks only how many agents are in the body; their ids
//! live with the engine.  Head-queue membership is the street's FIFO queue.
//!
//! Occupancy (body + queue) is bounded by `capacity`; density is the filled
//! fraction of the head queue, which is what the entry-speed law consumes.

use std::collections::VecDeque;

use mts_core::{AgentId, NodeId, Size, StreetId};

use crate::{NetError, NetResult};

/// Default speed limit in m/s (roughly 50 km/h) for streets created by the
/// matrix importer, which carries no speed information.
pub const DEFAULT_MAX_SPEED: f64 = 13.9;

const DEFAULT_LENGTH: f64 = 1.0;
const DEFAULT_CAPACITY: Size = 1;
const DEFAULT_TRANSPORT_CAPACITY: Size = 1;

// ── SpireCounters ─────────────────────────────────────────────────────────────

/// Cumulative flow counters for an instrumented ("spire") street.
///
/// Every head-queue enqueue ticks the inbound counter and every dequeue the
/// outbound one, mimicking an induction-loop detector at the stop line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpireCounters {
    input: Size,
    output: Size,
}

// ── Street ────────────────────────────────────────────────────────────────────

/// A directed edge of the road network.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Street {
    id: StreetId,
    node_pair: (NodeId, NodeId),
    length: f64,
    max_speed: f64,
    capacity: Size,
    transport_capacity: Size,
    /// Azimuth from source to destination, radians in `[-pi, pi]`.
    angle: f64,
    /// Agents currently traversing the body.
    running: Size,
    /// Agents waiting at the head, front first.
    queue: VecDeque<AgentId>,
    spire: Option<SpireCounters>,
}

impl Street {
    /// A street from `src` to `dst` with default length, capacity, transport
    /// capacity, and speed limit.  Tune with the `with_*` builders.
    pub fn new(id: StreetId, node_pair: (NodeId, NodeId)) -> Self {
        Self {
            id,
            node_pair,
            length: DEFAULT_LENGTH,
            max_speed: DEFAULT_MAX_SPEED,
            capacity: DEFAULT_CAPACITY,
            transport_capacity: DEFAULT_TRANSPORT_CAPACITY,
            angle: 0.0,
            running: 0,
            queue: VecDeque::new(),
            spire: None,
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    pub fn with_capacity(mut self, capacity: Size) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    // ── Getters ───────────────────────────────────────────────────────────

    pub fn id(&self) -> StreetId {
        self.id
    }

    pub fn node_pair(&self) -> (NodeId, NodeId) {
        self.node_pair
    }

    pub fn source(&self) -> NodeId {
        self.node_pair.0
    }

    pub fn destination(&self) -> NodeId {
        self.node_pair.1
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn capacity(&self) -> Size {
        self.capacity
    }

    pub fn transport_capacity(&self) -> Size {
        self.transport_capacity
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn queue(&self) -> &VecDeque<AgentId> {
        &self.queue
    }

    /// Agents traversing the body (not yet queued at the head).
    pub fn running(&self) -> Size {
        self.running
    }

    /// Total agents on the street: body plus head queue.
    pub fn occupancy(&self) -> Size {
        self.running + self.queue.len() as Size
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    /// Filled fraction of the head queue, in `[0, 1]`.
    pub fn density(&self) -> f64 {
        self.queue.len() as f64 / self.capacity as f64
    }

    pub fn is_spire(&self) -> bool {
        self.spire.is_some()
    }

    // ── Setters ───────────────────────────────────────────────────────────

    pub(crate) fn set_id(&mut self, id: StreetId) {
        self.id = id;
    }

    pub fn set_length(&mut self, length: f64) -> NetResult<()> {
        if !(length > 0.0) {
            return Err(NetError::InvalidInput(format!(
                "street length must be positive, got {length}"
            )));
        }
        self.length = length;
        Ok(())
    }

    pub fn set_capacity(&mut self, capacity: Size) -> NetResult<()> {
        if capacity < self.occupancy() {
            return Err(NetError::InvalidInput(format!(
                "street capacity {capacity} is below current occupancy {}",
                self.occupancy()
            )));
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn set_max_speed(&mut self, max_speed: f64) -> NetResult<()> {
        if !(max_speed > 0.0) {
            return Err(NetError::InvalidInput(format!(
                "street speed limit must be positive, got {max_speed}"
            )));
        }
        self.max_speed = max_speed;
        Ok(())
    }

    pub fn set_transport_capacity(&mut self, transport_capacity: Size) {
        self.transport_capacity = transport_capacity;
    }

    /// Set the azimuth from the endpoints' `(lat, lon)` coordinates.
    pub fn set_angle_from_coords(&mut self, src: (f64, f64), dst: (f64, f64)) {
        self.angle = (dst.0 - src.0).atan2(dst.1 - src.1);
    }

    /// Set the azimuth directly; must lie in `[-pi, pi]`.
    pub fn set_angle(&mut self, angle: f64) -> NetResult<()> {
        if !(-std::f64::consts::PI..=std::f64::consts::PI).contains(&angle) {
            return Err(NetError::InvalidInput(format!(
                "street angle {angle} outside [-pi, pi]"
            )));
        }
        self.angle = angle;
        Ok(())
    }

    /// Replace the head queue wholesale.
    pub fn set_queue(&mut self, queue: VecDeque<AgentId>) {
        self.queue = queue;
    }

    // ── Occupancy transitions ─────────────────────────────────────────────

    /// Admit an agent into the street body.
    pub fn enter(&mut self) -> NetResult<()> {
        if self.is_full() {
            return Err(NetError::StreetFull(self.id));
        }
        self.running += 1;
        Ok(())
    }

    /// Move an agent from the body to the tail of the head queue.
    pub fn enqueue(&mut self, agent: AgentId) -> NetResult<()> {
        if (self.queue.len() as Size) >= self.capacity {
            return Err(NetError::StreetFull(self.id));
        }
        self.running = self.running.saturating_sub(1);
        self.queue.push_back(agent);
        if let Some(spire) = &mut self.spire {
            spire.input += 1;
        }
        Ok(())
    }

    /// Remove and return the agent at the front of the head queue.
    pub fn dequeue(&mut self) -> Option<AgentId> {
        let agent = self.queue.pop_front();
        if agent.is_some() {
            if let Some(spire) = &mut self.spire {
                spire.output += 1;
            }
        }
        agent
    }

    /// The agent at the front of the head queue, if any.
    pub fn front(&self) -> Option<AgentId> {
        self.queue.front().copied()
    }

    // ── Spire instrumentation ─────────────────────────────────────────────

    /// Attach flow counters.  Converting an already instrumented street
    /// leaves its counters untouched.
    pub fn make_spire(&mut self) {
        self.spire.get_or_insert_with(SpireCounters::default);
    }

    /// Cumulative head-queue enqueues; zeroed when `reset` is set.
    /// Always 0 for uninstrumented streets.
    pub fn input_counts(&mut self, reset: bool) -> Size {
        match &mut self.spire {
            None => 0,
            Some(spire) => {
                let n = spire.input;
                if reset {
                    spire.input = 0;
                }
                n
            }
        }
    }

    /// Cumulative head-queue dequeues; zeroed when `reset` is set.
    /// Always 0 for uninstrumented streets.
    pub fn output_counts(&mut self, reset: bool) -> Size {
        match &mut self.spire {
            None => 0,
            Some(spire) => {
                let n = spire.output;
                if reset {
                    spire.output = 0;
                }
                n
            }
        }
    }
}
