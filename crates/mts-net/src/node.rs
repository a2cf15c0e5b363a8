//! Network nodes: plain intersections, signalized intersections, and
//! roundabouts.
//!
//! # One value type, three variants
//!
//! Every node shares a small header (id, optional coordinates, capacity, the
//! set of priority inbound streets, an admission tally) and carries its
//! variant-specific state in [`NodeKind`].  The engine pattern-matches at
//! exactly two places: admitting an agent from a street head and discharging
//! an agent onto its next street.
//!
//! # Intersection ordering
//!
//! Intersection occupants are held in a vector sorted by an `i16` priority
//! key, stable within equal keys.  The key is `round(angle * 100)` of the
//! turn the agent is about to make; smaller keys discharge first.  Agents
//! admitted without an angle go to the back of the current order.

use std::collections::{BTreeSet, VecDeque};

use mts_core::{AgentId, Delay, NodeId, Size, StreetId};

use crate::{NetError, NetResult};

// ── Variant bodies ────────────────────────────────────────────────────────────

/// Priority-ordered occupant list of a plain intersection.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Intersection {
    /// `(priority_key, agent)`, sorted ascending by key, stable.
    agents: Vec<(i16, AgentId)>,
}

impl Intersection {
    fn contains(&self, agent: AgentId) -> bool {
        self.agents.iter().any(|&(_, a)| a == agent)
    }

    /// Insert after every existing entry with the same or a smaller key.
    fn insert(&mut self, key: i16, agent: AgentId) {
        let pos = self.agents.partition_point(|&(k, _)| k <= key);
        self.agents.insert(pos, (key, agent));
    }

    fn tail_key(&self) -> i16 {
        self.agents.last().map_or(0, |&(k, _)| k.saturating_add(1))
    }

    fn remove(&mut self, agent: AgentId) -> bool {
        match self.agents.iter().position(|&(_, a)| a == agent) {
            Some(pos) => {
                self.agents.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Occupants in discharge order (smallest key first).
    pub fn agents(&self) -> &[(i16, AgentId)] {
        &self.agents
    }
}

/// A signalized intersection: a plain intersection gated by a two-phase
/// signal cycle.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficLight {
    pub(crate) intersection: Intersection,
    /// `(green, red)` phase lengths in ticks; unset until configured.
    delay: Option<(Delay, Delay)>,
    /// Position inside the cycle, in `[0, green + red)`.
    counter: Delay,
    /// Pending counter value adopted at the next cycle boundary; 0 = none.
    phase: Delay,
}

impl TrafficLight {
    pub fn delay(&self) -> Option<(Delay, Delay)> {
        self.delay
    }

    pub fn counter(&self) -> Delay {
        self.counter
    }

    /// Configure (or reconfigure) the phase lengths.
    ///
    /// On reconfiguration the counter is adjusted so the time remaining
    /// until the next flip is preserved: a counter beyond the new cycle is
    /// clamped to its last tick, and a counter inside a shrinking green
    /// window is pulled back by the amount the window shrank.
    pub fn set_delay(&mut self, green: Delay, red: Delay) {
        if let Some((old_green, _)) = self.delay {
            if self.counter >= green + red {
                self.counter = (green + red).saturating_sub(1);
            } else if green < old_green && self.counter >= green && self.counter <= old_green {
                self.counter = green.saturating_sub(old_green - self.counter);
            }
        }
        self.delay = Some((green, red));
    }

    /// Jump the cycle position immediately.  Values beyond the cycle wrap.
    pub fn set_phase(&mut self, phase: Delay) -> NetResult<()> {
        let (green, red) = self.delay.ok_or(NetError::DelayNotSet)?;
        let mut phase = phase;
        if phase > green + red {
            phase -= green + red;
        }
        self.counter = phase;
        self.phase = 0;
        Ok(())
    }

    /// Schedule a cycle position to be adopted when the current cycle ends.
    pub fn set_phase_after_cycle(&mut self, phase: Delay) -> NetResult<()> {
        let (green, red) = self.delay.ok_or(NetError::DelayNotSet)?;
        let mut phase = phase;
        if phase > green + red {
            phase -= green + red;
        }
        self.phase = phase;
        Ok(())
    }

    /// Advance the cycle by one tick, wrapping at the boundary (or adopting
    /// a pending phase there).
    pub fn increase_counter(&mut self) -> NetResult<()> {
        let (green, red) = self.delay.ok_or(NetError::DelayNotSet)?;
        self.counter += 1;
        if self.counter == green + red {
            self.counter = self.phase;
            self.phase = 0;
        }
        Ok(())
    }

    /// `true` during the first (green) half-cycle.
    pub fn is_green(&self) -> NetResult<bool> {
        let (green, _) = self.delay.ok_or(NetError::DelayNotSet)?;
        Ok(self.counter < green)
    }
}

/// A roundabout: one strict FIFO ring.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Roundabout {
    agents: VecDeque<AgentId>,
}

impl Roundabout {
    /// Occupants front first.
    pub fn agents(&self) -> &VecDeque<AgentId> {
        &self.agents
    }
}

/// The variant-specific state of a node.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Intersection(Intersection),
    TrafficLight(TrafficLight),
    Roundabout(Roundabout),
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// A vertex of the road network.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    id: NodeId,
    coords: Option<(f64, f64)>,
    capacity: Size,
    /// Inbound streets whose agents are admitted ahead of the others.
    street_priorities: BTreeSet<StreetId>,
    /// Admissions since the last `take_agent_counter` call.
    agent_counter: Size,
    kind: NodeKind,
}

impl Node {
    /// A plain intersection with capacity 1.
    pub fn intersection(id: NodeId) -> Self {
        Self {
            id,
            coords: None,
            capacity: 1,
            street_priorities: BTreeSet::new(),
            agent_counter: 0,
            kind: NodeKind::Intersection(Intersection::default()),
        }
    }

    /// A signalized intersection with capacity 1; phase lengths must be set
    /// with [`TrafficLight::set_delay`] before the first tick.
    pub fn traffic_light(id: NodeId) -> Self {
        Self {
            kind: NodeKind::TrafficLight(TrafficLight::default()),
            ..Self::intersection(id)
        }
    }

    /// A roundabout with capacity 1.
    pub fn roundabout(id: NodeId) -> Self {
        Self {
            kind: NodeKind::Roundabout(Roundabout::default()),
            ..Self::intersection(id)
        }
    }

    pub fn with_coords(mut self, lat: f64, lon: f64) -> Self {
        self.coords = Some((lat, lon));
        self
    }

    pub fn with_capacity(mut self, capacity: Size) -> Self {
        self.capacity = capacity;
        self
    }

    // ── Header accessors ──────────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn coords(&self) -> Option<(f64, f64)> {
        self.coords
    }

    pub fn set_coords(&mut self, lat: f64, lon: f64) {
        self.coords = Some((lat, lon));
    }

    pub fn capacity(&self) -> Size {
        self.capacity
    }

    /// Change the capacity; rejected below the current occupancy or zero.
    pub fn set_capacity(&mut self, capacity: Size) -> NetResult<()> {
        if capacity == 0 {
            return Err(NetError::InvalidInput(
                "node capacity must be at least 1".into(),
            ));
        }
        if capacity < self.occupancy() {
            return Err(NetError::InvalidInput(format!(
                "node capacity {capacity} is below current occupancy {}",
                self.occupancy()
            )));
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn street_priorities(&self) -> &BTreeSet<StreetId> {
        &self.street_priorities
    }

    pub fn set_street_priorities(&mut self, priorities: BTreeSet<StreetId>) {
        self.street_priorities = priorities;
    }

    pub fn add_street_priority(&mut self, street: StreetId) {
        self.street_priorities.insert(street);
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_intersection(&self) -> bool {
        matches!(self.kind, NodeKind::Intersection(_))
    }

    pub fn is_traffic_light(&self) -> bool {
        matches!(self.kind, NodeKind::TrafficLight(_))
    }

    pub fn is_roundabout(&self) -> bool {
        matches!(self.kind, NodeKind::Roundabout(_))
    }

    /// Admissions since the last call; resets the tally.
    pub fn take_agent_counter(&mut self) -> Size {
        std::mem::take(&mut self.agent_counter)
    }

    // ── Occupancy ─────────────────────────────────────────────────────────

    pub fn occupancy(&self) -> Size {
        match &self.kind {
            NodeKind::Intersection(i) => i.agents.len() as Size,
            NodeKind::TrafficLight(t) => t.intersection.agents.len() as Size,
            NodeKind::Roundabout(r) => r.agents.len() as Size,
        }
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    /// Admit an agent keyed by its turn angle (radians); intersections order
    /// their discharge by `round(angle * 100)`.  Roundabouts ignore the
    /// angle and append FIFO.
    pub fn add_agent_with_angle(&mut self, angle: f64, agent: AgentId) -> NetResult<()> {
        self.admit(agent, Some((angle * 100.0).round() as i16))
    }

    /// Admit an agent at the back of the current discharge order.
    pub fn add_agent(&mut self, agent: AgentId) -> NetResult<()> {
        self.admit(agent, None)
    }

    fn admit(&mut self, agent: AgentId, key: Option<i16>) -> NetResult<()> {
        if self.is_full() {
            return Err(NetError::NodeFull(self.id));
        }
        match &mut self.kind {
            NodeKind::Intersection(i) => {
                if i.contains(agent) {
                    return Err(NetError::DuplicateOccupant(agent));
                }
                let key = key.unwrap_or_else(|| i.tail_key());
                i.insert(key, agent);
            }
            NodeKind::TrafficLight(t) => {
                let i = &mut t.intersection;
                if i.contains(agent) {
                    return Err(NetError::DuplicateOccupant(agent));
                }
                let key = key.unwrap_or_else(|| i.tail_key());
                i.insert(key, agent);
            }
            NodeKind::Roundabout(r) => {
                if r.agents.contains(&agent) {
                    return Err(NetError::DuplicateOccupant(agent));
                }
                r.agents.push_back(agent);
            }
        }
        self.agent_counter += 1;
        Ok(())
    }

    /// Remove an agent wherever it sits in the occupant order.
    pub fn remove_agent(&mut self, agent: AgentId) -> NetResult<()> {
        let removed = match &mut self.kind {
            NodeKind::Intersection(i) => i.remove(agent),
            NodeKind::TrafficLight(t) => t.intersection.remove(agent),
            NodeKind::Roundabout(r) => match r.agents.iter().position(|&a| a == agent) {
                Some(pos) => {
                    r.agents.remove(pos);
                    true
                }
                None => false,
            },
        };
        if removed {
            Ok(())
        } else {
            Err(NetError::AgentNotFound(agent))
        }
    }

    /// Occupants in discharge order: intersections by ascending priority
    /// key, roundabouts front first.
    pub fn discharge_order(&self) -> Vec<AgentId> {
        match &self.kind {
            NodeKind::Intersection(i) => i.agents.iter().map(|&(_, a)| a).collect(),
            NodeKind::TrafficLight(t) => t.intersection.agents.iter().map(|&(_, a)| a).collect(),
            NodeKind::Roundabout(r) => r.agents.iter().copied().collect(),
        }
    }

    // ── Signal queries ────────────────────────────────────────────────────

    /// Whether traffic arriving by `street` may cross this tick.
    ///
    /// For a traffic light: priority streets are green in the first
    /// half-cycle and the remaining streets in the second.  Unsignalized
    /// nodes are always passable.
    pub fn is_green_for(&self, street: StreetId) -> NetResult<bool> {
        match &self.kind {
            NodeKind::TrafficLight(t) => {
                let green = t.is_green()?;
                Ok(green == self.street_priorities.contains(&street))
            }
            _ => Ok(true),
        }
    }

    /// The traffic-light state, if this node is signalized.
    pub fn light(&self) -> Option<&TrafficLight> {
        match &self.kind {
            NodeKind::TrafficLight(t) => Some(t),
            _ => None,
        }
    }

    pub fn light_mut(&mut self) -> Option<&mut TrafficLight> {
        match &mut self.kind {
            NodeKind::TrafficLight(t) => Some(t),
            _ => None,
        }
    }

    // ── Kind conversions ──────────────────────────────────────────────────

    /// Re-tag this node as a traffic light, keeping the header and any
    /// occupants.  Converting a roundabout re-keys its ring FIFO.
    pub fn into_traffic_light(mut self) -> Node {
        let intersection = self.take_intersection();
        self.kind = NodeKind::TrafficLight(TrafficLight {
            intersection,
            ..TrafficLight::default()
        });
        self
    }

    /// Re-tag this node as a roundabout, keeping the header; intersection
    /// occupants enter the ring in their discharge order.
    pub fn into_roundabout(mut self) -> Node {
        let agents: VecDeque<AgentId> = self.discharge_order().into();
        self.kind = NodeKind::Roundabout(Roundabout { agents });
        self
    }

    fn take_intersection(&mut self) -> Intersection {
        let kind = std::mem::replace(&mut self.kind, NodeKind::Intersection(Intersection::default()));
        match kind {
            NodeKind::Intersection(i) => i,
            NodeKind::TrafficLight(t) => t.intersection,
            NodeKind::Roundabout(r) => Intersection {
                agents: r
                    .agents
                    .iter()
                    .enumerate()
                    .map(|(k, &a)| (k as i16, a))
                    .collect(),
            },
        }
    }
}
