//! The per-tick engine.
//!
//! # Phase order
//!
//! One call to [`Dynamics::evolve`] runs, in order:
//!
//! 1. signal counters advance;
//! 2. agents in street bodies move (delay down, distance up), reaching the
//!    head queue at zero;
//! 3. street heads hand agents to their destination nodes, subject to
//!    transport capacity, node capacity, signal phase, and inbound priority
//!    (priority streets first, then denser streets, then lower ids); an
//!    agent handed to its itinerary's destination leaves the simulation;
//! 4. nodes discharge onto the next street of each occupant's route
//!    (roundabouts strictly FIFO, intersections in priority-key order);
//! 5. configured sources spawn new agents;
//! 6. the clock advances.
//!
//! Each phase completes over the whole network before the next begins, and
//! all iteration is key-ordered, so a seeded run replays identically.
//!
//! # Turn selection
//!
//! The outbound street is drawn when an agent is admitted to a node: a
//! uniform pick among the routing table's successors, replaced with
//! probability `error_probability` by a uniform pick among all adjacent
//! streets.  The committed choice also keys the intersection's discharge
//! order by turn angle.  If the chosen street is still full at discharge
//! time the commitment is dropped and redrawn on a later tick, so a blocked
//! agent can fall back to an equal-length alternative.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_4, PI};

use mts_core::{AgentId, Delay, ItineraryId, NodeId, SimRng, Size, StreetId};
use mts_net::{Graph, NetError, Street};

use crate::{Agent, Itinerary, Measurement, SimError, SimResult};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Demand model: each tick, up to `per_tick` agents are inserted at sources
/// drawn uniformly from `sources`, each following an itinerary drawn
/// uniformly from `itineraries`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpawnConfig {
    pub sources: Vec<NodeId>,
    pub per_tick: Size,
    pub itineraries: Vec<ItineraryId>,
}

/// Tally of executed turns, classified by the angle between the inbound and
/// outbound streets: within 45 degrees is straight, beyond 135 a U-turn,
/// otherwise left or right by sign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TurnCounts {
    pub straight: u64,
    pub left: u64,
    pub right: u64,
    pub u_turn: u64,
}

impl TurnCounts {
    fn record(&mut self, delta: f64) {
        let mut d = delta;
        while d > PI {
            d -= 2.0 * PI;
        }
        while d <= -PI {
            d += 2.0 * PI;
        }
        let magnitude = d.abs();
        if magnitude < FRAC_PI_4 {
            self.straight += 1;
        } else if magnitude > 3.0 * FRAC_PI_4 {
            self.u_turn += 1;
        } else if d > 0.0 {
            self.left += 1;
        } else {
            self.right += 1;
        }
    }
}

// ── Dynamics ──────────────────────────────────────────────────────────────────

/// The simulation state: one graph, the live agents, the itinerary registry,
/// the clock, and the engine RNG.
pub struct Dynamics {
    graph: Graph,
    agents: BTreeMap<AgentId, Agent>,
    itineraries: BTreeMap<ItineraryId, Itinerary>,
    time: u64,
    rng: SimRng,
    /// Probability that a turn ignores the routing table and picks any
    /// adjacent street instead.
    error_probability: f64,
    /// Fraction of the speed limit still reachable at full density.
    min_speed_rateo: f64,
    /// Optional uniform perturbation of the speed limit at street entry.
    speed_fluctuation: Option<f64>,
    spawn: Option<SpawnConfig>,
    next_agent_id: u32,
    arrivals: u64,
    /// Lifetimes of agents arrived since the last windowed read.
    travel_times: Vec<f64>,
    turn_counts: TurnCounts,
    stopped: bool,
}

impl Dynamics {
    /// Take ownership of a graph and seed the engine RNG.
    pub fn new(graph: Graph, seed: u64) -> Self {
        Self {
            graph,
            agents: BTreeMap::new(),
            itineraries: BTreeMap::new(),
            time: 0,
            rng: SimRng::new(seed),
            error_probability: 0.0,
            min_speed_rateo: 0.0,
            speed_fluctuation: None,
            spawn: None,
            next_agent_id: 0,
            arrivals: 0,
            travel_times: Vec::new(),
            turn_counts: TurnCounts::default(),
            stopped: false,
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────

    /// Reseed the engine RNG.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = SimRng::new(seed);
    }

    pub fn set_error_probability(&mut self, p: f64) -> SimResult<()> {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::InvalidInput(format!(
                "error probability {p} outside [0, 1]"
            )));
        }
        self.error_probability = p;
        Ok(())
    }

    pub fn set_min_speed_rateo(&mut self, rateo: f64) -> SimResult<()> {
        if !(0.0..=1.0).contains(&rateo) {
            return Err(SimError::InvalidInput(format!(
                "minimum speed rateo {rateo} outside [0, 1]"
            )));
        }
        self.min_speed_rateo = rateo;
        Ok(())
    }

    /// Enable (or disable with `None`) per-entry speed-limit fluctuation: a
    /// uniform factor in `[1 - f, 1 + f]` applied at street entry.
    pub fn set_speed_fluctuation(&mut self, fluctuation: Option<f64>) -> SimResult<()> {
        if let Some(f) = fluctuation {
            if !(0.0..1.0).contains(&f) {
                return Err(SimError::InvalidInput(format!(
                    "speed fluctuation {f} outside [0, 1)"
                )));
            }
        }
        self.speed_fluctuation = fluctuation;
        Ok(())
    }

    /// Install the demand model; sources and itineraries must exist.
    pub fn set_spawn(&mut self, spawn: Option<SpawnConfig>) -> SimResult<()> {
        if let Some(cfg) = &spawn {
            for &src in &cfg.sources {
                self.graph.node(src).map_err(SimError::Net)?;
            }
            for &it in &cfg.itineraries {
                if !self.itineraries.contains_key(&it) {
                    return Err(SimError::ItineraryNotFound(it));
                }
            }
        }
        self.spawn = spawn;
        Ok(())
    }

    /// Register an itinerary, replacing any previous one with the same id.
    /// Call [`update_paths`](Self::update_paths) before dispatching agents.
    pub fn add_itinerary(&mut self, itinerary: Itinerary) {
        self.itineraries.insert(itinerary.id(), itinerary);
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn agents(&self) -> &BTreeMap<AgentId, Agent> {
        &self.agents
    }

    pub fn itineraries(&self) -> &BTreeMap<ItineraryId, Itinerary> {
        &self.itineraries
    }

    /// Ticks elapsed since construction.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Agents that have reached their destination since construction.
    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    pub fn turn_counts(&self) -> TurnCounts {
        self.turn_counts
    }

    /// Ask the run loop to halt at the next tick boundary.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    // ── Routing ───────────────────────────────────────────────────────────

    /// Rebuild every itinerary's routing table from the current topology.
    pub fn update_paths(&mut self) -> SimResult<()> {
        let graph = &self.graph;
        for itinerary in self.itineraries.values_mut() {
            let path = graph.successor_matrix(itinerary.destination())?;
            itinerary.set_path(path)?;
        }
        Ok(())
    }

    /// Draw the outbound street for an agent of `itinerary` standing at
    /// `at`: uniform over the routing table's successors, or (with
    /// probability `error_probability`) uniform over all adjacent streets.
    /// `None` when no candidate exists; the caller parks the agent.
    fn select_next(&mut self, itinerary: ItineraryId, at: NodeId) -> SimResult<Option<StreetId>> {
        let n = self.graph.node_bound();
        let wander = self.rng.gen_bool(self.error_probability);
        let candidates: Vec<StreetId> = if wander {
            self.graph
                .adjacency()
                .row_entries(at.0)
                .map(|(v, _)| StreetId::between(at, NodeId(v), n))
                .collect()
        } else {
            let it = self
                .itineraries
                .get(&itinerary)
                .ok_or(SimError::ItineraryNotFound(itinerary))?;
            match it.path() {
                Some(path) => path
                    .row_entries(at.0)
                    .map(|(v, _)| StreetId::between(at, NodeId(v), n))
                    .collect(),
                None => Vec::new(),
            }
        };
        if candidates.is_empty() {
            return Ok(None);
        }
        let pick = self.rng.gen_range(0..candidates.len());
        Ok(Some(candidates[pick]))
    }

    /// Entry speed and traverse delay for a street at its current density.
    ///
    /// The entry speed is the speed limit scaled linearly down with density,
    /// floored at `min_speed_rateo` of the limit.  With fluctuation enabled
    /// the limit itself is perturbed first.
    fn street_entry(&mut self, street_id: StreetId) -> SimResult<(f64, Delay)> {
        let street = self.graph.street(street_id)?;
        let limit = street.max_speed();
        let density = street.density();
        let length = street.length();

        let base = match self.speed_fluctuation {
            Some(f) if f > 0.0 => limit * (1.0 + self.rng.gen_range(-f..=f)),
            _ => limit,
        };
        let floor = self.min_speed_rateo * limit;
        let ceiling = base.max(floor);
        let speed = (base * (1.0 - (1.0 - self.min_speed_rateo) * density)).clamp(floor, ceiling);
        let delay = (length / speed).ceil() as Delay;
        Ok((speed, delay))
    }

    // ── Insertion ─────────────────────────────────────────────────────────

    /// Insert one agent bound for `itinerary` at `src`.
    ///
    /// The agent departs immediately when a route street has room;
    /// otherwise it is parked at the source node (and fails with the node's
    /// capacity error when even that is full).
    pub fn insert_agent(&mut self, itinerary: ItineraryId, src: NodeId) -> SimResult<AgentId> {
        if !self.itineraries.contains_key(&itinerary) {
            return Err(SimError::ItineraryNotFound(itinerary));
        }
        self.graph.node(src)?;

        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        let mut agent = Agent::new(id, itinerary, src);

        let departure = match self.select_next(itinerary, src)? {
            Some(street_id) => (!self.graph.street(street_id)?.is_full()).then_some(street_id),
            None => None,
        };
        match departure {
            Some(street_id) => {
                let (speed, delay) = self.street_entry(street_id)?;
                self.graph.street_mut(street_id)?.enter()?;
                agent.enter_street(street_id, speed, delay);
            }
            None => {
                self.graph.node_mut(src)?.add_agent(id)?;
            }
        }
        self.agents.insert(id, agent);
        Ok(id)
    }

    /// Insert `count` agents bound for `itinerary` at `src`.
    pub fn insert_agents(
        &mut self,
        count: Size,
        itinerary: ItineraryId,
        src: NodeId,
    ) -> SimResult<Vec<AgentId>> {
        (0..count).map(|_| self.insert_agent(itinerary, src)).collect()
    }

    // ── The tick ──────────────────────────────────────────────────────────

    /// Advance the simulation by one tick.
    ///
    /// A failed invariant aborts the tick with the partial state intact.
    pub fn evolve(&mut self) -> SimResult<()> {
        self.update_traffic_lights()?;
        self.move_agents()?;
        self.evolve_street_heads()?;
        self.evolve_nodes()?;
        self.spawn_agents()?;
        self.time += 1;
        Ok(())
    }

    /// Run up to `ticks` ticks, halting early if [`stop`](Self::stop) was
    /// requested.  Returns the number of ticks executed.
    pub fn run(&mut self, ticks: u64) -> SimResult<u64> {
        self.stopped = false;
        let mut executed = 0;
        for _ in 0..ticks {
            if self.stopped {
                break;
            }
            self.evolve()?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Phase 1: advance every signal counter.
    fn update_traffic_lights(&mut self) -> SimResult<()> {
        for node in self.graph.nodes_mut() {
            if let Some(light) = node.light_mut() {
                light.increase_counter()?;
            }
        }
        Ok(())
    }

    /// Phase 2: every live agent ages one tick; agents in a street body
    /// advance and join the head queue when their delay runs out.
    fn move_agents(&mut self) -> SimResult<()> {
        let promotions = self.advance_in_transit();
        for (agent_id, street_id) in promotions {
            self.graph.street_mut(street_id)?.enqueue(agent_id)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn advance_in_transit(&mut self) -> Vec<(AgentId, StreetId)> {
        self.agents
            .values_mut()
            .filter_map(advance_one_agent)
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn advance_in_transit(&mut self) -> Vec<(AgentId, StreetId)> {
        use rayon::prelude::*;

        // Each agent's update touches only that agent; ordered collect keeps
        // the promotion list identical to the sequential path.
        let mut refs: Vec<&mut Agent> = self.agents.values_mut().collect();
        refs.par_iter_mut()
            .filter_map(|agent| advance_one_agent(&mut **agent))
            .collect()
    }

    /// Phase 3: transfer agents from street heads into their destination
    /// nodes, or out of the simulation on arrival.
    fn evolve_street_heads(&mut self) -> SimResult<()> {
        // Streets with waiting agents, grouped by destination node.
        let mut inbound: BTreeMap<NodeId, Vec<StreetId>> = BTreeMap::new();
        for (&street_id, street) in self.graph.streets() {
            if !street.queue().is_empty() {
                inbound.entry(street.destination()).or_default().push(street_id);
            }
        }

        for (node_id, streets) in inbound {
            let ranked = self.rank_inbound(node_id, streets)?;
            'node: for street_id in ranked {
                let transport_capacity = self.graph.street(street_id)?.transport_capacity();
                let mut moved: Size = 0;
                while moved < transport_capacity {
                    let Some(agent_id) = self.graph.street(street_id)?.front() else {
                        break;
                    };
                    let itinerary_id = self
                        .agents
                        .get(&agent_id)
                        .ok_or(SimError::AgentNotFound(agent_id))?
                        .itinerary();
                    let destination = self
                        .itineraries
                        .get(&itinerary_id)
                        .ok_or(SimError::ItineraryNotFound(itinerary_id))?
                        .destination();

                    // Arrival: the node ahead is the itinerary destination.
                    if node_id == destination {
                        self.graph.street_mut(street_id)?.dequeue();
                        let agent = self
                            .agents
                            .remove(&agent_id)
                            .ok_or(SimError::AgentNotFound(agent_id))?;
                        self.arrivals += 1;
                        self.travel_times.push(agent.time() as f64);
                        moved += 1;
                        continue;
                    }

                    if self.graph.node(node_id)?.is_full() {
                        // No admission to this node for any inbound street.
                        break 'node;
                    }
                    if !self.graph.node(node_id)?.is_green_for(street_id)? {
                        break;
                    }

                    // Commit the turn and derive the intersection key from
                    // the angle between the inbound and outbound streets.
                    let choice = self.select_next(itinerary_id, node_id)?;
                    let in_angle = self.graph.street(street_id)?.angle();
                    let key_angle = match choice {
                        Some(next_id) => {
                            let out_angle = self.graph.street(next_id)?.angle();
                            self.turn_counts.record(out_angle - in_angle);
                            Some(in_angle - out_angle)
                        }
                        None => None,
                    };

                    self.graph.street_mut(street_id)?.dequeue();
                    let node = self.graph.node_mut(node_id)?;
                    match key_angle {
                        Some(angle) => node.add_agent_with_angle(angle, agent_id)?,
                        None => node.add_agent(agent_id)?,
                    }
                    self.agents
                        .get_mut(&agent_id)
                        .ok_or(SimError::AgentNotFound(agent_id))?
                        .enter_node(choice);
                    moved += 1;
                }
            }
        }
        Ok(())
    }

    /// Admission order for the inbound streets of one node: priority
    /// streets first, then descending density, then ascending street id.
    fn rank_inbound(
        &self,
        node_id: NodeId,
        streets: Vec<StreetId>,
    ) -> SimResult<Vec<StreetId>> {
        let priorities = self.graph.node(node_id)?.street_priorities();
        let mut ranked: Vec<(StreetId, bool, f64)> = Vec::with_capacity(streets.len());
        for street_id in streets {
            let density = self.graph.street(street_id)?.density();
            ranked.push((street_id, priorities.contains(&street_id), density));
        }
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(ranked.into_iter().map(|(id, _, _)| id).collect())
    }

    /// Phase 4: discharge node occupants onto their committed (or redrawn)
    /// next streets.
    fn evolve_nodes(&mut self) -> SimResult<()> {
        let node_ids: Vec<NodeId> = self.graph.nodes().keys().copied().collect();
        for node_id in node_ids {
            let node = self.graph.node(node_id)?;
            if node.occupancy() == 0 {
                continue;
            }
            let fifo = node.is_roundabout();
            for agent_id in node.discharge_order() {
                let discharged = self.try_discharge(node_id, agent_id)?;
                if !discharged && fifo {
                    // Head-of-line blocking: nobody overtakes in the ring.
                    break;
                }
            }
        }
        Ok(())
    }

    /// Try to move one node occupant onto its next street.  `false` means
    /// the agent stays parked this tick (blocked or routeless).
    fn try_discharge(&mut self, node_id: NodeId, agent_id: AgentId) -> SimResult<bool> {
        let agent = self
            .agents
            .get(&agent_id)
            .ok_or(SimError::AgentNotFound(agent_id))?;
        let itinerary_id = agent.itinerary();

        let choice = match agent.next_street() {
            Some(street_id) => Some(street_id),
            None => self.select_next(itinerary_id, node_id)?,
        };
        let Some(next_id) = choice else {
            return Ok(false);
        };
        if self.graph.street(next_id)?.is_full() {
            // Drop the commitment so a later tick can redraw.
            self.agents
                .get_mut(&agent_id)
                .ok_or(SimError::AgentNotFound(agent_id))?
                .clear_next_street();
            return Ok(false);
        }

        let (speed, delay) = self.street_entry(next_id)?;
        self.graph.node_mut(node_id)?.remove_agent(agent_id)?;
        self.graph.street_mut(next_id)?.enter()?;
        self.agents
            .get_mut(&agent_id)
            .ok_or(SimError::AgentNotFound(agent_id))?
            .enter_street(next_id, speed, delay);
        Ok(true)
    }

    /// Phase 5: inject demand.  Full sources are skipped, never an error.
    fn spawn_agents(&mut self) -> SimResult<()> {
        let Some(cfg) = self.spawn.clone() else {
            return Ok(());
        };
        if cfg.sources.is_empty() || cfg.itineraries.is_empty() {
            return Ok(());
        }
        for _ in 0..cfg.per_tick {
            let src = cfg.sources[self.rng.gen_range(0..cfg.sources.len())];
            let itinerary = cfg.itineraries[self.rng.gen_range(0..cfg.itineraries.len())];
            match self.insert_agent(itinerary, src) {
                Ok(_) => {}
                Err(SimError::Net(NetError::NodeFull(_) | NetError::StreetFull(_))) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ── Measurements ──────────────────────────────────────────────────────

    /// Mean entry speed across streets at their current densities.
    pub fn mean_speed(&self) -> Measurement {
        let samples: Vec<f64> = self
            .graph
            .streets()
            .values()
            .map(|s| self.current_speed(s))
            .collect();
        Measurement::from_samples(&samples)
    }

    /// Mean head-queue density across streets.
    pub fn mean_density(&self) -> Measurement {
        let samples: Vec<f64> = self.graph.streets().values().map(Street::density).collect();
        Measurement::from_samples(&samples)
    }

    /// Mean flow (density times entry speed) across streets.
    pub fn mean_flow(&self) -> Measurement {
        let samples: Vec<f64> = self
            .graph
            .streets()
            .values()
            .map(|s| s.density() * self.current_speed(s))
            .collect();
        Measurement::from_samples(&samples)
    }

    /// Mean lifetime of agents arrived since the last windowed read; with
    /// `reset` the window is cleared.
    pub fn mean_travel_time(&mut self, reset: bool) -> Measurement {
        let measurement = Measurement::from_samples(&self.travel_times);
        if reset {
            self.travel_times.clear();
        }
        measurement
    }

    /// Admissions through a node since the last read; resets the tally.
    pub fn node_agent_counter(&mut self, node_id: NodeId) -> SimResult<Size> {
        Ok(self.graph.node_mut(node_id)?.take_agent_counter())
    }

    /// Cumulative inbound count of a spire street.
    pub fn spire_input_counts(&mut self, street_id: StreetId, reset: bool) -> SimResult<Size> {
        Ok(self.graph.street_mut(street_id)?.input_counts(reset))
    }

    /// Cumulative outbound count of a spire street.
    pub fn spire_output_counts(&mut self, street_id: StreetId, reset: bool) -> SimResult<Size> {
        Ok(self.graph.street_mut(street_id)?.output_counts(reset))
    }

    /// The deterministic entry-speed value of a street right now, without
    /// fluctuation.
    fn current_speed(&self, street: &Street) -> f64 {
        let limit = street.max_speed();
        let floor = self.min_speed_rateo * limit;
        (limit * (1.0 - (1.0 - self.min_speed_rateo) * street.density())).clamp(floor, limit)
    }
}

/// Advance one agent by one tick; the return value asks the caller to move
/// it into its street's head queue.
fn advance_one_agent(agent: &mut Agent) -> Option<(AgentId, StreetId)> {
    agent.add_time();
    let street_id = agent.street()?;
    if agent.delay() == 0 {
        return None;
    }
    agent.decrement_delay();
    let speed = agent.speed();
    agent.add_distance(speed);
    (agent.delay() == 0).then_some((agent.id(), street_id))
}
