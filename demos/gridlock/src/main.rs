//! gridlock — smallest runnable demo of the rust_mts traffic engine.
//!
//! Streams commuter traffic across a 3 x 3 grid with a signalized crossing
//! and a roundabout, then prints flow statistics.  Swap in an imported OSM
//! network and a larger spawn rate to stress a real topology.

mod network;

use anyhow::Result;

use mts_core::{ItineraryId, NodeId};
use mts_dynamics::{Dynamics, Itinerary, SpawnConfig};

use network::build_network;

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED: u64 = 69;
const TICKS: u64 = 600;
const REPORT_EVERY: u64 = 120;
const SPAWN_PER_TICK: u32 = 2;
const ERROR_PROBABILITY: f64 = 0.05;
const MIN_SPEED_RATEO: f64 = 0.25;

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    println!("=== gridlock — rust_mts traffic demo ===");
    println!("Ticks: {TICKS}  |  Spawn: {SPAWN_PER_TICK}/tick  |  Seed: {SEED}");
    println!();

    // 1. Build the network.
    let (graph, spire) = build_network()?;
    println!(
        "Network: {} nodes, {} streets (spire on {})",
        graph.nodes().len(),
        graph.streets().len(),
        spire
    );

    // 2. Engine and demand model: commuters bound for opposite corners.
    let mut sim = Dynamics::new(graph, SEED);
    sim.set_error_probability(ERROR_PROBABILITY)?;
    sim.set_min_speed_rateo(MIN_SPEED_RATEO)?;
    sim.add_itinerary(Itinerary::new(ItineraryId(0), NodeId(8)));
    sim.add_itinerary(Itinerary::new(ItineraryId(1), NodeId(2)));
    sim.update_paths()?;
    sim.set_spawn(Some(SpawnConfig {
        sources: vec![NodeId(0), NodeId(6)],
        per_tick: SPAWN_PER_TICK,
        itineraries: vec![ItineraryId(0), ItineraryId(1)],
    }))?;

    // 3. Run, reporting periodically.
    println!();
    println!(
        "{:>6} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "tick", "agents", "arrivals", "speed", "density", "flow"
    );
    for _ in 0..(TICKS / REPORT_EVERY) {
        sim.run(REPORT_EVERY)?;
        println!(
            "{:>6} {:>8} {:>10} {:>10.2} {:>10.3} {:>10.3}",
            sim.time(),
            sim.agent_count(),
            sim.arrivals(),
            sim.mean_speed().mean,
            sim.mean_density().mean,
            sim.mean_flow().mean,
        );
    }

    // 4. Summary.
    let travel = sim.mean_travel_time(false);
    let turns = sim.turn_counts();
    println!();
    println!("Arrivals:        {}", sim.arrivals());
    println!(
        "Travel time:     {:.1} +/- {:.1} ticks",
        travel.mean, travel.std
    );
    println!(
        "Turns:           {} straight, {} left, {} right, {} U",
        turns.straight, turns.left, turns.right, turns.u_turn
    );
    println!(
        "Spire {spire}: {} in / {} out",
        sim.spire_input_counts(spire, false)?,
        sim.spire_output_counts(spire, false)?,
    );
    println!(
        "Light crossings: {}",
        sim.node_agent_counter(NodeId(4))?
    );

    Ok(())
}
