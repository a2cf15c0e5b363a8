//! The demo road network: a 3 x 3 grid with one signalized crossing, one
//! roundabout, and one instrumented street.
//!
//! Node layout (ids), roughly 200 m apart:
//!
//! ```text
//! 6 - 7 - 8
//! |   |   |
//! 3 - 4 - 5
//! |   |   |
//! 0 - 1 - 2
//! ```
//!
//! Node 4 is a traffic light favouring the west-east corridor; node 7 is a
//! roundabout.  The street 3 -> 4 carries spire counters.

use mts_core::{NodeId, StreetId};
use mts_net::{Graph, NetResult, Node, Street};

const GRID_SIDE: u32 = 3;
const BLOCK_LENGTH_M: f64 = 200.0;
const STREET_CAPACITY: u32 = 6;
const MAX_SPEED_MPS: f64 = 13.9;

/// Ticks of green and red at the signalized crossing.
const LIGHT_CYCLE: (u32, u32) = (8, 8);

/// Build the grid and return it with the id of the spire street.
pub fn build_network() -> NetResult<(Graph, StreetId)> {
    let mut g = Graph::new();

    // Nodes with synthetic coordinates: latitude grows northward, so the
    // street angles come out right for the turn statistics.
    for row in 0..GRID_SIDE {
        for col in 0..GRID_SIDE {
            let id = NodeId(row * GRID_SIDE + col);
            g.add_node(
                Node::intersection(id)
                    .with_coords(44.490 + 0.002 * f64::from(row), 11.340 + 0.002 * f64::from(col))
                    .with_capacity(2),
            );
        }
    }

    // Two-way streets between horizontal and vertical neighbours.
    let mut next_id = 0;
    for row in 0..GRID_SIDE {
        for col in 0..GRID_SIDE {
            let here = NodeId(row * GRID_SIDE + col);
            if col + 1 < GRID_SIDE {
                let east = NodeId(row * GRID_SIDE + col + 1);
                add_two_way(&mut g, &mut next_id, here, east)?;
            }
            if row + 1 < GRID_SIDE {
                let north = NodeId((row + 1) * GRID_SIDE + col);
                add_two_way(&mut g, &mut next_id, here, north)?;
            }
        }
    }

    g.build_adj()?;

    // Signalize the central crossing; the west-east corridor gets priority.
    g.make_traffic_light(NodeId(4))?;
    let west_in = g.street_between(NodeId(3), NodeId(4)).map(Street::id);
    let east_in = g.street_between(NodeId(5), NodeId(4)).map(Street::id);
    let light = g.node_mut(NodeId(4))?;
    for sid in [west_in, east_in].into_iter().flatten() {
        light.add_street_priority(sid);
    }
    light
        .light_mut()
        .expect("node 4 was signalized above")
        .set_delay(LIGHT_CYCLE.0, LIGHT_CYCLE.1);

    // A calmer ring on the northern corridor.
    g.make_roundabout(NodeId(7))?;
    g.node_mut(NodeId(7))?.set_capacity(3)?;

    // Instrument the westbound approach to the light.
    let spire = g
        .street_between(NodeId(3), NodeId(4))
        .map(Street::id)
        .expect("grid always contains 3 -> 4");
    g.make_spire_street(spire)?;

    Ok((g, spire))
}

fn add_two_way(g: &mut Graph, next_id: &mut u32, a: NodeId, b: NodeId) -> NetResult<()> {
    for (src, dst) in [(a, b), (b, a)] {
        let street = Street::new(StreetId(*next_id), (src, dst))
            .with_length(BLOCK_LENGTH_M)
            .with_max_speed(MAX_SPEED_MPS)
            .with_capacity(STREET_CAPACITY);
        g.add_street(street)?;
        *next_id += 1;
    }
    Ok(())
}
