//! The road graph: single owner of nodes, streets, and the adjacency table.
//!
//! # Id scheme
//!
//! After [`Graph::build_adj`] every street id is `src * n + dst`, where `n`
//! is one past the largest node id.  The same linearization keys the
//! adjacency matrix, so `adjacency(u, v)` is set exactly when the street
//! `u * n + v` exists.  Topology loaded through the importers already
//! satisfies the scheme; hand-assembled graphs acquire it on `build_adj`.
//!
//! # Shortest paths
//!
//! Routing tables are successor sets: for a destination `d`, the matrix
//! `P(u, v) = true` marks every edge `(u, v)` that begins some shortest path
//! from `u` to `d`.  Ties are all retained, which is what lets the engine
//! split traffic across equal-length alternatives.  The table is computed
//! with one Dijkstra pass over the reversed graph per destination.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, BTreeMap, BTreeSet};

use mts_core::{NodeId, StreetId};
use mts_matrix::SparseMatrix;

use crate::{NetError, NetResult, Node, Street};

/// Relative tolerance for shortest-path tie detection over `f64` lengths.
const TIE_EPS: f64 = 1e-9;

#[inline]
fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIE_EPS * a.abs().max(b.abs()).max(1.0)
}

// ── Graph ─────────────────────────────────────────────────────────────────────

/// A directed road network.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    streets: BTreeMap<StreetId, Street>,
    pub(crate) adjacency: SparseMatrix<bool>,
    /// External (OSM) node ids to dense internal ids.
    pub(crate) osm_mapping: BTreeMap<u64, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a boolean adjacency matrix: one intersection per
    /// index and one default street per set entry.
    pub fn from_adjacency(adjacency: SparseMatrix<bool>) -> NetResult<Self> {
        if adjacency.rows() != adjacency.cols() {
            return Err(NetError::InvalidInput(format!(
                "adjacency matrix must be square, got {}x{}",
                adjacency.rows(),
                adjacency.cols()
            )));
        }
        let n = adjacency.rows();
        let mut graph = Graph::new();
        for i in 0..n {
            graph.nodes.insert(NodeId(i), Node::intersection(NodeId(i)));
        }
        for (key, _) in adjacency.iter() {
            let (src, dst) = (NodeId(key / n), NodeId(key % n));
            graph
                .streets
                .insert(StreetId(key), Street::new(StreetId(key), (src, dst)));
        }
        graph.adjacency = adjacency;
        Ok(graph)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub fn streets(&self) -> &BTreeMap<StreetId, Street> {
        &self.streets
    }

    pub fn adjacency(&self) -> &SparseMatrix<bool> {
        &self.adjacency
    }

    pub fn node(&self, id: NodeId) -> NetResult<&Node> {
        self.nodes.get(&id).ok_or(NetError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> NetResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(NetError::NodeNotFound(id))
    }

    pub fn street(&self, id: StreetId) -> NetResult<&Street> {
        self.streets.get(&id).ok_or(NetError::StreetNotFound(id))
    }

    pub fn street_mut(&mut self, id: StreetId) -> NetResult<&mut Street> {
        self.streets.get_mut(&id).ok_or(NetError::StreetNotFound(id))
    }

    /// Key-ordered mutable iteration over nodes.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.nodes.values_mut()
    }

    /// Key-ordered mutable iteration over streets.
    pub fn streets_mut(&mut self) -> impl Iterator<Item = &mut Street> + '_ {
        self.streets.values_mut()
    }

    /// One past the largest node id (the `n` of the id scheme); 0 when the
    /// graph has no nodes.
    pub fn node_bound(&self) -> u32 {
        self.nodes.keys().next_back().map_or(0, |id| id.0 + 1)
    }

    /// The street from `src` to `dst`, if one exists.
    pub fn street_between(&self, src: NodeId, dst: NodeId) -> Option<&Street> {
        let n = self.node_bound();
        if n > 0 {
            let canonical = StreetId::between(src, dst, n);
            if let Some(street) = self.streets.get(&canonical) {
                if street.node_pair() == (src, dst) {
                    return Some(street);
                }
            }
        }
        // Pre-build_adj ids are caller-assigned; fall back to a scan.
        self.streets.values().find(|s| s.node_pair() == (src, dst))
    }

    // ── Construction ──────────────────────────────────────────────────────

    /// Insert a node, replacing any previous node with the same id.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id(), node);
    }

    /// Insert a street, creating plain intersections for any missing
    /// endpoint.  A street id collision is an error.
    pub fn add_street(&mut self, street: Street) -> NetResult<()> {
        if self.streets.contains_key(&street.id()) {
            return Err(NetError::InvalidInput(format!(
                "street with id {} already exists",
                street.id()
            )));
        }
        let (src, dst) = street.node_pair();
        self.nodes
            .entry(src)
            .or_insert_with(|| Node::intersection(src));
        self.nodes
            .entry(dst)
            .or_insert_with(|| Node::intersection(dst));
        self.streets.insert(street.id(), street);
        Ok(())
    }

    /// Build the adjacency matrix from the street set and canonicalize
    /// street ids to `src * n + dst`.
    ///
    /// Street priorities registered on nodes are remapped to the new ids.
    /// Streets whose endpoints both have coordinates get their angle set.
    pub fn build_adj(&mut self) -> NetResult<()> {
        let n = self.node_bound();
        if n > u16::MAX as u32 {
            return Err(NetError::InvalidInput(format!(
                "node bound {n} exceeds the addressable matrix side"
            )));
        }
        let mut adjacency = SparseMatrix::new(n, n);
        let mut renumbered: BTreeMap<StreetId, Street> = BTreeMap::new();
        let mut id_map: BTreeMap<StreetId, StreetId> = BTreeMap::new();

        for (old_id, mut street) in std::mem::take(&mut self.streets) {
            let (src, dst) = street.node_pair();
            let new_id = StreetId::between(src, dst, n);
            adjacency.insert(src.0, dst.0, true).map_err(|_| {
                NetError::InvalidInput(format!(
                    "two streets share the endpoints {src} -> {dst}"
                ))
            })?;
            street.set_id(new_id);
            renumbered.insert(new_id, street);
            id_map.insert(old_id, new_id);
        }

        self.streets = renumbered;
        self.adjacency = adjacency;

        for node in self.nodes.values_mut() {
            let remapped: BTreeSet<StreetId> = node
                .street_priorities()
                .iter()
                .filter_map(|old| id_map.get(old).copied())
                .collect();
            node.set_street_priorities(remapped);
        }

        self.set_street_angles();
        Ok(())
    }

    /// Set every street's angle from its endpoints' coordinates.  Returns
    /// the number of streets skipped because an endpoint has none.
    pub fn build_street_angles(&mut self) -> usize {
        self.set_street_angles()
    }

    fn set_street_angles(&mut self) -> usize {
        let mut skipped = 0;
        for street in self.streets.values_mut() {
            let (src, dst) = street.node_pair();
            let coords = (
                self.nodes.get(&src).and_then(Node::coords),
                self.nodes.get(&dst).and_then(Node::coords),
            );
            match coords {
                (Some(a), Some(b)) => street.set_angle_from_coords(a, b),
                _ => skipped += 1,
            }
        }
        skipped
    }

    // ── Kind conversions ──────────────────────────────────────────────────

    /// Convert an existing node into a traffic light.
    pub fn make_traffic_light(&mut self, id: NodeId) -> NetResult<()> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(NetError::NodeNotFound(id))?;
        self.nodes.insert(id, node.into_traffic_light());
        Ok(())
    }

    /// Convert an existing node into a roundabout.
    pub fn make_roundabout(&mut self, id: NodeId) -> NetResult<()> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(NetError::NodeNotFound(id))?;
        self.nodes.insert(id, node.into_roundabout());
        Ok(())
    }

    /// Attach spire counters to an existing street.
    pub fn make_spire_street(&mut self, id: StreetId) -> NetResult<()> {
        self.street_mut(id)?.make_spire();
        Ok(())
    }

    // ── Shortest paths ────────────────────────────────────────────────────

    /// Distance (sum of street lengths) from every node to `dst`, indexed by
    /// node id; `f64::INFINITY` where `dst` is unreachable.
    pub fn distances_to(&self, dst: NodeId) -> NetResult<Vec<f64>> {
        self.node(dst)?;
        let n = self.node_bound() as usize;

        // Inbound edge lists: for each node, the streets arriving at it.
        let mut inbound: Vec<Vec<(NodeId, f64)>> = vec![Vec::new(); n];
        for street in self.streets.values() {
            let (src, to) = street.node_pair();
            inbound[to.index()].push((src, street.length()));
        }

        let mut dist = vec![f64::INFINITY; n];
        dist[dst.index()] = 0.0;

        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
        heap.push(Reverse(HeapEntry { dist: 0.0, node: dst }));

        while let Some(Reverse(HeapEntry { dist: d, node })) = heap.pop() {
            // Skip stale heap entries.
            if d > dist[node.index()] {
                continue;
            }
            for &(prev, length) in &inbound[node.index()] {
                let candidate = d + length;
                if candidate < dist[prev.index()] {
                    dist[prev.index()] = candidate;
                    heap.push(Reverse(HeapEntry { dist: candidate, node: prev }));
                }
            }
        }
        Ok(dist)
    }

    /// The successor-set matrix toward `dst`: `(u, v)` is set exactly when
    /// the street `u -> v` starts a shortest path from `u` to `dst`.  Rows
    /// of unreachable nodes are empty.
    pub fn successor_matrix(&self, dst: NodeId) -> NetResult<SparseMatrix<bool>> {
        let dist = self.distances_to(dst)?;
        let n = self.node_bound();
        let mut path = SparseMatrix::new(n, n);
        for street in self.streets.values() {
            let (u, v) = street.node_pair();
            let (du, dv) = (dist[u.index()], dist[v.index()]);
            if du.is_finite() && dv.is_finite() && approx_eq(dv + street.length(), du) {
                path.insert_or_assign(u.0, v.0, true)?;
            }
        }
        Ok(path)
    }

    /// Shortest distance from `src` to `dst`; `None` when unreachable.
    pub fn shortest_distance(&self, src: NodeId, dst: NodeId) -> NetResult<Option<f64>> {
        self.node(src)?;
        let dist = self.distances_to(dst)?;
        let d = dist[src.index()];
        Ok(d.is_finite().then_some(d))
    }
}

// ── Dijkstra heap entry ───────────────────────────────────────────────────────

/// Heap key: distance first, node id second so ties pop deterministically.
/// Distances are finite sums of positive lengths, never NaN.
#[derive(Copy, Clone, PartialEq)]
struct HeapEntry {
    dist: f64,
    node: NodeId,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
