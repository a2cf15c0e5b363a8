//! Topology I/O: the plain-text matrix format, a coordinates file, and the
//! OSM node/edge CSV exports.
//!
//! # Matrix format
//!
//! ```text
//! N Type
//! w00 w01 ... w0(N-1)
//! ...
//! w(N-1)0 ... w(N-1)(N-1)
//! ```
//!
//! `Type` is `i`, `u`, or `f` (signed, unsigned, float weights).  Exactly
//! `N * N` whitespace-separated tokens follow the header, row-major.  A zero
//! token means "no edge"; a non-zero token is the street length (or just an
//! edge marker when the file is flagged as adjacency-only).
//!
//! # Strictness
//!
//! Importers parse the whole input into a staging buffer and only then touch
//! the receiving graph, so a malformed file aborts the load without partial
//! mutation.  Every importer has a `_reader` twin for in-memory sources
//! (tests feed `std::io::Cursor`).

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use serde::Deserialize;

use mts_core::{NodeId, StreetId};
use mts_matrix::SparseMatrix;

use crate::{Graph, NetError, NetResult, Node, Street};

/// Speed limit assumed for OSM edges whose `maxspeed` column does not parse.
const OSM_FALLBACK_MAX_SPEED: f64 = 30.0;

// ── CSV records ───────────────────────────────────────────────────────────────

/// Row of the OSM nodes export.  The `highway` column is present in the
/// format but irrelevant to topology, so it is not deserialized.
#[derive(Deserialize)]
struct OsmNodeRecord {
    id: u64,
    lat: f64,
    lon: f64,
}

/// Row of the OSM edges export.  `highway` and `name` are skipped.
#[derive(Deserialize)]
struct OsmEdgeRecord {
    u: u64,
    v: u64,
    length: f64,
    oneway: String,
    maxspeed: String,
}

impl Graph {
    // ── Matrix import ─────────────────────────────────────────────────────

    /// Load topology from a matrix file.  With `is_adj` every non-zero
    /// entry is an edge of length 1; otherwise the entry is the street
    /// length in metres.
    pub fn import_matrix(&mut self, path: &Path, is_adj: bool) -> NetResult<()> {
        let file = std::fs::File::open(path)?;
        self.import_matrix_reader(BufReader::new(file), is_adj)
    }

    /// Like [`import_matrix`](Self::import_matrix) for any buffered reader.
    pub fn import_matrix_reader<R: BufRead>(&mut self, mut reader: R, is_adj: bool) -> NetResult<()> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let mut lines = content.lines();
        let header = lines
            .next()
            .ok_or_else(|| NetError::Parse("empty matrix file".into()))?;
        let mut fields = header.split_whitespace();
        let n: u32 = fields
            .next()
            .ok_or_else(|| NetError::Parse("missing matrix side length".into()))?
            .parse()
            .map_err(|_| NetError::Parse(format!("invalid matrix side length in {header:?}")))?;
        let ty = fields
            .next()
            .ok_or_else(|| NetError::Parse("missing matrix element type".into()))?;
        if fields.next().is_some() {
            return Err(NetError::Parse(format!("trailing tokens in header {header:?}")));
        }
        if !matches!(ty, "i" | "u" | "f") {
            return Err(NetError::Parse(format!(
                "unknown matrix element type {ty:?}, expected i, u, or f"
            )));
        }
        if n > u16::MAX as u32 {
            return Err(NetError::InvalidInput(format!(
                "matrix side {n} exceeds the addressable limit"
            )));
        }

        // Stage all entries before mutating the graph.
        let mut entries: Vec<(u32, f64)> = Vec::new();
        let mut index: u32 = 0;
        let expected = n * n;
        for token in lines.flat_map(str::split_whitespace) {
            if index >= expected {
                return Err(NetError::Parse(format!(
                    "expected {expected} matrix elements, found more"
                )));
            }
            let value = parse_weight(token, ty)?;
            if value > 0.0 {
                entries.push((index, value));
            }
            index += 1;
        }
        if index != expected {
            return Err(NetError::Parse(format!(
                "expected {expected} matrix elements, found {index}"
            )));
        }

        let mut adjacency = SparseMatrix::new(n, n);
        for i in 0..n {
            self.add_node(Node::intersection(NodeId(i)));
        }
        for (key, value) in entries {
            adjacency.insert_linear(key, true)?;
            let (src, dst) = (NodeId(key / n), NodeId(key % n));
            let mut street = Street::new(StreetId(key), (src, dst));
            if !is_adj {
                street.set_length(value)?;
            }
            self.add_street(street)?;
        }
        self.set_adjacency(adjacency);
        Ok(())
    }

    // ── Matrix export ─────────────────────────────────────────────────────

    /// Write the adjacency (`is_adj`) or weight matrix in the import format.
    pub fn export_matrix(&self, path: &Path, is_adj: bool) -> NetResult<()> {
        let file = std::fs::File::create(path)?;
        self.export_matrix_writer(std::io::BufWriter::new(file), is_adj)
    }

    /// Like [`export_matrix`](Self::export_matrix) for any writer.
    pub fn export_matrix_writer<W: Write>(&self, mut writer: W, is_adj: bool) -> NetResult<()> {
        let n = self.adjacency().rows();
        writeln!(writer, "{n} {}", if is_adj { "i" } else { "f" })?;
        for i in 0..n {
            let mut row = String::new();
            for j in 0..n {
                if j > 0 {
                    row.push(' ');
                }
                let edge = *self.adjacency().get(i, j)?;
                if is_adj {
                    row.push(if edge { '1' } else { '0' });
                } else {
                    let length = if edge {
                        self.street_between(NodeId(i), NodeId(j))
                            .map_or(0.0, Street::length)
                    } else {
                        0.0
                    };
                    row.push_str(&format!("{length}"));
                }
            }
            writeln!(writer, "{row}")?;
        }
        Ok(())
    }

    // ── Coordinates ───────────────────────────────────────────────────────

    /// Load per-node coordinates: line `i` holds `lat lon` for node `i`.
    /// The file must cover every node id present in the graph.
    pub fn import_coordinates(&mut self, path: &Path) -> NetResult<()> {
        let file = std::fs::File::open(path)?;
        self.import_coordinates_reader(BufReader::new(file))
    }

    /// Like [`import_coordinates`](Self::import_coordinates) for any
    /// buffered reader.
    pub fn import_coordinates_reader<R: BufRead>(&mut self, reader: R) -> NetResult<()> {
        let mut coords: Vec<(f64, f64)> = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let lat = parse_f64(fields.next(), line_no, "lat")?;
            let lon = parse_f64(fields.next(), line_no, "lon")?;
            if fields.next().is_some() {
                return Err(NetError::Parse(format!(
                    "line {line_no}: trailing tokens after lat lon"
                )));
            }
            coords.push((lat, lon));
        }
        let bound = self.node_bound() as usize;
        if coords.len() < bound {
            return Err(NetError::InvalidInput(format!(
                "coordinates file holds {} entries but node ids reach {bound}",
                coords.len()
            )));
        }
        for node in self.nodes_mut() {
            let (lat, lon) = coords[node.id().index()];
            node.set_coords(lat, lon);
        }
        Ok(())
    }

    // ── OSM CSV ───────────────────────────────────────────────────────────

    /// Load nodes from an OSM CSV export (`id,lat,lon,highway`, header
    /// present).  OSM ids are remapped to dense internal ids in file order.
    pub fn import_osm_nodes(&mut self, path: &Path) -> NetResult<()> {
        let file = std::fs::File::open(path)?;
        self.import_osm_nodes_reader(file)
    }

    /// Like [`import_osm_nodes`](Self::import_osm_nodes) for any reader.
    pub fn import_osm_nodes_reader<R: Read>(&mut self, reader: R) -> NetResult<()> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut staged: Vec<OsmNodeRecord> = Vec::new();
        for row in csv_reader.deserialize::<OsmNodeRecord>() {
            staged.push(row.map_err(|e| NetError::Parse(e.to_string()))?);
        }

        let mut mapping: BTreeMap<u64, NodeId> = BTreeMap::new();
        let base = self.node_bound();
        for (offset, record) in staged.iter().enumerate() {
            let id = NodeId(base + offset as u32);
            if mapping.insert(record.id, id).is_some() {
                return Err(NetError::InvalidInput(format!(
                    "duplicate OSM node id {}",
                    record.id
                )));
            }
        }
        for record in staged {
            let id = mapping[&record.id];
            self.add_node(Node::intersection(id).with_coords(record.lat, record.lon));
        }
        self.osm_mapping.extend(mapping);
        Ok(())
    }

    /// Load edges from an OSM CSV export
    /// (`u,v,length,oneway,highway,maxspeed,name`, header present).  A
    /// `oneway=false` row yields both directed streets.  A `maxspeed` that
    /// does not parse falls back to 30.
    pub fn import_osm_edges(&mut self, path: &Path) -> NetResult<()> {
        let file = std::fs::File::open(path)?;
        self.import_osm_edges_reader(file)
    }

    /// Like [`import_osm_edges`](Self::import_osm_edges) for any reader.
    pub fn import_osm_edges_reader<R: Read>(&mut self, reader: R) -> NetResult<()> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut staged: Vec<(NodeId, NodeId, f64, f64, bool)> = Vec::new();
        for row in csv_reader.deserialize::<OsmEdgeRecord>() {
            let record = row.map_err(|e| NetError::Parse(e.to_string()))?;
            let src = self.resolve_osm(record.u)?;
            let dst = self.resolve_osm(record.v)?;
            if record.length <= 0.0 {
                return Err(NetError::InvalidInput(format!(
                    "edge {} -> {} has non-positive length {}",
                    record.u, record.v, record.length
                )));
            }
            let max_speed = record
                .maxspeed
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| *v > 0.0)
                .unwrap_or(OSM_FALLBACK_MAX_SPEED);
            let oneway = parse_oneway(&record.oneway)?;
            staged.push((src, dst, record.length, max_speed, oneway));
        }

        let n = self.node_bound();
        for (src, dst, length, max_speed, oneway) in staged {
            self.add_osm_street(src, dst, length, max_speed, n)?;
            if !oneway {
                self.add_osm_street(dst, src, length, max_speed, n)?;
            }
        }
        Ok(())
    }

    fn resolve_osm(&self, osm_id: u64) -> NetResult<NodeId> {
        self.osm_mapping.get(&osm_id).copied().ok_or_else(|| {
            NetError::InvalidInput(format!("edge references unknown OSM node id {osm_id}"))
        })
    }

    fn add_osm_street(
        &mut self,
        src: NodeId,
        dst: NodeId,
        length: f64,
        max_speed: f64,
        n: u32,
    ) -> NetResult<()> {
        let mut street = Street::new(StreetId::between(src, dst, n), (src, dst));
        street.set_length(length)?;
        street.set_max_speed(max_speed)?;
        self.add_street(street)
    }

    pub(crate) fn set_adjacency(&mut self, adjacency: SparseMatrix<bool>) {
        self.adjacency = adjacency;
    }
}

// ── Token helpers ─────────────────────────────────────────────────────────────

fn parse_weight(token: &str, ty: &str) -> NetResult<f64> {
    let value = match ty {
        "i" => token.parse::<i64>().ok().map(|v| v as f64),
        "u" => token.parse::<u64>().ok().map(|v| v as f64),
        _ => token.parse::<f64>().ok(),
    }
    .ok_or_else(|| NetError::Parse(format!("invalid matrix element {token:?}")))?;
    if value < 0.0 {
        return Err(NetError::InvalidInput(format!(
            "matrix elements must be non-negative, got {value}"
        )));
    }
    Ok(value)
}

fn parse_f64(token: Option<&str>, line_no: usize, what: &str) -> NetResult<f64> {
    token
        .ok_or_else(|| NetError::Parse(format!("line {line_no}: missing {what}")))?
        .parse()
        .map_err(|_| NetError::Parse(format!("line {line_no}: invalid {what}")))
}

fn parse_oneway(token: &str) -> NetResult<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(NetError::Parse(format!("invalid oneway flag {other:?}"))),
    }
}
