use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::algorithms::dijkstra::AllPaths;
use crate::error::{ForwardError, RoutingError};
use crate::topology::Network;
use crate::{NodeId, NodeName, Port};

/// Per-source routing document: address metadata plus destination -> path.
/// Matches the persisted routing-table schema exchanged with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTable {
    pub ip: IpAddr,
    pub port: Port,
    pub node_id: NodeId,
    pub routing_table: BTreeMap<NodeName, Vec<NodeName>>,
}

/// The full routing-table set, keyed by source node name. Rebuilt wholesale
/// on every topology change and swapped in as one unit.
pub type TableSet = BTreeMap<NodeName, NodeTable>;

/// Flattened per-node table: destination name -> ordered hop-port sequence.
/// This is the form routers consume; a router locates its own position in a
/// path by port membership.
pub type FlatTable = BTreeMap<NodeName, Vec<Port>>;

/// Opaque controller-defined payload broadcast alongside every table reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub message: String,
}

/// Attaches each source's address metadata to the path-engine output.
/// Sources without a registered address cannot be served a table and are
/// skipped.
pub fn build_tables(network: &Network, paths: &AllPaths) -> TableSet {
    let mut tables = TableSet::new();
    for (source, destinations) in paths {
        let Some(node) = network.node_by_name(source) else {
            continue;
        };
        let Some(address) = node.address else {
            continue;
        };
        tables.insert(
            source.clone(),
            NodeTable {
                ip: address.ip,
                port: address.port,
                node_id: node.id,
                routing_table: destinations.clone(),
            },
        );
    }
    tables
}

/// Flattens one source's paths into hop-port sequences using the ports
/// registered in the table set. A hop with no registered port is a
/// configuration error, not something to skip silently.
pub fn flatten(source: &str, tables: &TableSet) -> Result<FlatTable, RoutingError> {
    let node_table = tables
        .get(source)
        .ok_or_else(|| RoutingError::MissingAddress(source.to_string()))?;

    let mut flat = FlatTable::new();
    for (dest, path) in &node_table.routing_table {
        let mut ports = Vec::with_capacity(path.len());
        for hop in path {
            let port = tables
                .get(hop)
                .map(|t| t.port)
                .ok_or_else(|| RoutingError::MissingAddress(hop.clone()))?;
            ports.push(port);
        }
        flat.insert(dest.clone(), ports);
    }
    Ok(flat)
}

/// Outcome of a next-hop lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopDecision {
    /// Relay the message to this port.
    Forward(Port),
    /// This node is the destination; hand the message to the attached host.
    Deliver,
}

/// Resolves what an agent at `own_port` should do with a message destined
/// for `dest_port`.
///
/// The matched entry is the one whose hop sequence ends in `dest_port`; if
/// none does, the destination is unreachable. An agent whose own port is
/// missing from the matched path holds a stale table, which is also treated
/// as no route.
pub fn next_hop(
    table: &FlatTable,
    own_port: Port,
    dest_port: Port,
) -> Result<HopDecision, ForwardError> {
    let path = table
        .values()
        .find(|path| path.last() == Some(&dest_port))
        .ok_or(ForwardError::NoRoute(dest_port))?;

    if own_port == dest_port {
        return Ok(HopDecision::Deliver);
    }
    match path.iter().position(|&p| p == own_port) {
        Some(pos) if pos + 1 < path.len() => Ok(HopDecision::Forward(path[pos + 1])),
        Some(_) => Ok(HopDecision::Deliver),
        None => Err(ForwardError::NoRoute(dest_port)),
    }
}
