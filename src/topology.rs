use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::{NodeId, NodeName, Port, Weight};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Router,
    Host,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Router
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub ip: IpAddr,
    pub port: Port,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: NodeName,
    pub address: Option<NodeAddress>,
    pub kind: NodeKind,
}

/// Directed weighted edge between two stored nodes. Symmetric topologies
/// declare both directions explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRecord {
    pub source: NodeId,
    pub dest: NodeId,
    pub weight: Weight,
}

/// In-memory topology store: nodes and weighted links.
///
/// The store does no locking of its own; the controller serializes every
/// mutation through its own critical section.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: HashMap<NodeId, NodeRecord>,
    links: Vec<LinkRecord>,
    version: u64,
}

/// Immutable adjacency view handed to the path engine, decoupling the
/// computation from concurrent edits. Neighbor lists are sorted by name so
/// equal topologies always produce equal path sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub adjacency: BTreeMap<NodeName, Vec<(NodeName, Weight)>>,
    pub version: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        id: NodeId,
        name: &str,
        address: Option<NodeAddress>,
        kind: NodeKind,
    ) -> Result<(), TopologyError> {
        if self.nodes.contains_key(&id) {
            return Err(TopologyError::DuplicateNode(id));
        }
        if self.nodes.values().any(|n| n.name == name) {
            return Err(TopologyError::DuplicateName(name.to_string()));
        }
        self.nodes.insert(
            id,
            NodeRecord {
                id,
                name: name.to_string(),
                address,
                kind,
            },
        );
        self.version += 1;
        Ok(())
    }

    pub fn add_link(
        &mut self,
        source: NodeId,
        dest: NodeId,
        weight: Weight,
    ) -> Result<(), TopologyError> {
        if weight == 0 {
            return Err(TopologyError::InvalidWeight(weight));
        }
        if !self.nodes.contains_key(&source) {
            return Err(TopologyError::UnknownNode(source));
        }
        if !self.nodes.contains_key(&dest) {
            return Err(TopologyError::UnknownNode(dest));
        }
        self.links.push(LinkRecord {
            source,
            dest,
            weight,
        });
        self.version += 1;
        Ok(())
    }

    /// Removes the node and every link referencing it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<NodeRecord, TopologyError> {
        let record = self
            .nodes
            .remove(&id)
            .ok_or(TopologyError::UnknownNode(id))?;
        self.links
            .retain(|link| link.source != id && link.dest != id);
        self.version += 1;
        Ok(record)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.values().find(|n| n.name == name)
    }

    pub fn node_by_address(&self, ip: IpAddr, port: Port) -> Option<&NodeRecord> {
        self.nodes
            .values()
            .find(|n| n.address == Some(NodeAddress { ip, port }))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let mut adjacency: BTreeMap<NodeName, Vec<(NodeName, Weight)>> = self
            .nodes
            .values()
            .map(|n| (n.name.clone(), Vec::new()))
            .collect();

        for link in &self.links {
            // Both endpoints are guaranteed present by add_link/remove_node.
            let (Some(src), Some(dst)) = (self.nodes.get(&link.source), self.nodes.get(&link.dest))
            else {
                continue;
            };
            if let Some(neighbors) = adjacency.get_mut(&src.name) {
                neighbors.push((dst.name.clone(), link.weight));
            }
        }

        for neighbors in adjacency.values_mut() {
            neighbors.sort();
            neighbors.dedup();
        }

        TopologySnapshot {
            adjacency,
            version: self.version,
        }
    }
}
