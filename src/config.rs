//! Topology bootstrap: an ordered sequence of node-add and link-add
//! operations loaded once at startup. Not part of the runtime protocol.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::topology::{Network, NodeAddress, NodeKind};
use crate::{NodeId, NodeName, Port, Weight};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub name: NodeName,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub port: Option<Port>,
    #[serde(default)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub source: NodeId,
    pub dest: NodeId,
    pub weight: Weight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
}

impl TopologyConfig {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TopologyConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Applies the node and link operations in declaration order.
    pub fn build(&self) -> Result<Network, TopologyError> {
        let mut network = Network::new();
        for node in &self.nodes {
            let address = match (node.ip, node.port) {
                (Some(ip), Some(port)) => Some(NodeAddress { ip, port }),
                _ => None,
            };
            network.add_node(node.id, &node.name, address, node.kind)?;
        }
        for link in &self.links {
            network.add_link(link.source, link.dest, link.weight)?;
        }
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_applies_operations_in_order() {
        let config: TopologyConfig = serde_json::from_str(
            r#"{
                "nodes": [
                    {"id": 1, "name": "WA", "ip": "192.168.1.10", "port": 8000},
                    {"id": 2, "name": "CA1", "ip": "192.168.1.11", "port": 8001},
                    {"id": 3, "name": "H1", "kind": "host"}
                ],
                "links": [
                    {"source": 1, "dest": 2, "weight": 2100},
                    {"source": 2, "dest": 1, "weight": 2100}
                ]
            }"#,
        )
        .unwrap();

        let network = config.build().unwrap();
        assert_eq!(network.node_by_name("WA").unwrap().id, 1);
        assert_eq!(network.node_by_name("H1").unwrap().address, None);
        assert_eq!(network.links().len(), 2);
    }

    #[test]
    fn build_surfaces_edit_errors() {
        let config = TopologyConfig {
            nodes: vec![
                NodeSpec {
                    id: 1,
                    name: "A".to_string(),
                    ip: None,
                    port: None,
                    kind: NodeKind::Router,
                },
            ],
            links: vec![LinkSpec {
                source: 1,
                dest: 2,
                weight: 1,
            }],
        };
        assert_eq!(config.build().unwrap_err(), TopologyError::UnknownNode(2));
    }
}
