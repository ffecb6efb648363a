pub mod agent;
pub mod algorithms;
pub mod config;
pub mod controller;
pub mod error;
pub mod message;
pub mod routing;
pub mod store;
pub mod topology;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

pub type NodeId = u32;
pub type NodeName = String;
pub type Port = u16;
pub type Weight = u32;

/// Identity a router agent announces to the controller in every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterIdentity {
    pub ip: std::net::IpAddr,
    pub port: Port,
    pub node_id: NodeId,
}

/// Per-agent mutable state: the current flattened table plus refresh metadata.
///
/// The table is only ever replaced whole (never patched entry by entry), so a
/// forwarding lookup holding the read lock sees either the previous table or
/// the next one.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub identity: RouterIdentity,
    pub table: routing::FlatTable,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl RouterState {
    pub fn new(identity: RouterIdentity) -> Self {
        Self {
            identity,
            table: routing::FlatTable::new(),
            last_refresh: None,
        }
    }
}

pub type SharedRouterState = Arc<RwLock<RouterState>>;
