use thiserror::Error;

use crate::{NodeId, NodeName, Port, Weight};

/// Topology edit failures. The store is left unchanged when these occur.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("node id {0} already exists")]
    DuplicateNode(NodeId),

    #[error("node name `{0}` already exists")]
    DuplicateName(NodeName),

    #[error("node id {0} not found")]
    UnknownNode(NodeId),

    #[error("link weight must be positive, got {0}")]
    InvalidWeight(Weight),
}

/// Routing-table build failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// A node appears on a path but has no registered port; flattening the
    /// path would corrupt the port-matching done by agents downstream.
    #[error("node `{0}` appears on a path but has no registered address")]
    MissingAddress(NodeName),
}

/// Strict wire-decode failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("unknown message tag `{0}`")]
    UnknownTag(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value `{value}` for field `{field}`")]
    InvalidField { field: &'static str, value: String },

    #[error("unexpected trailing field `{0}`")]
    TrailingField(String),

    #[error("malformed table reply: {0}")]
    BadReply(#[from] serde_json::Error),
}

/// Data-plane failures. These drop the one message involved; the agent
/// keeps running.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no route for destination port {0}")]
    NoRoute(Port),

    #[error("no host attached for local delivery")]
    NoHostAttached,

    #[error("next hop {port} unreachable: {source}")]
    NextHopUnreachable {
        port: Port,
        #[source]
        source: std::io::Error,
    },
}
