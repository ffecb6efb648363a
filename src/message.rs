//! Line-framed text wire protocol shared by the controller and the agents.
//!
//! Every message is one line. Requests carry a leading type tag so the two
//! request shapes cannot be confused; replies to a heartbeat are two JSON
//! documents joined by `" - "` (flattened table first, broadcast second).

use std::net::IpAddr;

use crate::error::DecodeError;
use crate::routing::{BroadcastMessage, FlatTable};
use crate::{NodeId, NodeName, Port};

const SEP: char = '-';
const HEARTBEAT_TAG: &str = "data";
const PACKET_TAG: &str = "pkt";
const ATTACH_TAG: &str = "attach";

/// Delimiter between the table document and the broadcast document in a
/// table reply.
pub const REPLY_DELIMITER: &str = " - ";

/// Reply sent when the requesting (ip, port) pair matches no known node.
pub const NO_ROUTE_REPLY: &str = "no-route";

/// A data-plane message relayed hop by hop. The payload is the last wire
/// field so it may itself contain the separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub payload: String,
    pub dest_port: Port,
    pub source_port: Port,
    pub source_node: NodeName,
}

/// Inbound requests, discriminated by leading tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Heartbeat: a router identifying itself and asking for its table.
    TableRequest {
        ip: IpAddr,
        port: Port,
        node_id: NodeId,
    },
    /// A hop-relayed data message.
    Packet(DataPacket),
    /// The sending connection wants to be this node's attached host.
    Attach,
}

impl Request {
    pub fn heartbeat(ip: IpAddr, port: Port, node_id: NodeId) -> Self {
        Request::TableRequest { ip, port, node_id }
    }

    pub fn encode(&self) -> String {
        match self {
            Request::TableRequest { ip, port, node_id } => {
                format!("{HEARTBEAT_TAG}{SEP}{ip}{SEP}{port}{SEP}{node_id}")
            }
            Request::Packet(pkt) => format!(
                "{PACKET_TAG}{SEP}{}{SEP}{}{SEP}{}{SEP}{}",
                pkt.dest_port, pkt.source_port, pkt.source_node, pkt.payload
            ),
            Request::Attach => ATTACH_TAG.to_string(),
        }
    }

    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mut fields = line.splitn(5, SEP);
        let tag = fields.next().ok_or(DecodeError::Empty)?;
        match tag {
            HEARTBEAT_TAG => {
                let ip = parse_field(fields.next(), "ip")?;
                let port = parse_field(fields.next(), "port")?;
                let node_id = parse_field(fields.next(), "node_id")?;
                if let Some(extra) = fields.next() {
                    return Err(DecodeError::TrailingField(extra.to_string()));
                }
                Ok(Request::TableRequest { ip, port, node_id })
            }
            PACKET_TAG => {
                let dest_port = parse_field(fields.next(), "dest_port")?;
                let source_port = parse_field(fields.next(), "source_port")?;
                let source_node = fields
                    .next()
                    .ok_or(DecodeError::MissingField("source_node"))?
                    .to_string();
                let payload = fields
                    .next()
                    .ok_or(DecodeError::MissingField("payload"))?
                    .to_string();
                Ok(Request::Packet(DataPacket {
                    payload,
                    dest_port,
                    source_port,
                    source_node,
                }))
            }
            ATTACH_TAG => Ok(Request::Attach),
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }
}

fn parse_field<T: std::str::FromStr>(
    raw: Option<&str>,
    field: &'static str,
) -> Result<T, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingField(field))?;
    raw.parse().map_err(|_| DecodeError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// Controller reply to a heartbeat: the requester's flattened table plus the
/// current broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReply {
    pub table: FlatTable,
    pub broadcast: BroadcastMessage,
}

impl TableReply {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "{}{}{}",
            serde_json::to_string(&self.table)?,
            REPLY_DELIMITER,
            serde_json::to_string(&self.broadcast)?
        ))
    }

    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }
        let (table_part, broadcast_part) = line
            .split_once(REPLY_DELIMITER)
            .ok_or(DecodeError::MissingField("broadcast"))?;
        Ok(Self {
            table: serde_json::from_str(table_part)?,
            broadcast: serde_json::from_str(broadcast_part)?,
        })
    }
}
