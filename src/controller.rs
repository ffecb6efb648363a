use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};

use crate::algorithms::dijkstra::all_pairs_shortest_paths;
use crate::message::{Request, TableReply, NO_ROUTE_REPLY};
use crate::routing::{self, BroadcastMessage, TableSet};
use crate::store::{StateStore, BROADCAST_KEY, TABLES_KEY};
use crate::topology::Network;
use crate::{NodeId, Port};

/// Everything the controller mutates, behind one lock. Handlers read the
/// current tables by cloning the `Arc` under a short critical section;
/// recomputation replaces the whole `Arc`, so no reader ever sees a
/// half-written set.
struct ControllerState {
    network: Network,
    tables: Arc<TableSet>,
    broadcast: BroadcastMessage,
    store: Option<Box<dyn StateStore>>,
}

/// Central control plane: owns the topology store, answers heartbeats with
/// flattened routing tables, and repairs the topology when a router drops.
pub struct Controller {
    state: Arc<Mutex<ControllerState>>,
}

impl Controller {
    pub fn new(network: Network, broadcast: BroadcastMessage) -> Self {
        Self::with_store(network, broadcast, None)
    }

    pub fn with_store(
        network: Network,
        broadcast: BroadcastMessage,
        store: Option<Box<dyn StateStore>>,
    ) -> Self {
        let mut state = ControllerState {
            network,
            tables: Arc::new(TableSet::new()),
            broadcast,
            store,
        };
        Self::recompute(&mut state);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Current routing-table set (immutable snapshot).
    pub async fn tables(&self) -> Arc<TableSet> {
        self.state.lock().await.tables.clone()
    }

    /// Full topology repair: all-pairs Dijkstra, table rebuild, atomic swap,
    /// then a full rewrite of the persisted documents.
    fn recompute(state: &mut ControllerState) {
        let paths = all_pairs_shortest_paths(&state.network.snapshot());
        let tables = routing::build_tables(&state.network, &paths);
        info!(
            "routing tables rebuilt for {} nodes (topology v{})",
            tables.len(),
            state.network.version()
        );
        state.tables = Arc::new(tables);
        Self::persist(state);
    }

    fn persist(state: &ControllerState) {
        let Some(store) = &state.store else {
            return;
        };
        let result = serde_json::to_string_pretty(&*state.tables)
            .map_err(anyhow::Error::from)
            .and_then(|doc| store.put(TABLES_KEY, &doc))
            .and_then(|_| {
                let doc = serde_json::to_string_pretty(&state.broadcast)?;
                store.put(BROADCAST_KEY, &doc)
            });
        if let Err(e) = result {
            error!("failed to persist controller state: {e:#}");
        }
    }

    /// Accept loop; one task per connection. Only a bind failure before this
    /// point is fatal to the process.
    pub async fn run(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        info!("controller listening on {local}");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("control connection from {addr}");
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                Self::handle_connection(state, stream, addr).await;
                            });
                        }
                        Err(e) => warn!("failed to accept control connection: {e}"),
                    }
                }
            }
        }
    }

    async fn handle_connection(
        state: Arc<Mutex<ControllerState>>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let mut last_node: Option<NodeId> = None;
        if let Err(e) = Self::serve(&state, stream, &mut last_node).await {
            warn!("control connection {peer} failed: {e}");
        } else {
            debug!("control connection {peer} closed");
        }
        // Either way the router behind this connection is gone.
        if let Some(node_id) = last_node {
            Self::handle_departure(&state, node_id).await;
        }
    }

    async fn serve(
        state: &Arc<Mutex<ControllerState>>,
        mut stream: TcpStream,
        last_node: &mut Option<NodeId>,
    ) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            match Request::decode(&line) {
                Ok(Request::TableRequest { ip, port, node_id }) => {
                    match Self::table_reply_for(state, ip, port).await {
                        Some((resolved_id, reply)) => {
                            // Departure tracking keys on the node the
                            // address resolved to, never the claimed id.
                            *last_node = Some(resolved_id);
                            writer.write_all(reply.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                            writer.flush().await?;
                        }
                        None => {
                            warn!("no routing table for {ip}:{port} (node {node_id})");
                            writer.write_all(NO_ROUTE_REPLY.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                            writer.flush().await?;
                        }
                    }
                }
                Ok(other) => {
                    warn!("ignoring data-plane message on control channel: {other:?}");
                }
                // Malformed input is a protocol violation; drop the peer.
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resolved node id and encoded table reply for the node registered at
    /// (ip, port), or `None` when the address is unknown or its table
    /// cannot be flattened.
    async fn table_reply_for(
        state: &Arc<Mutex<ControllerState>>,
        ip: IpAddr,
        port: Port,
    ) -> Option<(NodeId, String)> {
        let (tables, broadcast) = {
            let state = state.lock().await;
            (state.tables.clone(), state.broadcast.clone())
        };

        let (name, table) = tables.iter().find(|(_, t)| t.ip == ip && t.port == port)?;
        match routing::flatten(name, &tables) {
            Ok(flat) => {
                let reply = TableReply {
                    table: flat,
                    broadcast,
                };
                match reply.encode() {
                    Ok(encoded) => Some((table.node_id, encoded)),
                    Err(e) => {
                        error!("failed to encode table reply for {name}: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                error!("cannot flatten routing table for {name}: {e}");
                None
            }
        }
    }

    /// Removes the departed node and rebuilds every table on the reduced
    /// topology.
    async fn handle_departure(state: &Arc<Mutex<ControllerState>>, node_id: NodeId) {
        let mut state = state.lock().await;
        match state.network.remove_node(node_id) {
            Ok(record) => {
                info!("node {} ({}) departed, repairing topology", node_id, record.name);
                Self::recompute(&mut state);
            }
            // A second connection from the same node may already have
            // removed it.
            Err(e) => debug!("departure of node {node_id}: {e}"),
        }
    }
}
