use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval, timeout};

use crate::error::ForwardError;
use crate::message::{DataPacket, Request, TableReply, NO_ROUTE_REPLY};
use crate::routing::{next_hop, HopDecision};
use crate::{Port, RouterIdentity, RouterState, SharedRouterState};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub controller: SocketAddr,
    pub refresh_interval: Duration,
    pub forward_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl AgentConfig {
    pub fn new(controller: SocketAddr) -> Self {
        Self {
            controller,
            refresh_interval: Duration::from_secs(5),
            forward_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// One forwarding node: keeps a local copy of its routing table fresh via
/// heartbeats to the controller, and relays data messages hop by hop.
pub struct RouterAgent {
    state: SharedRouterState,
    config: AgentConfig,
    /// Write half of whichever connection is attached as the local host.
    host: Mutex<Option<OwnedWriteHalf>>,
}

impl RouterAgent {
    pub fn new(identity: RouterIdentity, config: AgentConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(RouterState::new(identity))),
            config,
            host: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SharedRouterState {
        self.state.clone()
    }

    /// Runs the control loop and the data listener until shutdown.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let control = self.clone();
        let mut control_shutdown = shutdown.clone();
        tokio::spawn(async move {
            control.control_loop(&mut control_shutdown).await;
        });
        self.data_loop(listener, shutdown).await
    }

    /// Reconnect-with-retry loop on the control channel. A dropped session
    /// is never fatal; the agent keeps its last table and retries.
    async fn control_loop(&self, shutdown: &mut watch::Receiver<()>) {
        loop {
            match TcpStream::connect(self.config.controller).await {
                Ok(stream) => {
                    info!("connected to controller at {}", self.config.controller);
                    match self.control_session(stream, shutdown).await {
                        Ok(()) => return,
                        Err(e) => warn!("control session ended: {e}"),
                    }
                }
                Err(e) => warn!("cannot reach controller at {}: {e}", self.config.controller),
            }
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One control session: a periodic heartbeat sender plus a reply reader,
    /// each updating nothing but its own side. Returns `Ok` only on
    /// shutdown.
    async fn control_session(
        &self,
        stream: TcpStream,
        shutdown: &mut watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.into_split();

        let heartbeat = {
            let state = self.state.read().await;
            Request::heartbeat(
                state.identity.ip,
                state.identity.port,
                state.identity.node_id,
            )
            .encode()
        };
        let refresh = self.config.refresh_interval;
        let sender = tokio::spawn(async move {
            let mut ticker = interval(refresh);
            loop {
                ticker.tick().await;
                let result = async {
                    writer.write_all(heartbeat.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                }
                .await;
                if result.is_err() {
                    break;
                }
            }
        });

        let result = self.read_replies(reader, shutdown).await;
        sender.abort();
        result
    }

    async fn read_replies(
        &self,
        reader: OwnedReadHalf,
        shutdown: &mut watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                read = reader.read_line(&mut line) => {
                    if read? == 0 {
                        anyhow::bail!("controller closed the control connection");
                    }
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed == NO_ROUTE_REPLY {
                        warn!("controller has no routing table for this node");
                        continue;
                    }
                    match TableReply::decode(trimmed) {
                        Ok(reply) => {
                            let mut state = self.state.write().await;
                            // Whole-table replace, never entry by entry.
                            state.table = reply.table;
                            state.last_refresh = Some(Utc::now());
                            debug!(
                                "routing table refreshed: {} destinations",
                                state.table.len()
                            );
                        }
                        Err(e) => warn!("discarding malformed table reply: {e}"),
                    }
                }
            }
        }
    }

    async fn data_loop(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        info!("router agent listening for data on {local}");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("router agent shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("data connection from {addr}");
                            let agent = self.clone();
                            tokio::spawn(async move {
                                agent.handle_data_connection(stream, addr).await;
                            });
                        }
                        Err(e) => warn!("failed to accept data connection: {e}"),
                    }
                }
            }
        }
    }

    async fn handle_data_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let mut writer = Some(writer);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Request::decode(&line) {
                        Ok(Request::Attach) => {
                            if let Some(w) = writer.take() {
                                *self.host.lock().await = Some(w);
                                info!("host attached from {peer}");
                            } else {
                                warn!("duplicate attach from {peer}");
                            }
                        }
                        Ok(Request::Packet(pkt)) => {
                            if let Err(e) = self.route_packet(&pkt).await {
                                warn!(
                                    "dropping packet from {} for port {}: {e}",
                                    pkt.source_node, pkt.dest_port
                                );
                            }
                        }
                        Ok(Request::TableRequest { .. }) => {
                            warn!("ignoring control message on data port from {peer}");
                        }
                        Err(e) => {
                            warn!("malformed data message from {peer}: {e}");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("data connection {peer} read failed: {e}");
                    break;
                }
            }
        }
    }

    /// One hop of the data plane: forward toward the destination port, or
    /// deliver to the attached host if this node is the endpoint. Failures
    /// drop this message only.
    pub async fn route_packet(&self, pkt: &DataPacket) -> Result<(), ForwardError> {
        let decision = {
            let state = self.state.read().await;
            next_hop(&state.table, state.identity.port, pkt.dest_port)?
        };
        match decision {
            HopDecision::Forward(port) => self.forward(port, pkt).await,
            HopDecision::Deliver => self.deliver(pkt).await,
        }
    }

    async fn forward(&self, port: Port, pkt: &DataPacket) -> Result<(), ForwardError> {
        // Ports identify nodes on the local host in this simulation.
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let io = async {
            let mut stream = TcpStream::connect(addr).await?;
            stream
                .write_all(Request::Packet(pkt.clone()).encode().as_bytes())
                .await?;
            stream.write_all(b"\n").await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match timeout(self.config.forward_timeout, io).await {
            Ok(Ok(())) => {
                debug!("forwarded packet for port {} via {port}", pkt.dest_port);
                Ok(())
            }
            Ok(Err(source)) => Err(ForwardError::NextHopUnreachable { port, source }),
            Err(_) => Err(ForwardError::NextHopUnreachable {
                port,
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect or write timed out",
                ),
            }),
        }
    }

    async fn deliver(&self, pkt: &DataPacket) -> Result<(), ForwardError> {
        let mut host = self.host.lock().await;
        let writer = host.as_mut().ok_or(ForwardError::NoHostAttached)?;
        let line = format!("{}\n", Request::Packet(pkt.clone()).encode());
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("attached host write failed, detaching: {e}");
            *host = None;
            return Err(ForwardError::NoHostAttached);
        }
        debug!("delivered packet from {} to local host", pkt.source_node);
        Ok(())
    }
}
