//! Controller and router agents wired together over loopback TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use sdn_sim::agent::{AgentConfig, RouterAgent};
use sdn_sim::controller::Controller;
use sdn_sim::message::{DataPacket, Request, TableReply, NO_ROUTE_REPLY};
use sdn_sim::routing::BroadcastMessage;
use sdn_sim::topology::{Network, NodeAddress, NodeKind};
use sdn_sim::{Port, RouterIdentity};

const WAIT: Duration = Duration::from_secs(5);

fn line_network(ports: &[Port; 3]) -> Network {
    let mut net = Network::new();
    for (i, name) in ["A", "B", "C"].iter().enumerate() {
        net.add_node(
            i as u32 + 1,
            name,
            Some(NodeAddress {
                ip: "127.0.0.1".parse().unwrap(),
                port: ports[i],
            }),
            NodeKind::Router,
        )
        .unwrap();
    }
    for (s, d) in [(1, 2), (2, 1), (2, 3), (3, 2)] {
        net.add_link(s, d, 1).unwrap();
    }
    net
}

async fn start_controller(net: Network) -> (SocketAddr, watch::Sender<()>) {
    let (tx, rx) = watch::channel(());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let controller = Controller::new(
        net,
        BroadcastMessage {
            message: "ASK".to_string(),
        },
    );
    tokio::spawn(async move {
        controller.run(listener, rx).await.unwrap();
    });
    (addr, tx)
}

async fn send_heartbeat(controller: SocketAddr, port: Port, node_id: u32) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(controller).await.unwrap();
    let line = Request::heartbeat("127.0.0.1".parse().unwrap(), port, node_id).encode();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();

    let (read, write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut reply = String::new();
    timeout(WAIT, reader.read_line(&mut reply))
        .await
        .expect("timed out waiting for table reply")
        .unwrap();
    (reader.into_inner().reunite(write).unwrap(), reply)
}

#[tokio::test]
async fn heartbeat_returns_flattened_table_and_broadcast() {
    let ports = [8100, 8101, 8102];
    let (controller, _shutdown) = start_controller(line_network(&ports)).await;

    let (_conn, reply) = send_heartbeat(controller, 8100, 1).await;
    let reply = TableReply::decode(reply.trim_end()).unwrap();
    assert_eq!(reply.table["C"], vec![8100, 8101, 8102]);
    assert_eq!(reply.table["B"], vec![8100, 8101]);
    assert_eq!(reply.broadcast.message, "ASK");
}

#[tokio::test]
async fn unknown_address_gets_no_route_reply() {
    let ports = [8110, 8111, 8112];
    let (controller, _shutdown) = start_controller(line_network(&ports)).await;

    let (_conn, reply) = send_heartbeat(controller, 9999, 42).await;
    assert_eq!(reply.trim_end(), NO_ROUTE_REPLY);
}

#[tokio::test]
async fn departure_removes_node_from_every_table() {
    let ports = [8120, 8121, 8122];
    let (controller, _shutdown) = start_controller(line_network(&ports)).await;

    // C identifies itself, then its connection drops.
    let (conn, _reply) = send_heartbeat(controller, 8122, 3).await;
    drop(conn);

    // The repair runs after the drop is noticed; poll A's view until C is
    // gone. Keep A's connections open so A itself is not treated as
    // departed.
    let mut held = Vec::new();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let (conn, reply) = send_heartbeat(controller, 8120, 1).await;
        held.push(conn);
        let reply = TableReply::decode(reply.trim_end()).unwrap();
        if !reply.table.contains_key("C") {
            assert!(reply.table.contains_key("B"));
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "controller never removed the departed node"
        );
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn rogue_heartbeat_disconnect_leaves_topology_intact() {
    let ports = [8130, 8131, 8132];
    let (controller, _shutdown) = start_controller(line_network(&ports)).await;

    // An unregistered address claiming C's node id gets no-route; its
    // disconnect must not count as C's departure.
    let mut stream = TcpStream::connect(controller).await.unwrap();
    let line = Request::heartbeat("10.9.9.9".parse().unwrap(), 4242, 3).encode();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    let (read, _write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut reply = String::new();
    timeout(WAIT, reader.read_line(&mut reply)).await.unwrap().unwrap();
    assert_eq!(reply.trim_end(), NO_ROUTE_REPLY);
    drop(reader);
    drop(_write);

    // Give the controller time to process the disconnect, then check C is
    // still routable.
    sleep(Duration::from_millis(200)).await;
    let (_conn, reply) = send_heartbeat(controller, 8130, 1).await;
    let reply = TableReply::decode(reply.trim_end()).unwrap();
    assert_eq!(reply.table["C"], vec![8130, 8131, 8132]);
}

#[tokio::test]
async fn packet_crosses_two_hops_and_reaches_the_host() {
    // Bind the three agent listeners first so the topology can carry real
    // ports.
    let mut listeners = Vec::new();
    let mut ports = [0u16; 3];
    for slot in ports.iter_mut() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        *slot = listener.local_addr().unwrap().port();
        listeners.push(listener);
    }

    let (controller, shutdown_tx) = start_controller(line_network(&ports)).await;

    let shutdown_rx = shutdown_tx.subscribe();
    let mut agents = Vec::new();
    for (i, listener) in listeners.into_iter().enumerate() {
        let mut config = AgentConfig::new(controller);
        config.refresh_interval = Duration::from_millis(50);
        let agent = Arc::new(RouterAgent::new(
            RouterIdentity {
                ip: "127.0.0.1".parse().unwrap(),
                port: ports[i],
                node_id: i as u32 + 1,
            },
            config,
        ));
        agents.push(agent.clone());
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            agent.run(listener, rx).await.unwrap();
        });
    }

    // Wait until every agent has received a table.
    for agent in &agents {
        let state = agent.state();
        timeout(WAIT, async {
            loop {
                if !state.read().await.table.is_empty() {
                    return;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("agent never received its routing table");
    }

    // Attach a host to C.
    let mut host = TcpStream::connect(("127.0.0.1", ports[2])).await.unwrap();
    host.write_all(Request::Attach.encode().as_bytes())
        .await
        .unwrap();
    host.write_all(b"\n").await.unwrap();
    // Give the agent a moment to register the attachment.
    sleep(Duration::from_millis(100)).await;

    // Inject a packet at A destined for C's port.
    let pkt = DataPacket {
        payload: "hello across the line".to_string(),
        dest_port: ports[2],
        source_port: ports[0],
        source_node: "A".to_string(),
    };
    let mut ingress = TcpStream::connect(("127.0.0.1", ports[0])).await.unwrap();
    ingress
        .write_all(Request::Packet(pkt.clone()).encode().as_bytes())
        .await
        .unwrap();
    ingress.write_all(b"\n").await.unwrap();

    // The host attached to C receives the message with its source
    // annotation intact.
    let mut reader = BufReader::new(host);
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("packet never reached the host")
        .unwrap();
    assert_eq!(Request::decode(&line).unwrap(), Request::Packet(pkt));

    let _ = shutdown_tx.send(());
}
