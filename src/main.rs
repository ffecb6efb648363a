use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tokio::sync::watch;

use sdn_sim::agent::{AgentConfig, RouterAgent};
use sdn_sim::config::TopologyConfig;
use sdn_sim::controller::Controller;
use sdn_sim::routing::BroadcastMessage;
use sdn_sim::store::{JsonFileStore, StateStore};
use sdn_sim::RouterIdentity;

#[derive(Parser)]
#[command(name = "sdn-sim")]
#[command(about = "Software-defined network simulation: controller and router agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the central controller.
    Controller {
        #[arg(long, default_value = "127.0.0.1:8888")]
        listen: SocketAddr,

        /// Topology bootstrap file (node and link operations, JSON).
        #[arg(long)]
        topology: String,

        /// Broadcast payload distributed with every table reply.
        #[arg(long, default_value = "ASK")]
        message: String,

        /// Directory for the persisted routing-table documents.
        #[arg(long)]
        state_dir: Option<String>,
    },
    /// Run one router agent.
    Router {
        #[arg(long, default_value = "127.0.0.1:8888")]
        controller: SocketAddr,

        /// Advertised address, as registered in the controller's topology.
        #[arg(long)]
        ip: IpAddr,

        /// Data port; also this node's identity in flattened tables.
        #[arg(long)]
        port: u16,

        #[arg(long)]
        node_id: u32,

        /// Seconds between routing-table refresh heartbeats.
        #[arg(long, default_value_t = 5)]
        refresh_secs: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(());
        });

        match cli.command {
            Command::Controller {
                listen,
                topology,
                message,
                state_dir,
            } => {
                let network = TopologyConfig::load_from_file(&topology)?.build()?;
                let store: Option<Box<dyn StateStore>> = match state_dir {
                    Some(dir) => Some(Box::new(JsonFileStore::new(dir)?)),
                    None => None,
                };
                let controller = Controller::with_store(network, BroadcastMessage { message }, store);
                // Bind failure is the one fatal startup error.
                let listener = TcpListener::bind(listen).await?;
                controller.run(listener, shutdown_rx).await
            }
            Command::Router {
                controller,
                ip,
                port,
                node_id,
                refresh_secs,
            } => {
                let mut config = AgentConfig::new(controller);
                config.refresh_interval = Duration::from_secs(refresh_secs);
                let agent = Arc::new(RouterAgent::new(RouterIdentity { ip, port, node_id }, config));
                let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
                agent.run(listener, shutdown_rx).await
            }
        }
    })
}
