use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use storychain_node::{bootstrap, mining, persist, server, sync, tracker_client, NodeConfig};

/// A story-chain node: mines blocks, serves the chain over HTTP, and stays
/// in sync with its peers via the tracker.
#[derive(Debug, Parser)]
#[command(name = "node", version, about)]
struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP server on.
    #[arg(long)]
    port: u16,

    /// Base URL of the tracker, e.g. http://127.0.0.1:8500.
    #[arg(long)]
    tracker: Option<String>,

    /// Start with the background mining worker enabled.
    #[arg(long)]
    auto_mine: bool,

    /// Seconds between auto-mine attempts while enabled.
    #[arg(long, default_value_t = 5)]
    mine_interval: u64,

    /// Number of leading hex-zero characters required in a block hash.
    #[arg(long, default_value_t = 4)]
    difficulty: usize,

    /// Seconds between peer-refresh + chain-sync passes.
    #[arg(long, default_value_t = 10)]
    sync_interval: u64,

    /// Directory under which this node's chain snapshot is persisted.
    #[arg(long, default_value = "blockchain_states")]
    state_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr: SocketAddr = match format!("{}:{}", args.host, args.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("invalid --host/--port combination: {}", err);
            std::process::exit(2);
        }
    };

    // Probe the port before handing off to the HTTP server so a bind
    // failure is a clean, immediate, nonzero exit rather than a panic deep
    // inside the server future (§6 exit codes).
    if let Err(err) = std::net::TcpListener::bind(bind_addr) {
        log::error!("failed to bind {}: {}", bind_addr, err);
        std::process::exit(1);
    }

    let node = bootstrap(NodeConfig {
        host: args.host.clone(),
        port: args.port,
        tracker_url: args.tracker.clone(),
        auto_mine: args.auto_mine,
        mine_interval_secs: args.mine_interval,
        difficulty: args.difficulty,
        sync_interval_secs: args.sync_interval,
        state_dir: args.state_dir,
    });

    log::info!(
        "starting node {} (difficulty={}, tracker={:?}, auto_mine={})",
        node.address(),
        node.difficulty,
        node.tracker_url,
        args.auto_mine
    );

    // §4.2 step 2: register (best-effort; the sync worker's periodic
    // heartbeat acts as the retry).
    if let Err(err) = tracker_client::register(&node).await {
        log::warn!("initial tracker registration failed, will retry via heartbeat: {}", err);
    }

    // §4.2 step 3: initial sync against whatever peers registration
    // returned.
    sync::run_sync_pass(&node).await;

    let server_node = node.clone();
    let server_task = tokio::spawn(async move { server::run(server_node, bind_addr).await });

    let mining_task = tokio::spawn(mining::run_mining_worker(node.clone()));
    let sync_task = tokio::spawn(sync::run_sync_worker(node.clone()));

    wait_for_shutdown_signal().await;
    log::info!("shutdown signal received, winding down");

    node.shutdown.store(true, Ordering::Relaxed);
    node.cancel_current_mining();

    tracker_client::unregister(&node).await;
    if let Err(err) = persist(&node) {
        log::warn!("failed to persist chain during shutdown: {}", err);
    }

    let _ = mining_task.await;
    let _ = sync_task.await;
    let _ = server_task.await;

    log::info!("node {} stopped", node.address());
}

async fn wait_for_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", err);
    }
}
