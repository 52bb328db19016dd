pub mod mining;
pub mod server;
pub mod state;
pub mod sync;
pub mod tracker_client;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::RwLock;
use storychain_core::{storage, Chain, Mempool};

use crate::state::{AutoMineConfig, Ledger, NodeHandle, NodeState};

/// Startup parameters for a node, derived from its CLI arguments.
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub tracker_url: Option<String>,
    pub auto_mine: bool,
    pub mine_interval_secs: u64,
    pub difficulty: usize,
    pub sync_interval_secs: u64,
    pub state_dir: PathBuf,
}

/// §4.2 step 1: load the chain from local storage, or start from a fresh
/// genesis if none exists / the file is corrupt.
pub fn bootstrap(config: NodeConfig) -> NodeHandle {
    let path = storage::state_path(&config.state_dir, &config.host, config.port);
    let chain = match storage::load(&path) {
        Some(blocks) => match storychain_core::chain::validate_chain(&blocks, config.difficulty) {
            Ok(()) => {
                log::info!("loaded persisted chain with {} blocks from {:?}", blocks.len(), path);
                Chain::from_validated_blocks(blocks)
            }
            Err(reason) => {
                log::warn!("persisted chain at {:?} failed validation ({}), starting from genesis", path, reason);
                Chain::genesis(config.difficulty)
            }
        },
        None => {
            log::info!("no usable persisted chain found, starting from genesis");
            Chain::genesis(config.difficulty)
        }
    };

    Arc::new(NodeState {
        ledger: RwLock::new(Ledger { chain, mempool: Mempool::new() }),
        auto_mine: RwLock::new(AutoMineConfig {
            enabled: config.auto_mine,
            interval_secs: config.mine_interval_secs,
        }),
        peers: RwLock::new(Vec::new()),
        mining_cancel: Arc::new(AtomicBool::new(false)),
        difficulty: config.difficulty,
        sync_interval_secs: config.sync_interval_secs,
        host: config.host,
        port: config.port,
        tracker_url: config.tracker_url,
        state_dir: config.state_dir,
        shutdown: Arc::new(AtomicBool::new(false)),
    })
}

/// Persists the current chain under this node's state file (§4.5).
/// Triggered after every chain mutation.
pub fn persist(node: &NodeHandle) -> Result<(), storychain_core::CoreError> {
    let path = storage::state_path(&node.state_dir, &node.host, node.port);
    let blocks = node.ledger.read().chain.blocks().to_vec();
    storage::save(&path, &blocks)
}
