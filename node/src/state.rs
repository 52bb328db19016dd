use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use storychain_core::{Chain, Mempool};

/// The pair guarded by the single read-write lock mandated by §5: "A
/// single read-write lock per node guards the tuple (chain, mempool)."
pub struct Ledger {
    pub chain: Chain,
    pub mempool: Mempool,
}

/// Runtime-toggleable auto-mining configuration, per `/auto_mine`.
#[derive(Debug, Clone, Copy)]
pub struct AutoMineConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

/// All state shared across the server, mining and sync workers of one node.
pub struct NodeState {
    pub ledger: RwLock<Ledger>,
    pub auto_mine: RwLock<AutoMineConfig>,
    pub peers: RwLock<Vec<String>>,
    /// Set whenever the tip changes underneath an in-flight mining attempt
    /// (a block was received or a sync replaced the chain); the mining
    /// worker polls this every `consensus::CANCEL_CHECK_INTERVAL` nonces
    /// and aborts the attempt when it observes `true` (§4.4).
    pub mining_cancel: Arc<AtomicBool>,
    pub difficulty: usize,
    pub sync_interval_secs: u64,
    pub host: String,
    pub port: u16,
    pub tracker_url: Option<String>,
    pub state_dir: PathBuf,
    pub shutdown: Arc<AtomicBool>,
}

pub type NodeHandle = Arc<NodeState>;

impl NodeState {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Signals any in-flight mining attempt to abort, then clears the flag
    /// so the next attempt starts unmarked.
    pub fn cancel_current_mining(&self) {
        self.mining_cancel.store(true, Ordering::Relaxed);
    }

    pub fn reset_mining_cancel(&self) {
        self.mining_cancel.store(false, Ordering::Relaxed);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> NodeHandle {
        Arc::new(NodeState {
            ledger: RwLock::new(Ledger { chain: Chain::genesis(1), mempool: Mempool::new() }),
            auto_mine: RwLock::new(AutoMineConfig { enabled: false, interval_secs: 5 }),
            peers: RwLock::new(Vec::new()),
            mining_cancel: Arc::new(AtomicBool::new(false)),
            difficulty: 1,
            sync_interval_secs: 10,
            host: "127.0.0.1".to_string(),
            port: 5501,
            tracker_url: None,
            state_dir: PathBuf::from("blockchain_states"),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    #[test]
    fn address_joins_host_and_port() {
        assert_eq!(test_node().address(), "127.0.0.1:5501");
    }

    #[test]
    fn cancel_then_reset_round_trips() {
        let node = test_node();
        assert!(!node.mining_cancel.load(Ordering::Relaxed));
        node.cancel_current_mining();
        assert!(node.mining_cancel.load(Ordering::Relaxed));
        node.reset_mining_cancel();
        assert!(!node.mining_cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn shutdown_flag_reflects_store() {
        let node = test_node();
        assert!(!node.is_shutting_down());
        node.shutdown.store(true, Ordering::Relaxed);
        assert!(node.is_shutting_down());
    }
}
