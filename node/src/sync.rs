use std::time::Duration;

use serde::Deserialize;
use storychain_core::chain::validate_chain;
use storychain_core::Block;

use crate::state::NodeHandle;

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ChainResponse {
    #[allow(dead_code)]
    length: usize,
    chain: Vec<Block>,
}

/// Fans a freshly mined block out to every cached peer. Failures are
/// logged and swallowed (§4.3): the sync worker will eventually reconcile.
/// Must be called with the ledger lock already released (§5).
pub async fn broadcast_block(node: &NodeHandle, block: &Block) {
    let peers = node.peers.read().clone();
    if peers.is_empty() {
        return;
    }

    let client = reqwest::Client::new();
    let body = serde_json::json!({ "block": block });

    for peer in peers {
        let client = client.clone();
        let body = body.clone();
        tokio::spawn(async move {
            let url = format!("http://{}/receive_block", peer);
            if let Err(err) = client.post(&url).timeout(PEER_TIMEOUT).json(&body).send().await {
                log::warn!("broadcast to {} failed: {}", peer, err);
            }
        });
    }
}

/// Stages `candidate` into `best` if it is strictly longer than both the
/// local chain and whatever is currently staged (§4.3: "If candidate.length
/// > local.length, stage it ... adopt the single longest valid one").
/// Pulled out of `run_sync_pass` as a pure function so the staging rule can
/// be unit tested without a live network.
fn stage_if_better(best: &mut Option<Vec<Block>>, candidate: Vec<Block>, local_len: usize) {
    if candidate.len() <= local_len {
        return;
    }
    let is_better = best.as_ref().map(|b| candidate.len() > b.len()).unwrap_or(true);
    if is_better {
        *best = Some(candidate);
    }
}

/// One chain-sync pass (§4.3): poll every cached peer's `/get_chain`,
/// validate candidates end-to-end, stage strictly-longer ones, and after
/// polling everyone adopt the single longest valid candidate. Ties keep
/// the local chain.
pub async fn run_sync_pass(node: &NodeHandle) {
    let peers = node.peers.read().clone();
    let difficulty = node.difficulty;
    let local_len = node.ledger.read().chain.len();

    let client = reqwest::Client::new();
    let mut best: Option<Vec<Block>> = None;

    for peer in &peers {
        let url = format!("http://{}/get_chain", peer);
        let response = match client.get(&url).timeout(PEER_TIMEOUT).send().await {
            Ok(response) => response,
            Err(err) => {
                log::debug!("sync: peer {} unreachable, skipping: {}", peer, err);
                continue;
            }
        };

        let parsed: ChainResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                log::debug!("sync: peer {} sent an unparsable chain, skipping: {}", peer, err);
                continue;
            }
        };

        if let Err(reason) = validate_chain(&parsed.chain, difficulty) {
            log::warn!("sync: peer {} offered an invalid chain ({}), ignoring", peer, reason);
            continue;
        }

        stage_if_better(&mut best, parsed.chain, local_len);
    }

    let Some(candidate) = best else { return };

    node.cancel_current_mining();
    let adopted_len = {
        let mut ledger = node.ledger.write();
        if ledger.chain.replace_if_longer(candidate.clone()) {
            for block in &candidate {
                ledger.mempool.remove_first_matching(&block.data);
            }
            Some(ledger.chain.len())
        } else {
            None
        }
    };

    if let Some(len) = adopted_len {
        log::info!("sync: adopted a peer chain of length {}", len);
        if let Err(err) = crate::persist(node) {
            log::warn!("failed to persist chain after sync adoption: {}", err);
        }
    }
}

/// Background worker: every `sync_interval` seconds, refresh the peer
/// cache from the tracker and run a sync pass (§4.2 step 4).
pub async fn run_sync_worker(node: NodeHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(node.sync_interval_secs.max(1)));
    loop {
        interval.tick().await;
        if node.is_shutting_down() {
            break;
        }
        crate::tracker_client::refresh_peers(&node).await;
        run_sync_pass(&node).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storychain_core::block::{compute_hash, hash_satisfies_difficulty};

    fn mine_next(prev: &Block, data: &str) -> Block {
        let mut nonce = 0u64;
        loop {
            let hash = compute_hash(prev.index + 1, 0, data, &prev.hash, nonce);
            if hash_satisfies_difficulty(&hash, 1) {
                return Block {
                    index: prev.index + 1,
                    timestamp: 0,
                    data: data.to_string(),
                    prev_hash: prev.hash.clone(),
                    nonce,
                    hash,
                };
            }
            nonce += 1;
        }
    }

    fn chain_of_len(n: usize) -> Vec<Block> {
        let genesis = Block::genesis(1);
        let mut blocks = vec![genesis];
        for i in 0..n - 1 {
            let next = mine_next(blocks.last().unwrap(), &format!("block-{}", i));
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn shorter_or_equal_candidate_is_not_staged() {
        let mut best = None;
        stage_if_better(&mut best, chain_of_len(2), 2);
        assert!(best.is_none());
    }

    #[test]
    fn strictly_longer_candidate_is_staged() {
        let mut best = None;
        stage_if_better(&mut best, chain_of_len(3), 2);
        assert_eq!(best.unwrap().len(), 3);
    }

    #[test]
    fn only_the_single_longest_staged_candidate_survives() {
        let mut best = None;
        stage_if_better(&mut best, chain_of_len(3), 2);
        stage_if_better(&mut best, chain_of_len(5), 2);
        stage_if_better(&mut best, chain_of_len(4), 2);
        assert_eq!(best.unwrap().len(), 5);
    }
}
