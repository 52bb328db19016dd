use std::time::Duration;

use storychain_core::consensus;

use crate::state::NodeHandle;
use crate::{persist, sync};

const IDLE_POLL: Duration = Duration::from_millis(500);

/// Background mining worker (§4.2 steady state, miner worker).
///
/// While auto-mining is enabled and the mempool is non-empty, repeatedly
/// takes the front payload, mines a block against the current tip off the
/// async runtime (`spawn_blocking`), and on success appends + persists +
/// broadcasts. On cooperative cancellation (§4.4) the payload is returned
/// to the mempool front and the worker immediately retries against the new
/// tip.
pub async fn run_mining_worker(node: NodeHandle) {
    loop {
        if node.is_shutting_down() {
            break;
        }

        let (enabled, interval) = {
            let cfg = node.auto_mine.read();
            (cfg.enabled, cfg.interval_secs)
        };

        if !enabled {
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        }

        let payload = {
            let mut ledger = node.ledger.write();
            ledger.mempool.take_front()
        };

        let Some(data) = payload else {
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        attempt_one_block(&node, data).await;
        tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
    }
}

async fn attempt_one_block(node: &NodeHandle, data: String) {
    let (index, prev_hash, difficulty) = {
        let ledger = node.ledger.read();
        let tip = ledger.chain.tip();
        (tip.index + 1, tip.hash.clone(), node.difficulty)
    };

    node.reset_mining_cancel();
    let cancel = node.mining_cancel.clone();
    let mine_data = data.clone();

    let mined = tokio::task::spawn_blocking(move || {
        consensus::mine_block(index, prev_hash, mine_data, difficulty, &cancel)
    })
    .await;

    match mined {
        Ok(Ok(block)) => {
            let accepted = {
                let mut ledger = node.ledger.write();
                if ledger.chain.tip().index + 1 == block.index && ledger.chain.tip().hash == block.prev_hash {
                    ledger.chain.append_mined(block.clone());
                    true
                } else {
                    // Tip moved between the read snapshot and append; treat
                    // like a cancellation and give the payload back.
                    ledger.mempool.requeue_front(data);
                    false
                }
            };

            if accepted {
                if let Err(err) = persist(node) {
                    log::warn!("failed to persist chain after mining: {}", err);
                }
                log::info!("mined block {} ({})", block.index, &block.hash[..8.min(block.hash.len())]);
                sync::broadcast_block(node, &block).await;
            }
        }
        Ok(Err(_cancelled)) => {
            log::debug!("mining attempt cancelled, requeuing payload at mempool front");
            let mut ledger = node.ledger.write();
            ledger.mempool.requeue_front(data);
        }
        Err(join_err) => {
            log::error!("mining task panicked: {}", join_err);
            let mut ledger = node.ledger.write();
            ledger.mempool.requeue_front(data);
        }
    }
}
