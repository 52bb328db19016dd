use std::convert::Infallible;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use storychain_core::chain::ReceiveOutcome;
use storychain_core::consensus;
use storychain_core::Block;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::state::NodeHandle;
use crate::{persist, sync};

#[derive(Debug, Serialize)]
struct ChainResponse {
    length: usize,
    chain: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct AddTransactionRequest {
    data: String,
}

#[derive(Debug, Serialize)]
struct AddTransactionResponse {
    accepted: bool,
    pool_size: usize,
}

#[derive(Debug, Deserialize)]
struct MineRequest {
    data: String,
}

#[derive(Debug, Serialize)]
struct MineErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct MineResponse {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct ReceiveBlockRequest {
    block: Block,
}

#[derive(Debug, Serialize)]
struct ReceiveBlockResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutoMineRequest {
    enable: bool,
    interval: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AutoMineResponse {
    auto_mine: bool,
    interval: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    length: usize,
    tip_hash: String,
    mempool_size: usize,
    auto_mine: bool,
    peers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PeersResponse {
    peers: Vec<String>,
}

fn with_node(node: NodeHandle) -> impl Filter<Extract = (NodeHandle,), Error = Infallible> + Clone {
    warp::any().map(move || node.clone())
}

async fn get_chain(node: NodeHandle) -> Result<impl Reply, Infallible> {
    let ledger = node.ledger.read();
    let chain = ledger.chain.blocks().to_vec();
    Ok(warp::reply::json(&ChainResponse { length: chain.len(), chain }))
}

async fn add_transaction(node: NodeHandle, req: AddTransactionRequest) -> Result<impl Reply, Infallible> {
    let mut ledger = node.ledger.write();
    ledger.mempool.submit(req.data);
    let pool_size = ledger.mempool.len();
    Ok(warp::reply::json(&AddTransactionResponse { accepted: true, pool_size }))
}

async fn mine(node: NodeHandle, req: MineRequest) -> Result<Box<dyn Reply>, Infallible> {
    let (index, prev_hash, difficulty) = {
        let ledger = node.ledger.read();
        let tip = ledger.chain.tip();
        (tip.index + 1, tip.hash.clone(), node.difficulty)
    };

    node.reset_mining_cancel();
    let cancel = node.mining_cancel.clone();
    let data = req.data;
    let mined = tokio::task::spawn_blocking(move || {
        consensus::mine_block(index, prev_hash, data, difficulty, &cancel)
    })
    .await;

    let block = match mined {
        Ok(Ok(block)) => block,
        Ok(Err(_cancelled)) => {
            return Ok(Box::new(warp::reply::with_status(
                warp::reply::json(&MineErrorResponse { error: "mining cancelled".to_string() }),
                StatusCode::CONFLICT,
            )));
        }
        Err(join_err) => {
            log::error!("mining task panicked: {}", join_err);
            return Ok(Box::new(warp::reply::with_status(
                warp::reply::json(&MineErrorResponse { error: "internal mining error".to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )));
        }
    };

    let accepted_block = {
        let mut ledger = node.ledger.write();
        if ledger.chain.tip().index + 1 != block.index || ledger.chain.tip().hash != block.prev_hash {
            None
        } else {
            ledger.chain.append_mined(block.clone());
            Some(block.clone())
        }
    };

    match accepted_block {
        Some(block) => {
            if let Err(err) = persist(&node) {
                log::warn!("failed to persist chain after mining: {}", err);
            }
            sync::broadcast_block(&node, &block).await;
            Ok(Box::new(warp::reply::json(&MineResponse { block })))
        }
        None => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&MineErrorResponse { error: "tip changed during mining, retry".to_string() }),
            StatusCode::CONFLICT,
        ))),
    }
}

async fn receive_block(node: NodeHandle, req: ReceiveBlockRequest) -> Result<impl Reply, Infallible> {
    let outcome = {
        let mut ledger = node.ledger.write();
        let outcome = ledger.chain.receive_block(req.block.clone(), node.difficulty);
        if outcome == ReceiveOutcome::Accepted {
            ledger.mempool.remove_first_matching(&req.block.data);
        }
        outcome
    };

    if outcome == ReceiveOutcome::Accepted {
        node.cancel_current_mining();
        if let Err(err) = persist(&node) {
            log::warn!("failed to persist chain after receiving block: {}", err);
        }
    }

    let should_sync = matches!(outcome, ReceiveOutcome::Orphan | ReceiveOutcome::LinkageMismatch);
    if should_sync {
        let node = node.clone();
        tokio::spawn(async move {
            sync::run_sync_pass(&node).await;
        });
    }

    let (accepted, reason, status) = match outcome {
        ReceiveOutcome::Accepted => (true, None, StatusCode::OK),
        ReceiveOutcome::Stale => (false, Some("stale".to_string()), StatusCode::CONFLICT),
        ReceiveOutcome::Orphan => (false, Some("orphan".to_string()), StatusCode::CONFLICT),
        ReceiveOutcome::LinkageMismatch => (false, Some("linkage_mismatch".to_string()), StatusCode::CONFLICT),
        ReceiveOutcome::Invalid(reason) => (false, Some(reason.to_string()), StatusCode::CONFLICT),
    };

    Ok(warp::reply::with_status(warp::reply::json(&ReceiveBlockResponse { accepted, reason }), status))
}

async fn auto_mine(node: NodeHandle, req: AutoMineRequest) -> Result<impl Reply, Infallible> {
    let mut cfg = node.auto_mine.write();
    cfg.enabled = req.enable;
    if let Some(interval) = req.interval {
        cfg.interval_secs = interval;
    }
    let response = AutoMineResponse { auto_mine: cfg.enabled, interval: cfg.interval_secs };
    Ok(warp::reply::json(&response))
}

async fn status(node: NodeHandle) -> Result<impl Reply, Infallible> {
    let (length, tip_hash, mempool_size) = {
        let ledger = node.ledger.read();
        (ledger.chain.len(), ledger.chain.tip().hash.clone(), ledger.mempool.len())
    };
    let auto_mine_enabled = node.auto_mine.read().enabled;
    let peers = node.peers.read().clone();

    Ok(warp::reply::json(&StatusResponse {
        length,
        tip_hash,
        mempool_size,
        auto_mine: auto_mine_enabled,
        peers,
    }))
}

async fn peers(node: NodeHandle) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&PeersResponse { peers: node.peers.read().clone() }))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.find::<warp::body::BodyDeserializeError>().is_some() {
        Ok(warp::reply::with_status(
            warp::reply::json(&MineErrorResponse { error: "malformed request body".to_string() }),
            StatusCode::BAD_REQUEST,
        ))
    } else if err.is_not_found() {
        Ok(warp::reply::with_status(
            warp::reply::json(&MineErrorResponse { error: "not found".to_string() }),
            StatusCode::NOT_FOUND,
        ))
    } else {
        log::error!("unhandled rejection: {:?}", err);
        Ok(warp::reply::with_status(
            warp::reply::json(&MineErrorResponse { error: "internal error".to_string() }),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    }
}

/// Builds and serves the node's HTTP surface until `node.shutdown` is set.
pub async fn run(node: NodeHandle, bind_addr: std::net::SocketAddr) {
    let node_filter = with_node(node.clone());

    let get_chain_route = warp::path!("get_chain")
        .and(warp::get())
        .and(node_filter.clone())
        .and_then(get_chain);

    let add_transaction_route = warp::path!("add_transaction")
        .and(warp::post())
        .and(node_filter.clone())
        .and(warp::body::json())
        .and_then(add_transaction);

    let mine_route = warp::path!("mine")
        .and(warp::post())
        .and(node_filter.clone())
        .and(warp::body::json())
        .and_then(mine);

    let receive_block_route = warp::path!("receive_block")
        .and(warp::post())
        .and(node_filter.clone())
        .and(warp::body::json())
        .and_then(receive_block);

    let auto_mine_route = warp::path!("auto_mine")
        .and(warp::post())
        .and(node_filter.clone())
        .and(warp::body::json())
        .and_then(auto_mine);

    let status_route = warp::path!("status")
        .and(warp::get())
        .and(node_filter.clone())
        .and_then(status);

    let peers_route = warp::path!("peers")
        .and(warp::get())
        .and(node_filter.clone())
        .and_then(peers);

    let routes = get_chain_route
        .or(add_transaction_route)
        .or(mine_route)
        .or(receive_block_route)
        .or(auto_mine_route)
        .or(status_route)
        .or(peers_route)
        .recover(handle_rejection)
        .with(warp::log("storychain::http"));

    let shutdown = node.shutdown.clone();
    let (_addr, serving) = warp::serve(routes).bind_with_graceful_shutdown(bind_addr, async move {
        while !shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    });

    serving.await;
}
