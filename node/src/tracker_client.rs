use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::NodeHandle;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct AddressRequest<'a> {
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct PeersResponse {
    peers: Vec<String>,
}

/// Registers (or re-registers) this node with the tracker and updates the
/// local peer cache from the response (§4.1 register/heartbeat both return
/// the current peer list).
async fn call_and_cache_peers(node: &NodeHandle, path: &str) -> anyhow::Result<()> {
    let Some(tracker_url) = node.tracker_url.as_ref() else { return Ok(()) };
    let client = reqwest::Client::new();
    let url = format!("{}/{}", tracker_url.trim_end_matches('/'), path);

    let response = client
        .post(&url)
        .timeout(TRACKER_TIMEOUT)
        .json(&AddressRequest { address: &node.address() })
        .send()
        .await?;

    let parsed: PeersResponse = response.json().await?;
    let mut peers = node.peers.write();
    *peers = parsed.peers.into_iter().filter(|p| p != &node.address()).collect();
    Ok(())
}

/// §4.2 lifecycle step 2: register with retry. Does not abort on failure —
/// the caller decides how many attempts to make before giving up and
/// continuing anyway (failures are retried again on the next sync tick).
pub async fn register(node: &NodeHandle) -> anyhow::Result<()> {
    call_and_cache_peers(node, "register").await
}

/// Same wire contract as `register`, called on each sync tick (§4.1).
pub async fn refresh_peers(node: &NodeHandle) {
    if let Err(err) = call_and_cache_peers(node, "heartbeat").await {
        log::warn!("tracker unreachable, continuing on cached peers: {}", err);
    }
}

/// Best-effort unregister on shutdown (§4.2 step 5). Failures are logged
/// and ignored — the tracker's TTL purge will clean up regardless.
pub async fn unregister(node: &NodeHandle) {
    let Some(tracker_url) = node.tracker_url.as_ref() else { return };
    let client = reqwest::Client::new();
    let url = format!("{}/unregister", tracker_url.trim_end_matches('/'));

    let result = client
        .post(&url)
        .timeout(TRACKER_TIMEOUT)
        .json(&AddressRequest { address: &node.address() })
        .send()
        .await;

    if let Err(err) = result {
        log::warn!("failed to unregister from tracker (best-effort): {}", err);
    }
}
