use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::Parser;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// A story-chain tracker: a stateless directory of live node addresses (§4.1).
#[derive(Parser, Debug)]
#[command(name = "tracker", version, about)]
struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP server on.
    #[arg(long, default_value_t = 8500)]
    port: u16,

    /// Seconds a registered node may go without a heartbeat before it is
    /// considered dead and purged.
    #[arg(long, default_value_t = 30)]
    ttl: u64,
}

/// The peer directory: node address -> unix-seconds of its last heartbeat.
/// The tracker holds no chain state of any kind (§2, §4.1).
#[derive(Clone)]
struct AppState {
    nodes: Arc<RwLock<HashMap<String, i64>>>,
    ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
struct AddressRequest {
    address: String,
}

#[derive(Debug, Serialize)]
struct PeersResponse {
    peers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl AppState {
    fn new(ttl_secs: u64) -> Self {
        Self { nodes: Arc::new(RwLock::new(HashMap::new())), ttl_secs: ttl_secs as i64 }
    }

    /// Removes entries whose last heartbeat is older than the liveness TTL.
    /// Called opportunistically on every read (§4.1 "Purge expired entries
    /// opportunistically").
    fn purge_expired(&self) {
        let now = now_unix();
        let ttl = self.ttl_secs;
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|_, last_seen| now - *last_seen < ttl);
        let removed = before - nodes.len();
        if removed > 0 {
            info!(removed, "purged expired nodes from the directory");
        }
    }

    /// Inserts or refreshes `address` with the current timestamp. Shared by
    /// `register` and `heartbeat`, which are the same operation under §4.1
    /// ("If address unknown, treat as register").
    fn touch(&self, address: &str) {
        self.nodes.write().insert(address.to_string(), now_unix());
    }

    /// The live peer list, excluding `exclude` (the calling node itself, per
    /// §4.1's "excluding the caller, optional convenience").
    fn live_peers_excluding(&self, exclude: &str) -> Vec<String> {
        self.purge_expired();
        self.nodes.read().keys().filter(|addr| addr.as_str() != exclude).cloned().collect()
    }
}

/// `register(address)` — §4.1. Idempotent; returns the current peer list.
async fn register(State(state): State<AppState>, Json(req): Json<AddressRequest>) -> impl IntoResponse {
    state.touch(&req.address);
    info!(address = %req.address, "node registered");
    Json(PeersResponse { peers: state.live_peers_excluding(&req.address) })
}

/// `heartbeat(address)` — §4.1. Identical wire contract to `register`; kept
/// as a distinct route only for log-message clarity.
async fn heartbeat(State(state): State<AppState>, Json(req): Json<AddressRequest>) -> impl IntoResponse {
    state.touch(&req.address);
    info!(address = %req.address, "node heartbeat");
    Json(PeersResponse { peers: state.live_peers_excluding(&req.address) })
}

/// `peers()` — §4.1. Returns every address whose heartbeat is within TTL.
async fn peers(State(state): State<AppState>) -> impl IntoResponse {
    Json(PeersResponse { peers: state.live_peers_excluding("") })
}

/// `unregister(address)` — §4.1. Best-effort; always reports success even if
/// the address was already absent.
async fn unregister(State(state): State<AppState>, Json(req): Json<AddressRequest>) -> impl IntoResponse {
    state.nodes.write().remove(&req.address);
    info!(address = %req.address, "node unregistered");
    StatusCode::OK
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: "malformed request".to_string() }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse().unwrap_or_else(|err| {
        eprintln!("invalid --host/--port combination: {}", err);
        std::process::exit(2);
    });

    info!(host = %args.host, port = args.port, ttl = args.ttl, "starting tracker");

    let state = AppState::new(args.ttl);

    // Passive TTL sweep so long-idle directories don't grow unbounded between
    // reads; registrations are still purged opportunistically on every
    // register/heartbeat/peers call regardless of this timer (§4.1).
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(args.ttl.max(1)));
        loop {
            interval.tick().await;
            sweep_state.purge_expired();
        }
    });

    let app = Router::new()
        .route("/register", post(register))
        .route("/heartbeat", post(heartbeat))
        .route("/peers", get(peers))
        .route("/unregister", post(unregister))
        .fallback(fallback)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(%bind_addr, %err, "failed to bind tracker listening port");
            std::process::exit(1);
        }
    };

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_live_peers_contains_address() {
        let state = AppState::new(30);
        state.touch("127.0.0.1:5501");
        let peers = state.live_peers_excluding("");
        assert_eq!(peers, vec!["127.0.0.1:5501".to_string()]);
    }

    #[test]
    fn register_excludes_the_caller() {
        let state = AppState::new(30);
        state.touch("127.0.0.1:5501");
        state.touch("127.0.0.1:5502");
        let peers = state.live_peers_excluding("127.0.0.1:5501");
        assert_eq!(peers, vec!["127.0.0.1:5502".to_string()]);
    }

    #[test]
    fn touch_is_idempotent() {
        let state = AppState::new(30);
        state.touch("127.0.0.1:5501");
        state.touch("127.0.0.1:5501");
        assert_eq!(state.nodes.read().len(), 1);
    }

    #[test]
    fn purge_expired_removes_stale_entries() {
        let state = AppState::new(30);
        state.nodes.write().insert("stale:1".to_string(), now_unix() - 120);
        state.nodes.write().insert("fresh:1".to_string(), now_unix());
        state.purge_expired();
        let nodes = state.nodes.read();
        assert!(!nodes.contains_key("stale:1"));
        assert!(nodes.contains_key("fresh:1"));
    }

    #[test]
    fn unregister_removes_entry() {
        let state = AppState::new(30);
        state.touch("127.0.0.1:5501");
        state.nodes.write().remove("127.0.0.1:5501");
        assert!(state.nodes.read().is_empty());
    }
}
