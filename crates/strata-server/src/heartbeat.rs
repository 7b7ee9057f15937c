//! Strata Heartbeat Failure Detector
//!
//! Once per second every peer in the view is probed with `GET /view`. A
//! single failed probe (error, non-success status, or 5 s timeout) evicts
//! the peer: it is removed from the local view and every shard member list,
//! and the eviction is gossiped as `DELETE /view` to the remaining replicas.
//! A falsely evicted node rejoins through its own startup announcement.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::broadcast::Outbound;
use crate::state::AppState;
use reqwest::Method;
use std::time::Duration;

/// Interval between probe rounds.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Per-probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the heartbeat loop forever.
pub async fn run(state: AppState) {
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(PROBE_INTERVAL);
    // The first tick fires immediately; skip it so freshly started peers get
    // a chance to come up.
    interval.tick().await;

    loop {
        interval.tick().await;
        probe_round(&state, &client).await;
    }
}

/// Probe every peer in a snapshot of the view once.
async fn probe_round(state: &AppState, client: &reqwest::Client) {
    for peer in state.view.peers() {
        let url = format!("http://{}/view", peer);
        let alive = match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };

        if !alive {
            tracing::warn!(replica = %peer, "replica failed liveness probe, removing from view");
            state.remove_replica(&peer);

            let body = serde_json::json!({ "socket-address": peer.as_str() });
            state
                .broadcaster
                .broadcast(Outbound::new(Method::DELETE, "view", body), &state.view.snapshot());
        }
    }
}
