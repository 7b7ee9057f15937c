//! Strata Replication Broadcaster
//!
//! Outbound replication traffic. Each destination gets its own ordered queue
//! and worker task, which gives FIFO per (sender, destination): a message is
//! retried until the peer accepts it before the next one is attempted. A 503
//! reply means the peer cannot deliver the message yet, so the worker sleeps
//! and retries; a transport error is terminal for that message and the
//! heartbeat eventually evicts the peer. Retrying stops as soon as the
//! destination leaves the view, and shutdown drains the outstanding queues.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_common::{ReplicaId, Result, StrataError};
use strata_replication::ViewManager;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-attempt timeout for outbound requests.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Backoff between retries of a not-yet-deliverable message.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Outbound Message
// =============================================================================

/// A request to replay against peer replicas.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub method: Method,
    pub endpoint: String,
    pub body: serde_json::Value,
}

impl Outbound {
    pub fn new(method: Method, endpoint: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body,
        }
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Fans mutations out to peers through per-destination retry queues.
pub struct Broadcaster {
    self_id: ReplicaId,
    view: Arc<ViewManager>,
    client: reqwest::Client,
    workers: Mutex<HashMap<ReplicaId, mpsc::UnboundedSender<Outbound>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Broadcaster {
    pub fn new(self_id: ReplicaId, view: Arc<ViewManager>) -> Self {
        Self {
            self_id,
            view,
            client: reqwest::Client::new(),
            workers: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue a message for every target except self. Delivery is
    /// asynchronous; ordering is guaranteed only per destination.
    pub fn broadcast(&self, message: Outbound, targets: &[ReplicaId]) {
        for target in targets {
            if target == &self.self_id {
                continue;
            }
            self.enqueue(target.clone(), message.clone());
        }
    }

    fn enqueue(&self, dest: ReplicaId, message: Outbound) {
        let mut workers = self.workers.lock();
        if let Some(sender) = workers.get(&dest) {
            if sender.send(message.clone()).is_ok() {
                return;
            }
            // The worker exited (destination was evicted); replace it so a
            // rejoined replica gets a fresh queue.
            workers.remove(&dest);
        }
        let sender = self.spawn_worker(dest.clone());
        let _ = sender.send(message);
        workers.insert(dest, sender);
    }

    fn spawn_worker(&self, dest: ReplicaId) -> mpsc::UnboundedSender<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            dest,
            client: self.client.clone(),
            view: Arc::clone(&self.view),
        };
        let handle = tokio::spawn(worker.run(rx));
        self.handles.lock().push(handle);
        tx
    }

    /// Drop the queue for a destination that left the view.
    pub fn retire(&self, dest: &ReplicaId) {
        self.workers.lock().remove(dest);
    }

    /// Close all queues and wait for workers to finish their current
    /// messages.
    pub async fn drain(&self) {
        self.workers.lock().clear();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Try each candidate in turn and return the first successful response.
    pub async fn send_to_any(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        candidates: &[ReplicaId],
    ) -> Result<(StatusCode, Vec<u8>)> {
        for candidate in candidates {
            if candidate == &self.self_id {
                continue;
            }
            let url = format!("http://{}/{}", candidate, endpoint);
            let mut request = self
                .client
                .request(method.clone(), &url)
                .timeout(ATTEMPT_TIMEOUT);
            if let Some(body) = body {
                request = request.json(body);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let status = response.status();
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| StrataError::Transport(e.to_string()))?;
                    return Ok((status, bytes.to_vec()));
                }
                Ok(response) => {
                    tracing::debug!(
                        replica = %candidate,
                        status = %response.status(),
                        "candidate answered with non-success status"
                    );
                }
                Err(err) => {
                    tracing::debug!(replica = %candidate, error = %err, "candidate unreachable");
                }
            }
        }
        Err(StrataError::NoNodeReachable)
    }

    /// Forward a client request verbatim to the owning shard and hand back
    /// the peer's status and body for relaying.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        target: &ReplicaId,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let url = format!("http://{}/{}", target, path);
        let response = self
            .client
            .request(method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(ATTEMPT_TIMEOUT)
            .send()
            .await
            .map_err(|_| StrataError::NoNodeReachable)?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StrataError::Transport(e.to_string()))?;
        Ok((status, bytes.to_vec()))
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Per-destination delivery loop.
struct Worker {
    dest: ReplicaId,
    client: reqwest::Client,
    view: Arc<ViewManager>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        while let Some(message) = rx.recv().await {
            if !self.deliver(message).await {
                break;
            }
        }
    }

    /// Deliver one message, retrying while the peer answers 503. Returns
    /// false once the destination is no longer in the view.
    async fn deliver(&self, message: Outbound) -> bool {
        loop {
            if !self.view.contains(&self.dest) {
                tracing::debug!(
                    replica = %self.dest,
                    endpoint = %message.endpoint,
                    "destination left the view, dropping replication queue"
                );
                return false;
            }

            let url = format!("http://{}/{}", self.dest, message.endpoint);
            let result = self
                .client
                .request(message.method.clone(), &url)
                .json(&message.body)
                .timeout(ATTEMPT_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Ok(_) => return true,
                Err(err) => {
                    tracing::debug!(
                        replica = %self.dest,
                        endpoint = %message.endpoint,
                        error = %err,
                        "dropping message after transport error"
                    );
                    return true;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> Broadcaster {
        let self_id = ReplicaId::new("n0:1");
        let view = Arc::new(ViewManager::new(
            self_id.clone(),
            vec![self_id.clone(), ReplicaId::new("n1:1")],
        ));
        Broadcaster::new(self_id, view)
    }

    #[tokio::test]
    async fn test_broadcast_skips_self() {
        let broadcaster = broadcaster();
        let message = Outbound::new(Method::PUT, "view", serde_json::json!({}));

        broadcaster.broadcast(message, &[ReplicaId::new("n0:1")]);
        assert!(broadcaster.workers.lock().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_spawns_one_worker_per_destination() {
        let broadcaster = broadcaster();
        let message = Outbound::new(Method::PUT, "view", serde_json::json!({}));
        let targets = [ReplicaId::new("n1:1"), ReplicaId::new("n1:1")];

        broadcaster.broadcast(message.clone(), &targets);
        broadcaster.broadcast(message, &targets);
        assert_eq!(broadcaster.workers.lock().len(), 1);

        broadcaster.retire(&ReplicaId::new("n1:1"));
        assert!(broadcaster.workers.lock().is_empty());
        broadcaster.drain().await;
    }

    #[tokio::test]
    async fn test_send_to_any_exhausted() {
        let broadcaster = broadcaster();
        // Only self as candidate: nothing to try.
        let err = broadcaster
            .send_to_any(Method::GET, "view", None, &[ReplicaId::new("n0:1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::NoNodeReachable));
    }
}
