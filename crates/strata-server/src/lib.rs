//! Strata Server - HTTP Surface and Cluster Coordination
//!
//! The replica process around the replication core: axum request handlers
//! for the /kvs, /view, /shard and /sync endpoints, the replication
//! broadcaster with its per-destination retry queues, the heartbeat failure
//! detector, anti-entropy bootstrap, and reshard coordination.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod broadcast;
pub mod handlers;
pub mod heartbeat;
pub mod router;
pub mod state;
pub mod sync;

pub use broadcast::{Broadcaster, Outbound};
pub use router::create_router;
pub use state::AppState;
pub use sync::SyncPayload;
