//! Event system for claim operations
//!
//! Provides an event bus for notifying listeners about claim lifecycle
//! changes. Useful for:
//! - Audit logging
//! - Notification delivery
//! - Admin timeline refresh

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::db::ClaimStatus;

/// Events emitted by the claim services after successful commits
#[derive(Debug, Clone)]
pub enum ClaimEvent {
    ClaimSubmitted {
        id: String,
        claim_number: String,
        tenant_id: String,
    },
    ClaimDrafted {
        id: String,
        tenant_id: String,
    },
    ClaimTransitioned {
        id: String,
        from: ClaimStatus,
        to: ClaimStatus,
        tenant_id: String,
    },
    ClaimNumberBackfilled {
        id: String,
        claim_number: String,
        tenant_id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &ClaimEvent);
}

/// Event bus for broadcasting claim events
pub struct EventBus {
    sender: broadcast::Sender<ClaimEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ClaimEvent) {
        trace!(event = ?event, "Emitting claim event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &ClaimEvent) {
        match event {
            ClaimEvent::ClaimSubmitted {
                id,
                claim_number,
                tenant_id,
            } => {
                debug!(id = %id, claim_number = %claim_number, tenant = %tenant_id, "Claim submitted");
            }
            ClaimEvent::ClaimTransitioned {
                id, from, to, tenant_id, ..
            } => {
                debug!(id = %id, from = %from, to = %to, tenant = %tenant_id, "Claim transitioned");
            }
            ClaimEvent::ClaimNumberBackfilled {
                id, claim_number, ..
            } => {
                debug!(id = %id, claim_number = %claim_number, "Claim number backfilled");
            }
            _ => {
                trace!(event = ?event, "Claim event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
