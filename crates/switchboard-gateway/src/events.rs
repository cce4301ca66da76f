//! Event bus: fan events out to connected WebSocket clients

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::protocol::GatewayEvent;

/// Broadcast event bus for the gateway
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GatewayEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Each WebSocket connection gets its own receiver
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn broadcast(&self, event: GatewayEvent) {
        let receivers = self.sender.receiver_count();
        if receivers > 0 {
            debug!(
                "Broadcasting event '{}' to {} receivers",
                event.event, receivers
            );
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Conversations a single connection has joined
#[derive(Clone, Default)]
pub struct Rooms {
    joined: Arc<RwLock<HashSet<String>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already in the room
    pub async fn join(&self, conversation_id: &str) -> bool {
        self.joined.write().await.insert(conversation_id.to_string())
    }

    pub async fn contains(&self, conversation_id: &str) -> bool {
        self.joined.read().await.contains(conversation_id)
    }

    /// Whether `event` should be delivered to this connection
    pub async fn accepts(&self, event: &GatewayEvent) -> bool {
        match &event.conversation_id {
            None => true,
            Some(id) => self.contains(id).await,
        }
    }
}
