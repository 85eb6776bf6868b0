//! Live client connections attached to one agent

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::WsMessage;

/// Receiving half handed to the transport (e.g. a WebSocket task)
pub struct Connection {
    pub id: String,
    pub receiver: mpsc::UnboundedReceiver<WsMessage>,
}

/// Fan-out table of attached connections
#[derive(Default)]
pub struct ConnectionHub {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<WsMessage>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> Connection {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id.clone(), tx);
        debug!("Attached connection {}", id);
        Connection { id, receiver: rx }
    }

    /// Returns false if the connection was not attached
    pub fn detach(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn send(&self, id: &str, message: WsMessage) -> bool {
        match self.lock().get(id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Deliver to every connection; returns ids whose receiver is gone.
    /// A dead connection never stops delivery to the rest.
    pub fn broadcast(&self, message: &WsMessage) -> Vec<String> {
        let senders = self.lock();
        senders
            .iter()
            .filter(|(_, tx)| tx.send(message.clone()).is_err())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every sender; receivers observe end-of-stream
    pub fn close_all(&self) -> usize {
        let mut senders = self.lock();
        let count = senders.len();
        senders.clear();
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<WsMessage>>> {
        self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WsMessageType;
    use serde_json::json;

    fn msg() -> WsMessage {
        WsMessage::new(WsMessageType::DataUpdate, "a1", json!({"x": 1}))
    }

    #[test]
    fn test_broadcast_skips_dead_connections() {
        let hub = ConnectionHub::new();
        let mut alive = hub.attach();
        let dead = hub.attach();
        let dead_id = dead.id.clone();
        drop(dead.receiver);

        let failed = hub.broadcast(&msg());
        assert_eq!(failed, vec![dead_id]);
        assert!(alive.receiver.try_recv().is_ok());
    }

    #[test]
    fn test_send_and_detach() {
        let hub = ConnectionHub::new();
        let mut conn = hub.attach();
        assert!(hub.send(&conn.id, msg()));
        assert!(conn.receiver.try_recv().is_ok());

        assert!(hub.detach(&conn.id));
        assert!(!hub.detach(&conn.id));
        assert!(!hub.send(&conn.id, msg()));
    }
}
