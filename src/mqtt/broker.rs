//! Session registry and publish fanout

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::error;

use super::codec::{Packet, PublishPacket};
use super::session::{Session, SessionError};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("broadcast failed for {} session(s)", failures.len())]
    Broadcast { failures: Vec<SessionError> },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Registry of connected sessions.
///
/// Broadcast holds the read lock for its whole run so it sees a consistent
/// session set; add/remove may wait briefly behind a broadcast.
#[derive(Default)]
pub struct Broker {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session: Arc<Session>) {
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session);
    }

    pub async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Publish to every registered session. Per-session failures are logged
    /// and aggregated; they never abort delivery to the remaining sessions.
    pub async fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let packet = Packet::Publish(PublishPacket::qos0(topic, payload));

        let sessions = self.sessions.read().await;
        let mut failures = Vec::new();
        for session in sessions.values() {
            if let Err(err) = session.publish(&packet).await {
                error!(session_id = %session.id(), error = %err, "failed to publish to session");
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::Broadcast { failures })
        }
    }

    /// Publish to a single session
    pub async fn send(
        &self,
        session_id: &str,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(session_id.to_string()))?;

        let packet = Packet::Publish(PublishPacket::qos0(topic, payload));
        session.publish(&packet).await?;
        Ok(())
    }
}
