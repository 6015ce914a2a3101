//! One connected client and its serialized writer

use std::sync::OnceLock;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::codec::{CodecError, Packet};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to write packet to session {session_id}: {source}")]
    Write {
        session_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// Server-side record of one connection for its whole lifetime.
///
/// The writer sits behind an async mutex so at most one packet is being
/// written to the connection at a time; different sessions write in
/// parallel.
pub struct Session {
    id: OnceLock<String>,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl Session {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            id: OnceLock::new(),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// A session that already carries its identifier
    pub fn with_id(id: impl Into<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let session = Self::new(writer);
        session.assign_id(id.into());
        session
    }

    /// Adopt the client identifier from the CONNECT packet. Later calls are
    /// ignored; the first identifier wins.
    pub fn assign_id(&self, id: String) {
        let _ = self.id.set(id);
    }

    /// The client identifier; empty until CONNECT has been processed
    pub fn id(&self) -> &str {
        self.id.get().map(String::as_str).unwrap_or("")
    }

    /// Serialize and write a packet, atomically with respect to other
    /// publishes on this session
    pub async fn publish(&self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = packet.encode()?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|source| SessionError::Write {
                session_id: self.id().to_string(),
                source,
            })?;
        writer.flush().await.map_err(|source| SessionError::Write {
            session_id: self.id().to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id()).finish()
    }
}
