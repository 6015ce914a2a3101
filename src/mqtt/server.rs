//! MQTT protocol front-end: accept loop, per-connection readers, dispatch

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{
    read_packet, CodecError, ConnackPacket, ConnectPacket, Packet, PublishPacket, SubackPacket,
    SubscribePacket,
};
use super::session::Session;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind mqtt listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server shutdown timed out")]
    ShutdownTimedOut,
}

/// Lifecycle callbacks the controller implements. A hook returning an error
/// drops the offending packet but keeps the connection open; protocol-level
/// errors are what close connections.
pub trait Hooks: Send + Sync + 'static {
    fn on_connected(
        &self,
        session: &Arc<Session>,
        packet: &ConnectPacket,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn on_subscribed(
        &self,
        session: &Arc<Session>,
        packet: &SubscribePacket,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn on_published(
        &self,
        session: &Arc<Session>,
        packet: &PublishPacket,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn on_disconnected(&self, session: &Arc<Session>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// TCP server speaking the MQTT subset
pub struct MqttServer<H: Hooks> {
    listener: TcpListener,
    hooks: Arc<H>,
}

impl<H: Hooks> MqttServer<H> {
    pub async fn bind(addr: SocketAddr, hooks: Arc<H>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        Ok(Self { listener, hooks })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop and return a handle for graceful shutdown
    pub fn start(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Waitgroup: every connection task holds a sender clone; the
        // receiver drains to None once all of them are gone.
        let (done_tx, done_rx) = mpsc::channel::<()>(1);

        let accept_task = tokio::spawn(accept_loop(
            self.listener,
            self.hooks,
            shutdown_rx,
            done_tx,
        ));

        ServerHandle {
            shutdown: shutdown_tx,
            accept_task,
            done_rx,
        }
    }
}

/// Handle to a running server
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl ServerHandle {
    /// Stop accepting, close every connection, and wait for the reader
    /// tasks to finish. On expiry control returns with `ShutdownTimedOut`
    /// while stragglers keep closing in the background.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), ServerError> {
        info!("shutting down mqtt server");
        let _ = self.shutdown.send(true);

        let drained = tokio::time::timeout(timeout, async {
            let _ = (&mut self.accept_task).await;
            while self.done_rx.recv().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                info!("mqtt server shutdown complete");
                Ok(())
            }
            Err(_) => Err(ServerError::ShutdownTimedOut),
        }
    }
}

async fn accept_loop<H: Hooks>(
    listener: TcpListener,
    hooks: Arc<H>,
    shutdown: watch::Receiver<bool>,
    done: mpsc::Sender<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mqtt server listening");
    }

    let mut shutdown_accept = shutdown.clone();
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown_accept.changed() => break,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "client connected");
                let hooks = hooks.clone();
                let shutdown = shutdown.clone();
                let guard = done.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, hooks, shutdown).await;
                    drop(guard);
                });
            }
            Err(err) => {
                error!(error = %err, "failed to accept connection");
                break;
            }
        }
    }
}

/// Why the read loop ended
enum Teardown {
    /// Client hung up or misbehaved; run the disconnect path
    Disconnect,
    /// Server shutdown owns the closing; hooks are suppressed
    Shutdown,
}

async fn handle_connection<H: Hooks>(
    stream: TcpStream,
    peer: SocketAddr,
    hooks: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let session = Arc::new(Session::new(write_half));
    let mut connected = false;

    let teardown = loop {
        let result = tokio::select! {
            result = read_packet(&mut reader) => result,
            _ = shutdown.changed() => break Teardown::Shutdown,
        };

        let packet = match result {
            Ok(packet) => packet,
            Err(CodecError::ConnectionClosed) => {
                if *shutdown.borrow() {
                    break Teardown::Shutdown;
                }
                debug!(%peer, "client disconnected");
                break Teardown::Disconnect;
            }
            Err(err) => {
                if *shutdown.borrow() {
                    break Teardown::Shutdown;
                }
                error!(%peer, error = %err, "failed to read packet");
                break Teardown::Disconnect;
            }
        };

        match packet {
            Packet::Connect(connect) => {
                if connect.client_id.is_empty() {
                    error!(%peer, "CONNECT without client identifier");
                    break Teardown::Disconnect;
                }
                if connected {
                    error!(%peer, "second CONNECT on one connection");
                    break Teardown::Disconnect;
                }

                session.assign_id(connect.client_id.clone());
                let connack = Packet::Connack(ConnackPacket {
                    session_present: false,
                    return_code: 0,
                });
                if let Err(err) = session.publish(&connack).await {
                    error!(%peer, error = %err, "failed to write CONNACK");
                    break Teardown::Disconnect;
                }
                connected = true;

                if let Err(err) = hooks.on_connected(&session, &connect).await {
                    warn!(session_id = %session.id(), error = %err, "connect hook failed");
                }
            }
            Packet::Subscribe(subscribe) => {
                if !connected {
                    error!(%peer, "SUBSCRIBE before CONNECT");
                    break Teardown::Disconnect;
                }

                // Everything is granted at QoS 0
                let suback = Packet::Suback(SubackPacket {
                    packet_id: subscribe.packet_id,
                    return_codes: vec![0; subscribe.topics.len()],
                });
                if let Err(err) = session.publish(&suback).await {
                    error!(session_id = %session.id(), error = %err, "failed to write SUBACK");
                    break Teardown::Disconnect;
                }

                if let Err(err) = hooks.on_subscribed(&session, &subscribe).await {
                    warn!(session_id = %session.id(), error = %err, "subscribe hook failed");
                }
            }
            Packet::Publish(publish) => {
                if !connected {
                    error!(%peer, "PUBLISH before CONNECT");
                    break Teardown::Disconnect;
                }
                if let Err(err) = hooks.on_published(&session, &publish).await {
                    warn!(
                        session_id = %session.id(),
                        topic = %publish.topic,
                        error = %err,
                        "dropping publish packet"
                    );
                }
            }
            Packet::Pingreq => {
                if let Err(err) = session.publish(&Packet::Pingresp).await {
                    error!(%peer, error = %err, "failed to write PINGRESP");
                    break Teardown::Disconnect;
                }
            }
            Packet::Disconnect => {
                debug!(session_id = %session.id(), "client sent DISCONNECT");
                break Teardown::Disconnect;
            }
            other => {
                debug!(%peer, packet = ?other, "ignoring unexpected packet");
            }
        }
    };

    match teardown {
        Teardown::Shutdown => {}
        Teardown::Disconnect => {
            if connected {
                if let Err(err) = hooks.on_disconnected(&session).await {
                    error!(session_id = %session.id(), error = %err, "disconnect hook failed");
                }
            }
        }
    }
}
