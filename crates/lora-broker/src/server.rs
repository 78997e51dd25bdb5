// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport for routers and handlers.
//!
//! One task per connection. The first frame selects the role:
//!
//! - Routers (`associate`) stream uplinks in and receive downlinks.
//!   Every uplink is handled on its own task, since the copy that opens a
//!   deduplication window is suspended until the window closes.
//! - Handlers (`subscribe`) receive deduplicated uplinks and may publish
//!   downlinks, each answered with `ack` or `error`.

use crate::broker::Broker;
use crate::message::{DeduplicatedUplink, DownlinkMessage};
use crate::registry::Registration;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod protocol;

pub use connection::{ConnectionError, FrameReader, FrameWriter};
pub use protocol::WireMessage;

/// Inbound frames buffered between the reader task and the session loop.
const INBOUND_CAPACITY: usize = 64;

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Broker server.
#[derive(Clone)]
pub struct BrokerServer {
    broker: Arc<Broker>,
    max_message_size: usize,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl BrokerServer {
    pub fn new(broker: Arc<Broker>, max_message_size: usize) -> Self {
        Self {
            broker,
            max_message_size,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        info!("Broker listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("New connection from {}", peer_addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Signal the server and all sessions to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    async fn handle_connection<S>(&self, stream: S, peer_addr: SocketAddr) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = connection::split(stream, self.max_message_size);

        let hello = match reader.read_message().await? {
            Some(msg) => msg,
            None => return Ok(()),
        };

        match hello {
            WireMessage::Associate { router_id } if !router_id.is_empty() => {
                let mut registration = self.broker.register_router(&router_id);
                let result = self
                    .router_session(&mut registration, reader, &mut writer, peer_addr)
                    .await;
                self.broker.unregister_router(&registration);
                result
            }
            WireMessage::Subscribe { handler_id } if !handler_id.is_empty() => {
                let mut registration = self.broker.register_handler(&handler_id);
                let result = self
                    .handler_session(&mut registration, reader, &mut writer, peer_addr)
                    .await;
                self.broker.unregister_handler(&registration);
                result
            }
            other => {
                writer
                    .send_message(&WireMessage::error(
                        protocol::ERR_HANDSHAKE,
                        "expected associate or subscribe with a non-empty id",
                    ))
                    .await?;
                Err(ServerError::Protocol(format!(
                    "Invalid handshake ({}) from {}",
                    other.kind(),
                    peer_addr
                )))
            }
        }
    }

    async fn router_session<R, W>(
        &self,
        registration: &mut Registration<DownlinkMessage>,
        reader: FrameReader<R>,
        writer: &mut FrameWriter<W>,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let router_id = registration.identity().to_string();
        writer.send_message(&WireMessage::Ack).await?;
        info!("Router {} associated from {}", router_id, peer_addr);

        let mut inbound = spawn_reader(reader, peer_addr);
        loop {
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(WireMessage::Uplink(uplink)) => {
                        let broker = self.broker.clone();
                        let router_id = router_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = broker.handle_uplink(uplink).await {
                                debug!("Uplink via router {} not forwarded: {}", router_id, e);
                            }
                        });
                    }
                    Some(other) => {
                        writer
                            .send_message(&WireMessage::error(
                                protocol::ERR_UNEXPECTED,
                                format!("unexpected {} from router", other.kind()),
                            ))
                            .await?;
                    }
                    None => break,
                },
                downlink = registration.recv() => match downlink {
                    Some(downlink) => {
                        writer.send_message(&WireMessage::Downlink(downlink)).await?;
                    }
                    None => {
                        info!("Router {} superseded by a newer connection", router_id);
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    debug!("Router session {} shutting down", router_id);
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handler_session<R, W>(
        &self,
        registration: &mut Registration<DeduplicatedUplink>,
        reader: FrameReader<R>,
        writer: &mut FrameWriter<W>,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let handler_id = registration.identity().to_string();
        writer.send_message(&WireMessage::Ack).await?;
        info!("Handler {} subscribed from {}", handler_id, peer_addr);

        let mut inbound = spawn_reader(reader, peer_addr);
        loop {
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(WireMessage::Downlink(downlink)) => {
                        let reply = match self.broker.dispatch_downlink(downlink).await {
                            Ok(()) => WireMessage::Ack,
                            Err(e) => WireMessage::from_dispatch_error(&e),
                        };
                        writer.send_message(&reply).await?;
                    }
                    Some(other) => {
                        writer
                            .send_message(&WireMessage::error(
                                protocol::ERR_UNEXPECTED,
                                format!("unexpected {} from handler", other.kind()),
                            ))
                            .await?;
                    }
                    None => break,
                },
                uplink = registration.recv() => match uplink {
                    Some(uplink) => {
                        writer
                            .send_message(&WireMessage::DeduplicatedUplink(uplink))
                            .await?;
                    }
                    None => {
                        info!("Handler {} superseded by a newer connection", handler_id);
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    debug!("Handler session {} shutting down", handler_id);
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Read frames on a dedicated task and hand them over through a channel.
fn spawn_reader<R>(mut reader: FrameReader<R>, peer_addr: SocketAddr) -> mpsc::Receiver<WireMessage>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    tokio::spawn(async move {
        loop {
            match reader.read_message().await {
                Ok(Some(msg)) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Connection closed: {}", peer_addr);
                    break;
                }
                Err(e) => {
                    warn!("Read error from {}: {}", peer_addr, e);
                    break;
                }
            }
        }
    });
    rx
}
