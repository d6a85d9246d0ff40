/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! A network of transports connected over TCP.

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::common::{CourierConfig, CONFIG};
use crate::message::{Frame, SendError, TransportError};
use crate::net::wire::{self, WireError};
use crate::traits::{Capabilities, FrameSink, Network};

/// Outbound queue of one peer connection, carrying encoded frames.
type Outbound = mpsc::Sender<Vec<u8>>;

/// Moves frames between transports over TCP.
///
/// The network listens on one socket; its address (`host:port`) is the transport tag
/// of every identity its transport allocates. Frames to a peer travel over a single
/// outbound connection opened on first use, so frames from this network to one peer
/// arrive in send order. Responses go to the caller's listening address, not back
/// over the connection the request came in on.
#[derive(Debug)]
pub struct TcpNetwork {
    address: String,
    local_addr: SocketAddr,
    listener: std::sync::Mutex<Option<TcpListener>>,
    peers: Arc<DashMap<String, Outbound>>,
    connecting: Mutex<()>,
    config: CourierConfig,
    shutdown: CancellationToken,
}

impl TcpNetwork {
    /// Binds a listening socket at `addr` using the global [`CONFIG`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the socket cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        Self::bind_with_config(addr, CONFIG.clone()).await
    }

    /// Binds a listening socket at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the socket cannot be bound.
    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        config: CourierConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Network(format!("failed to bind: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Network(format!("failed to read local address: {e}")))?;
        info!(%local_addr, "TCP network bound");

        Ok(Self {
            address: local_addr.to_string(),
            local_addr,
            listener: std::sync::Mutex::new(Some(listener)),
            peers: Arc::new(DashMap::new()),
            connecting: Mutex::new(()),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Uses `address` instead of the bound socket address as this network's address,
    /// for example a routable host name when bound to `0.0.0.0`.
    #[must_use]
    pub fn advertise(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// The socket address actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the outbound queue to `to`, connecting if there is none yet.
    async fn connection(&self, to: &str) -> Result<Outbound, SendError> {
        if let Some(outbound) = self.live_connection(to) {
            return Ok(outbound);
        }

        let _connecting = self.connecting.lock().await;
        if let Some(outbound) = self.live_connection(to) {
            return Ok(outbound);
        }

        let timeout = self.config.connect_timeout();
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(to)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(peer = to, error = %e, "Failed to connect to peer");
                return Err(SendError::NoPeer(to.to_string()));
            }
            Err(_) => {
                debug!(peer = to, ?timeout, "Connecting to peer timed out");
                return Err(SendError::NoPeer(to.to_string()));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = to, error = %e, "Could not disable Nagle's algorithm");
        }
        debug!(peer = to, "Connected to peer");

        let (outbound, queue) = mpsc::channel(self.config.limits.outbound_queue_capacity.max(1));
        tokio::spawn(write_loop(stream, queue, to.to_string(), self.shutdown.clone()));
        self.peers.insert(to.to_string(), outbound.clone());
        Ok(outbound)
    }

    fn live_connection(&self, to: &str) -> Option<Outbound> {
        self.peers
            .get(to)
            .filter(|outbound| !outbound.is_closed())
            .map(|outbound| outbound.clone())
    }
}

impl Drop for TcpNetwork {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Network for TcpNetwork {
    fn address(&self) -> &str {
        &self.address
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ordered: true,
            cancel_propagation: true,
        }
    }

    fn start(&self, sink: FrameSink) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match listener {
            Some(listener) => {
                tokio::spawn(accept_loop(
                    listener,
                    sink,
                    self.config.limits.max_frame_size,
                    self.shutdown.clone(),
                ));
            }
            None => warn!(address = %self.address, "TCP network already started"),
        }
    }

    async fn send(&self, to: &str, frame: Frame) -> Result<(), SendError> {
        let bytes = wire::encode_frame(&frame).map_err(|e| SendError::Failed(e.to_string()))?;
        let max = self.config.limits.max_frame_size;
        if bytes.len() - wire::HEADER_SIZE > max {
            return Err(SendError::Failed(format!(
                "frame of {} bytes exceeds maximum {max}",
                bytes.len()
            )));
        }

        let outbound = self.connection(to).await?;
        if outbound.send(bytes).await.is_err() {
            self.peers.remove(to);
            return Err(SendError::Failed(format!("connection to {to} closed")));
        }
        Ok(())
    }

    fn shutdown(&self) {
        info!(address = %self.address, "TCP network shutting down");
        self.shutdown.cancel();
        self.peers.clear();
    }
}

async fn accept_loop(
    listener: TcpListener,
    sink: FrameSink,
    max_frame_size: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                trace!("TCP accept loop received shutdown signal");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(%peer, "Accepted connection");
                    tokio::spawn(read_loop(stream, peer, sink.clone(), max_frame_size, shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
        }
    }
}

async fn read_loop(
    stream: TcpStream,
    peer: SocketAddr,
    sink: FrameSink,
    max_frame_size: usize,
    shutdown: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            frame = wire::read_frame(&mut reader, max_frame_size) => match frame {
                Ok(frame) => {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(WireError::ConnectionClosed) => {
                    trace!(%peer, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Dropping connection after bad frame");
                    break;
                }
            },
        }
    }
}

async fn write_loop(
    stream: TcpStream,
    mut queue: mpsc::Receiver<Vec<u8>>,
    peer: String,
    shutdown: CancellationToken,
) {
    let mut writer = BufWriter::new(stream);
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            bytes = queue.recv() => {
                let Some(bytes) = bytes else {
                    break;
                };
                if let Err(e) = wire::write_bytes(&mut writer, &bytes).await {
                    warn!(%peer, error = %e, "Failed to write frame");
                    break;
                }
            }
        }
    }
    trace!(%peer, "Writer stopped");
}
