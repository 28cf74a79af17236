// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/reply correlation over a publish/subscribe bus.
//!
//! [`BusClient`] does not own a broker connection. The embedding process
//! forwards outbound [`Publication`]s to the broker, feeds inbound reply frames
//! to [`BusClient::handle_frame`], and reports link changes through
//! [`BusClient::set_connected`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::envelope::{CommandEnvelope, Reply};
use crate::frame::{FrameError, decode_reply, encode_envelope};
use crate::transport::{Transport, TransportError};

/// Default topic commands are published on.
pub const DEFAULT_COMMANDS_TOPIC: &str = "COMAU/commands";
/// Default topic the console bridge publishes replies on.
pub const DEFAULT_REPLIES_TOPIC: &str = "COMAU/memoryData";

/// Configuration for the bus client
#[derive(Debug, Clone)]
pub struct BusClientConfig {
    /// Topic envelopes are published on
    pub commands_topic: String,
    /// Topic replies arrive on
    pub replies_topic: String,
    /// Capacity of the outbound publication queue
    pub outbound_capacity: usize,
}

impl Default for BusClientConfig {
    fn default() -> Self {
        Self {
            commands_topic: DEFAULT_COMMANDS_TOPIC.to_string(),
            replies_topic: DEFAULT_REPLIES_TOPIC.to_string(),
            outbound_capacity: 64,
        }
    }
}

/// A message to hand to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
}

/// Correlates published commands with replies by request id.
pub struct BusClient {
    config: BusClientConfig,
    outbound: mpsc::Sender<Publication>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    connected: AtomicBool,
}

impl BusClient {
    /// Create a client and the receiver its publications are delivered to.
    ///
    /// The client starts disconnected.
    pub fn new(config: BusClientConfig) -> (Self, mpsc::Receiver<Publication>) {
        let (tx, rx) = mpsc::channel(config.outbound_capacity.max(1));
        let client = Self {
            config,
            outbound: tx,
            pending: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        };
        (client, rx)
    }

    pub fn config(&self) -> &BusClientConfig {
        &self.config
    }

    /// Record a link state change. Going down fails every in-flight request.
    pub async fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was == connected {
            return;
        }
        if connected {
            info!("message bus link up");
        } else {
            let mut pending = self.pending.lock().await;
            warn!(in_flight = pending.len(), "message bus link down");
            pending.clear();
        }
    }

    /// Route an inbound frame to the request waiting for it.
    ///
    /// Returns `Ok(false)` for frames on other topics and for replies nobody is
    /// waiting for (late or foreign replies are dropped).
    pub async fn handle_frame(&self, topic: &str, payload: &[u8]) -> Result<bool, FrameError> {
        if topic != self.config.replies_topic {
            return Ok(false);
        }
        let reply = decode_reply(payload)?;
        let waiter = self.pending.lock().await.remove(&reply.request_id);
        match waiter {
            Some(tx) => {
                debug!(request_id = %reply.request_id, "routing reply");
                Ok(tx.send(reply).is_ok())
            }
            None => {
                debug!(request_id = %reply.request_id, "dropping uncorrelated reply");
                Ok(false)
            }
        }
    }

    /// Number of requests currently awaiting a reply.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl Transport for BusClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[instrument(skip_all, fields(request_id = %envelope.request_id(), command = envelope.kind().as_str()))]
    async fn send_and_wait(
        &self,
        envelope: &CommandEnvelope,
        timeout: Duration,
    ) -> Result<Option<Reply>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let payload = encode_envelope(envelope)?;
        let request_id = envelope.request_id().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        let publication = Publication {
            topic: self.config.commands_topic.clone(),
            payload,
        };
        if self.outbound.send(publication).await.is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(TransportError::Closed);
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "published, awaiting reply");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            // Sender dropped: the link went down while waiting.
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                debug!("no reply before timeout");
                Ok(None)
            }
        }
    }
}
