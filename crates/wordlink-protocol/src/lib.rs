// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wordlink Protocol - wire layer for keystroke-driven robot consoles
//!
//! The controller has no request/response API. Commands are keystroke
//! scripts typed into its console by a bridge process, and the controller's
//! only feedback is text it writes into a shared memory block. This crate
//! defines what travels between the core and that bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    wordlink-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: send_and_wait (BusClient request correlation)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: CommandEnvelope / Reply (JSON frames)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Payloads: KeySequence, marker grammar "[ id]: text#"       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wordlink_protocol::{BusClient, BusClientConfig, CommandEnvelope, Transport};
//!
//! let (client, mut outbound) = BusClient::new(BusClientConfig::default());
//! // forward `outbound` to the broker, feed replies to `client.handle_frame`
//! client.set_connected(true).await;
//!
//! let envelope = CommandEnvelope::find_string("WAIT", 1, "[ 42]:", 70, 10_000);
//! let reply = client.send_and_wait(&envelope, Duration::from_secs(15)).await?;
//! ```

pub mod client;
pub mod envelope;
pub mod frame;
pub mod ids;
pub mod marker;
pub mod sequence;
pub mod transport;

// Re-export main types
pub use client::{BusClient, BusClientConfig, Publication};
pub use envelope::{
    CommandEnvelope, CommandKind, ExecutionOptions, Occurrence, Precondition, Reply, ReplyStatus,
};
pub use frame::FrameError;
pub use ids::{CORRELATION_ID_SPACE, CorrelationId};
pub use marker::{ExtractError, extract_payload, marker};
pub use sequence::{Key, KeyAction, KeySequence, MouseButton, SequenceError};
pub use transport::{Transport, TransportError};
