// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One bounded request/reply call through the transport.
//!
//! The transport is given its own timeout; the call is additionally bounded
//! locally so a transport that ignores its timeout cannot hang the caller.
//! The call runs on its own task, so a panicking transport surfaces as
//! [`Exchange::Failed`] instead of unwinding into the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use wordlink_protocol::{CommandEnvelope, Reply, Transport, TransportError};

/// Slack between the transport timeout and the local bound.
pub const LOCAL_BOUND_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) enum Exchange {
    Reply(Reply),
    /// Transport timed out without a reply.
    NoReply,
    NotConnected,
    /// Transport failed or panicked.
    Failed(String),
    /// Transport did not return within the local bound.
    Hung,
}

pub(crate) async fn exchange(
    transport: &Arc<dyn Transport>,
    envelope: CommandEnvelope,
    transport_timeout: Duration,
) -> Exchange {
    let request_id = envelope.request_id().to_string();
    let transport = transport.clone();
    let call =
        tokio::spawn(async move { transport.send_and_wait(&envelope, transport_timeout).await });
    let abort = call.abort_handle();

    match tokio::time::timeout(transport_timeout + LOCAL_BOUND_SLACK, call).await {
        Ok(Ok(Ok(Some(reply)))) => Exchange::Reply(reply),
        Ok(Ok(Ok(None))) => Exchange::NoReply,
        Ok(Ok(Err(TransportError::NotConnected))) => Exchange::NotConnected,
        Ok(Ok(Err(e))) => {
            error!(request_id = %request_id, error = %e, "transport failure");
            Exchange::Failed(e.to_string())
        }
        Ok(Err(join_error)) => {
            error!(request_id = %request_id, error = %join_error, "transport call aborted");
            Exchange::Failed(format!("transport call aborted: {}", join_error))
        }
        Err(_) => {
            abort.abort();
            warn!(
                request_id = %request_id,
                timeout_ms = transport_timeout.as_millis() as u64,
                "transport ignored its timeout"
            );
            Exchange::Hung
        }
    }
}
