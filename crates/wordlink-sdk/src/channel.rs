// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Exclusive access to the controller's command channel.
//!
//! The shared memory block has no addressing beyond correlation markers, so
//! only one exchange may be in flight per process. Dispatch and wait take a
//! [`ChannelGuard`] as proof of exclusive access.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Single-slot lock around the command channel.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveChannel {
    slot: Arc<Mutex<()>>,
}

impl ExclusiveChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access.
    pub async fn acquire(&self) -> ChannelGuard {
        let guard = self.slot.clone().lock_owned().await;
        debug!("command channel acquired");
        ChannelGuard { _guard: guard }
    }

    /// Exclusive access if nobody holds the channel.
    pub fn try_acquire(&self) -> Option<ChannelGuard> {
        self.slot
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| ChannelGuard { _guard: guard })
    }
}

/// Held for the duration of an exchange or a whole workflow.
#[derive(Debug)]
pub struct ChannelGuard {
    _guard: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let channel = ExclusiveChannel::new();
        let guard = channel.acquire().await;
        assert!(channel.try_acquire().is_none());

        let contender = {
            let channel = channel.clone();
            tokio::spawn(async move {
                let _guard = channel.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(channel.try_acquire().is_some());
    }
}
