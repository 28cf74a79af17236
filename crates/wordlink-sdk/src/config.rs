// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Link configuration: console timing, timeouts and the precondition marker.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use wordlink_protocol::Precondition;

use crate::error::{Result, SdkError};

/// Configuration shared by the dispatcher, waiter and coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Shared memory block scanned for markers and the precondition (default: 1)
    pub block_id: u32,
    /// Search string proving the console is interactive (default: "Instr:")
    pub precondition_marker: String,
    /// Device-side timeout for the precondition search (default: 5_000)
    pub precondition_timeout_ms: u64,
    /// Transport wait for a dispatch acknowledgement (default: 30_000)
    pub dispatch_timeout_ms: u64,
    /// Device-side search timeout for a correlated reply (default: 10_000)
    pub wait_timeout_ms: u64,
    /// Added to the search timeout to bound the transport wait (default: 5_000)
    pub wait_grace_ms: u64,
    /// Characters of context requested after a marker (default: 70)
    pub context_length: usize,
    /// Settle delay after intermediate keystrokes (default: 10)
    pub key_settle_ms: u64,
    /// Settle delay after the final confirmation key (default: 500)
    pub confirm_settle_ms: u64,
    /// Descriptor file; the built-in descriptor is used when `None`
    pub descriptor_path: Option<PathBuf>,
}

impl LinkConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `WORDLINK_BLOCK_ID` - Memory block id (default: 1)
    /// - `WORDLINK_PRECONDITION_MARKER` - Precondition search string (default: "Instr:")
    /// - `WORDLINK_PRECONDITION_TIMEOUT_MS` - Precondition search timeout (default: 5000)
    /// - `WORDLINK_DISPATCH_TIMEOUT_MS` - Dispatch acknowledgement timeout (default: 30000)
    /// - `WORDLINK_WAIT_TIMEOUT_MS` - Reply search timeout (default: 10000)
    /// - `WORDLINK_WAIT_GRACE_MS` - Extra transport wait for replies (default: 5000)
    /// - `WORDLINK_CONTEXT_LENGTH` - Context characters after a marker (default: 70)
    /// - `WORDLINK_KEY_SETTLE_MS` - Intermediate keystroke settle (default: 10)
    /// - `WORDLINK_CONFIRM_SETTLE_MS` - Final confirmation settle (default: 500)
    /// - `WORDLINK_DESCRIPTOR_PATH` - Variable descriptor file (default: built-in)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let precondition_marker = env::var("WORDLINK_PRECONDITION_MARKER")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.precondition_marker);

        let descriptor_path = env::var("WORDLINK_DESCRIPTOR_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            block_id: parse_var("WORDLINK_BLOCK_ID", defaults.block_id)?,
            precondition_marker,
            precondition_timeout_ms: parse_var(
                "WORDLINK_PRECONDITION_TIMEOUT_MS",
                defaults.precondition_timeout_ms,
            )?,
            dispatch_timeout_ms: parse_var(
                "WORDLINK_DISPATCH_TIMEOUT_MS",
                defaults.dispatch_timeout_ms,
            )?,
            wait_timeout_ms: parse_var("WORDLINK_WAIT_TIMEOUT_MS", defaults.wait_timeout_ms)?,
            wait_grace_ms: parse_var("WORDLINK_WAIT_GRACE_MS", defaults.wait_grace_ms)?,
            context_length: parse_var("WORDLINK_CONTEXT_LENGTH", defaults.context_length)?,
            key_settle_ms: parse_var("WORDLINK_KEY_SETTLE_MS", defaults.key_settle_ms)?,
            confirm_settle_ms: parse_var("WORDLINK_CONFIRM_SETTLE_MS", defaults.confirm_settle_ms)?,
            descriptor_path,
        })
    }

    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            block_id: 1,
            precondition_marker: "Instr:".to_string(),
            precondition_timeout_ms: 5_000,
            dispatch_timeout_ms: 30_000,
            wait_timeout_ms: 10_000,
            wait_grace_ms: 5_000,
            context_length: 70,
            key_settle_ms: 10,
            confirm_settle_ms: 500,
            descriptor_path: None,
        }
    }

    /// Set the memory block id.
    pub fn with_block_id(mut self, block_id: u32) -> Self {
        self.block_id = block_id;
        self
    }

    /// Set the precondition search string.
    pub fn with_precondition_marker(mut self, marker: impl Into<String>) -> Self {
        self.precondition_marker = marker.into();
        self
    }

    /// Set the default dispatch acknowledgement timeout.
    pub fn with_dispatch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.dispatch_timeout_ms = timeout_ms;
        self
    }

    /// Set the default reply search timeout.
    pub fn with_wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }

    /// Set the extra transport wait added to reply searches.
    pub fn with_wait_grace_ms(mut self, grace_ms: u64) -> Self {
        self.wait_grace_ms = grace_ms;
        self
    }

    /// Set keystroke settle delays.
    pub fn with_settle_ms(mut self, key_ms: u64, confirm_ms: u64) -> Self {
        self.key_settle_ms = key_ms;
        self.confirm_settle_ms = confirm_ms;
        self
    }

    /// Set the descriptor file.
    pub fn with_descriptor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor_path = Some(path.into());
        self
    }

    /// The precondition attached to dispatches by default.
    pub fn precondition(&self) -> Precondition {
        Precondition::new(
            self.precondition_marker.clone(),
            self.block_id,
            self.precondition_timeout_ms,
        )
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn wait_grace(&self) -> Duration {
        Duration::from_millis(self.wait_grace_ms)
    }

    pub fn key_settle(&self) -> Duration {
        Duration::from_millis(self.key_settle_ms)
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_millis(self.confirm_settle_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| SdkError::Config(format!("invalid {}: {:?}", key, raw))),
        _ => Ok(default),
    }
}
