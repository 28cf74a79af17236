// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.
//!
//! These are caller errors. Protocol outcomes (timeouts, missing markers,
//! device errors) are values, see [`crate::types`].

use std::path::PathBuf;

use thiserror::Error;
use wordlink_protocol::{SequenceError, TransportError};

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// Variable name not present in the descriptor
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Value outside the variable's allowed set
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Descriptor file could not be read
    #[error("cannot read descriptor {path}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key sequence could not be built
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Unknown routine name
    #[error("unknown routine: {0}")]
    UnknownRoutine(String),

    /// A side collaborator (e.g. the vision pipeline) failed
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    /// Transport failure outside of a dispatch or wait
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;
