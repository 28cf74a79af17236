// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command envelopes sent to the console bridge and the replies it returns.
//!
//! Envelopes can only be built through the per-kind constructors
//! ([`CommandEnvelope::execute_sequence`], [`CommandEnvelope::find_string`]), so
//! every envelope on the wire has the argument shape its command requires.

use chrono::{DateTime, Local};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::sequence::KeySequence;

/// Timestamp format used in the envelope header.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Marker that must be present in a memory block before a sequence is typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    pub search_string: String,
    pub block_id: u32,
    /// Device-side timeout for the search.
    pub timeout_ms: u64,
}

impl Precondition {
    pub fn new(search_string: impl Into<String>, block_id: u32, timeout_ms: u64) -> Self {
        Self {
            search_string: search_string.into(),
            block_id,
            timeout_ms,
        }
    }
}

/// Execution flags forwarded to the keyboard emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    pub verify_focus: bool,
    pub restore_focus: bool,
    pub abort_on_error: bool,
    pub dry_run: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            verify_focus: true,
            restore_focus: false,
            abort_on_error: true,
            dry_run: false,
        }
    }
}

/// Supported bridge commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Type a key sequence after checking for a marker in a memory block.
    ExecuteKeySequenceWithInstrCheck,
    /// Search a memory block for a string and return trailing context.
    FindStringLenInBlock,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ExecuteKeySequenceWithInstrCheck => "ExecuteKeySequenceWithInstrCheck",
            CommandKind::FindStringLenInBlock => "FindStringLenInBlock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct InstrCheck {
    enabled: bool,
    block_id: u32,
    search_string: String,
    timeout_ms: u64,
}

impl From<Option<&Precondition>> for InstrCheck {
    fn from(precondition: Option<&Precondition>) -> Self {
        match precondition {
            Some(p) => Self {
                enabled: true,
                block_id: p.block_id,
                search_string: p.search_string.clone(),
                timeout_ms: p.timeout_ms,
            },
            None => Self {
                enabled: false,
                block_id: 0,
                search_string: String::new(),
                timeout_ms: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum CommandArgs {
    Execute {
        sequence: KeySequence,
        instr_check: InstrCheck,
        options: ExecutionOptions,
    },
    Find {
        block_id: u32,
        search_string: String,
        length: usize,
        timeout_ms: u64,
    },
}

/// One outgoing bridge command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    kind: CommandKind,
    timestamp: DateTime<Local>,
    args: CommandArgs,
    request_id: String,
    precondition: Option<Precondition>,
}

impl CommandEnvelope {
    /// Build an `ExecuteKeySequenceWithInstrCheck` command.
    ///
    /// `label` names the operation in the generated request id.
    pub fn execute_sequence(
        label: &str,
        sequence: KeySequence,
        precondition: Option<Precondition>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            kind: CommandKind::ExecuteKeySequenceWithInstrCheck,
            timestamp: Local::now(),
            args: CommandArgs::Execute {
                sequence,
                instr_check: InstrCheck::from(precondition.as_ref()),
                options,
            },
            request_id: generate_request_id(label),
            precondition,
        }
    }

    /// Build a `FindStringLenInBlock` command returning `length` characters
    /// after the first occurrence of `search_string`.
    pub fn find_string(
        label: &str,
        block_id: u32,
        search_string: impl Into<String>,
        length: usize,
        timeout_ms: u64,
    ) -> Self {
        Self {
            kind: CommandKind::FindStringLenInBlock,
            timestamp: Local::now(),
            args: CommandArgs::Find {
                block_id,
                search_string: search_string.into(),
                length,
                timeout_ms,
            },
            request_id: generate_request_id(label),
            precondition: None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Transport-level request id, distinct from the correlation id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The precondition attached to an execute command, if any.
    pub fn precondition(&self) -> Option<&Precondition> {
        self.precondition.as_ref()
    }

    /// The key sequence of an execute command.
    pub fn sequence(&self) -> Option<&KeySequence> {
        match &self.args {
            CommandArgs::Execute { sequence, .. } => Some(sequence),
            CommandArgs::Find { .. } => None,
        }
    }

    /// The search string of a find command.
    pub fn search_string(&self) -> Option<&str> {
        match &self.args {
            CommandArgs::Find { search_string, .. } => Some(search_string),
            CommandArgs::Execute { .. } => None,
        }
    }

    /// The block a find command scans.
    pub fn block_id(&self) -> Option<u32> {
        match &self.args {
            CommandArgs::Find { block_id, .. } => Some(*block_id),
            CommandArgs::Execute { .. } => None,
        }
    }

    /// The device-side timeout of a find command.
    pub fn search_timeout_ms(&self) -> Option<u64> {
        match &self.args {
            CommandArgs::Find { timeout_ms, .. } => Some(*timeout_ms),
            CommandArgs::Execute { .. } => None,
        }
    }

    /// Context length requested by a find command.
    pub fn context_length(&self) -> Option<usize> {
        match &self.args {
            CommandArgs::Find { length, .. } => Some(*length),
            CommandArgs::Execute { .. } => None,
        }
    }
}

impl Serialize for CommandEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CommandEnvelope", 4)?;
        state.serialize_field("command", &self.kind)?;
        state.serialize_field(
            "timestamp",
            &self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        )?;
        state.serialize_field("args", &self.args)?;
        state.serialize_field("request_id", &self.request_id)?;
        state.end()
    }
}

/// `<label>_<unix-seconds>_<8 hex>`
fn generate_request_id(label: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        label.to_lowercase(),
        chrono::Utc::now().timestamp(),
        &uuid[..8]
    )
}

/// Reply status reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// One match returned by a find command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// The search string followed by the requested trailing context.
    pub full_context: String,
}

/// Reply to a [`CommandEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub request_id: String,
    pub status: ReplyStatus,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instr_check_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl Reply {
    /// A bare success reply for `request_id`.
    pub fn success(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ReplyStatus::Success,
            occurrences: Vec::new(),
            instr_check_passed: None,
            error_code: None,
            error_message: None,
            message: None,
            execution_time: None,
        }
    }

    /// An error reply for `request_id`.
    pub fn error(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: ReplyStatus::Error,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::success(request_id)
        }
    }

    pub fn with_instr_check(mut self, passed: bool) -> Self {
        self.instr_check_passed = Some(passed);
        self
    }

    pub fn with_occurrence(mut self, full_context: impl Into<String>) -> Self {
        self.occurrences.push(Occurrence {
            full_context: full_context.into(),
        });
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// Context of the first occurrence, if any.
    pub fn first_context(&self) -> Option<&str> {
        self.occurrences.first().map(|o| o.full_context.as_str())
    }
}
