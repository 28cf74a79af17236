// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outcome types for dispatches, waits and workflows.
//!
//! None of these are errors in the `Result` sense: every exchange with the
//! controller produces one of these values, and the caller decides what a
//! warning means for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wordlink_protocol::CorrelationId;

/// Flat, stable failure identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport reports no active link
    NotConnected,
    /// No dispatch acknowledgement within the timeout
    DispatchTimeout,
    /// Console not in the expected state
    PreconditionFailed,
    /// Device reported an execution failure
    DeviceError,
    /// Marker never appeared
    IdNotFound,
    /// Marker found with an unexpected payload
    WrongText,
    /// Marker found but the payload is not terminated yet
    IncompleteResponse,
    /// Context has no separator
    InvalidFormat,
    /// Bridge reported a failure while searching
    ServerError,
    /// Unexpected failure inside the exchange
    InternalError,
    /// A step's sequence could not be built
    InvalidRequest,
    /// A side collaborator failed
    CollaboratorFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::DispatchTimeout => "DispatchTimeout",
            ErrorKind::PreconditionFailed => "PreconditionFailed",
            ErrorKind::DeviceError => "DeviceError",
            ErrorKind::IdNotFound => "IdNotFound",
            ErrorKind::WrongText => "WrongText",
            ErrorKind::IncompleteResponse => "IncompleteResponse",
            ErrorKind::InvalidFormat => "InvalidFormat",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::CollaboratorFailed => "CollaboratorFailed",
        }
    }

    /// Workflow severity of a step that stopped with this kind.
    ///
    /// Warnings cover a device that was reachable but not ready, and a reply
    /// that was found under the id but did not satisfy the step.
    pub fn severity(&self) -> OverallStatus {
        match self {
            ErrorKind::WrongText
            | ErrorKind::IncompleteResponse
            | ErrorKind::InvalidFormat
            | ErrorKind::PreconditionFailed
            | ErrorKind::DispatchTimeout => OverallStatus::Warning,
            _ => OverallStatus::Error,
        }
    }

    /// Failures of the exchange machinery itself rather than of the robot
    /// operation.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ErrorKind::NotConnected | ErrorKind::InternalError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dispatch.
///
/// Only confirms the console executed the keystrokes, not what the robot
/// did about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Sequence executed with the precondition satisfied.
    Acknowledged {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time: Option<f64>,
    },
    /// No link; nothing was sent.
    NotConnected,
    /// No reply before the timeout.
    Timeout { request_id: String, timeout_ms: u64 },
    /// Reply received but the precondition marker was absent.
    PreconditionFailed {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Device reported an execution failure.
    DeviceError {
        request_id: String,
        code: String,
        message: String,
    },
    /// Unexpected transport failure.
    Internal { message: String },
}

impl DispatchOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DispatchOutcome::Acknowledged { .. })
    }

    /// `None` for [`DispatchOutcome::Acknowledged`].
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            DispatchOutcome::Acknowledged { .. } => None,
            DispatchOutcome::NotConnected => Some(ErrorKind::NotConnected),
            DispatchOutcome::Timeout { .. } => Some(ErrorKind::DispatchTimeout),
            DispatchOutcome::PreconditionFailed { .. } => Some(ErrorKind::PreconditionFailed),
            DispatchOutcome::DeviceError { .. } => Some(ErrorKind::DeviceError),
            DispatchOutcome::Internal { .. } => Some(ErrorKind::InternalError),
        }
    }

    /// Human-readable description of a failed dispatch.
    pub fn error_message(&self) -> Option<String> {
        match self {
            DispatchOutcome::Acknowledged { .. } => None,
            DispatchOutcome::NotConnected => {
                Some("cannot reach the robot: message bus disconnected".to_string())
            }
            DispatchOutcome::Timeout { timeout_ms, .. } => Some(format!(
                "robot did not acknowledge within {}ms",
                timeout_ms
            )),
            DispatchOutcome::PreconditionFailed { message, .. } => Some(
                message
                    .clone()
                    .unwrap_or_else(|| "console not ready: precondition marker absent".to_string()),
            ),
            DispatchOutcome::DeviceError { code, message, .. } => {
                Some(format!("{}: {}", code, message))
            }
            DispatchOutcome::Internal { message } => Some(message.clone()),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Acknowledged { request_id, .. }
            | DispatchOutcome::Timeout { request_id, .. }
            | DispatchOutcome::PreconditionFailed { request_id, .. }
            | DispatchOutcome::DeviceError { request_id, .. } => Some(request_id),
            DispatchOutcome::NotConnected | DispatchOutcome::Internal { .. } => None,
        }
    }
}

/// Result of waiting for a correlated reply.
///
/// `success` holds iff `id_found && text_match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOutcome {
    pub success: bool,
    pub id_found: bool,
    pub text_match: bool,
    pub response_text: String,
    pub full_response_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WaitOutcome {
    /// Marker found and the payload extracted.
    pub fn found(
        response_text: impl Into<String>,
        full_response_context: impl Into<String>,
        expected: Option<&str>,
    ) -> Self {
        let response_text = response_text.into();
        let text_match = expected.is_none_or(|e| e == response_text);
        let (error_kind, error_message) = match expected {
            Some(e) if !text_match => (
                Some(ErrorKind::WrongText),
                Some(format!("expected {:?}, got {:?}", e, response_text)),
            ),
            _ => (None, None),
        };
        Self {
            success: text_match,
            id_found: true,
            text_match,
            response_text,
            full_response_context: full_response_context.into(),
            error_kind,
            error_message,
        }
    }

    /// The exchange failed before a payload could be extracted.
    pub fn failed(kind: ErrorKind, id_found: bool, message: impl Into<String>) -> Self {
        Self {
            success: false,
            id_found,
            text_match: false,
            response_text: String::new(),
            full_response_context: String::new(),
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.full_response_context = context.into();
        self
    }

    pub fn with_response_text(mut self, text: impl Into<String>) -> Self {
        self.response_text = text.into();
        self
    }
}

/// Lifecycle of one workflow step.
///
/// `Pending → Dispatched → {Acknowledged | dispatch failure}`, then
/// `Acknowledged → Waiting → {Success | wait failure}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Dispatched,
    Acknowledged,
    NotConnected,
    Timeout,
    PreconditionFailed,
    DeviceError,
    Waiting,
    Success,
    WrongText,
    NotFound,
    Incomplete,
    InvalidFormat,
    ServerError,
    InternalError,
    InvalidRequest,
    CollaboratorFailed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Dispatched => "dispatched",
            StepState::Acknowledged => "acknowledged",
            StepState::NotConnected => "not_connected",
            StepState::Timeout => "timeout",
            StepState::PreconditionFailed => "precondition_failed",
            StepState::DeviceError => "device_error",
            StepState::Waiting => "waiting",
            StepState::Success => "success",
            StepState::WrongText => "wrong_text",
            StepState::NotFound => "not_found",
            StepState::Incomplete => "incomplete",
            StepState::InvalidFormat => "invalid_format",
            StepState::ServerError => "server_error",
            StepState::InternalError => "internal_error",
            StepState::InvalidRequest => "invalid_request",
            StepState::CollaboratorFailed => "collaborator_failed",
        }
    }

    /// Terminal state for a failure of `kind`.
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotConnected => StepState::NotConnected,
            ErrorKind::DispatchTimeout => StepState::Timeout,
            ErrorKind::PreconditionFailed => StepState::PreconditionFailed,
            ErrorKind::DeviceError => StepState::DeviceError,
            ErrorKind::IdNotFound => StepState::NotFound,
            ErrorKind::WrongText => StepState::WrongText,
            ErrorKind::IncompleteResponse => StepState::Incomplete,
            ErrorKind::InvalidFormat => StepState::InvalidFormat,
            ErrorKind::ServerError => StepState::ServerError,
            ErrorKind::InternalError => StepState::InternalError,
            ErrorKind::InvalidRequest => StepState::InvalidRequest,
            ErrorKind::CollaboratorFailed => StepState::CollaboratorFailed,
        }
    }

    /// Failure kind of a terminal failure state.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            StepState::NotConnected => Some(ErrorKind::NotConnected),
            StepState::Timeout => Some(ErrorKind::DispatchTimeout),
            StepState::PreconditionFailed => Some(ErrorKind::PreconditionFailed),
            StepState::DeviceError => Some(ErrorKind::DeviceError),
            StepState::NotFound => Some(ErrorKind::IdNotFound),
            StepState::WrongText => Some(ErrorKind::WrongText),
            StepState::Incomplete => Some(ErrorKind::IncompleteResponse),
            StepState::InvalidFormat => Some(ErrorKind::InvalidFormat),
            StepState::ServerError => Some(ErrorKind::ServerError),
            StepState::InternalError => Some(ErrorKind::InternalError),
            StepState::InvalidRequest => Some(ErrorKind::InvalidRequest),
            StepState::CollaboratorFailed => Some(ErrorKind::CollaboratorFailed),
            StepState::Pending
            | StepState::Dispatched
            | StepState::Acknowledged
            | StepState::Waiting
            | StepState::Success => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == StepState::Success || self.error_kind().is_some()
    }
}

/// Overall severity of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Success,
    Warning,
    Error,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Warning => "warning",
            OverallStatus::Error => "error",
        }
    }
}

/// Everything learned about one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    pub step_name: String,
    /// `None` when the step stopped before an id was assigned.
    pub correlation_id: Option<CorrelationId>,
    pub state: StepState,
    /// `None` for wait-only steps and steps that never dispatched.
    pub dispatch: Option<DispatchOutcome>,
    /// `None` when the step never reached its wait.
    pub wait: Option<WaitOutcome>,
    /// Output of the step's side collaborator, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WorkflowStepResult {
    pub fn succeeded(&self) -> bool {
        self.state == StepState::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.state.error_kind()
    }
}

/// Result of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow: String,
    /// False only when the exchange machinery itself failed
    /// ([`ErrorKind::is_infrastructure`]).
    pub ok: bool,
    pub status: OverallStatus,
    pub steps: Vec<WorkflowStepResult>,
    pub first_failure_index: Option<usize>,
}

impl WorkflowResult {
    /// The step that stopped the run.
    pub fn failed_step(&self) -> Option<&WorkflowStepResult> {
        self.first_failure_index.and_then(|i| self.steps.get(i))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failed_step().and_then(WorkflowStepResult::error_kind)
    }

    pub fn is_success(&self) -> bool {
        self.status == OverallStatus::Success
    }

    /// Collaborator output of the named step.
    pub fn output_of(&self, step_name: &str) -> Option<&Value> {
        self.steps
            .iter()
            .find(|s| s.step_name == step_name)
            .and_then(|s| s.collaborator_output.as_ref())
    }
}
