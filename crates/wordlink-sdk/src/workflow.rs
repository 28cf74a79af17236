// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Multi-step robot operations.
//!
//! A [`Workflow`] is an ordered list of [`StepSpec`]s. Each step is
//! allocate → build → dispatch → wait (→ collaborator). The coordinator
//! advances only while steps succeed and never rolls back: the result holds
//! every attempted step, and its status tells the caller how bad the stop was.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use wordlink_protocol::{CorrelationId, KeySequence, Precondition, Transport};

use crate::builder::KeySequenceBuilder;
use crate::channel::ChannelGuard;
use crate::config::LinkConfig;
use crate::correlation::CorrelationAllocator;
use crate::dispatcher::CommandDispatcher;
use crate::error::Result;
use crate::types::{
    DispatchOutcome, ErrorKind, OverallStatus, StepState, WaitOutcome, WorkflowResult,
    WorkflowStepResult,
};
use crate::variables::VariableIndex;
use crate::waiter::ResponseWaiter;

/// Builds a step's key sequence once its correlation id is known.
pub type SequenceFn = Arc<dyn Fn(&StepContext<'_>) -> Result<KeySequence> + Send + Sync>;

/// What a sequence builder can see.
pub struct StepContext<'a> {
    pub correlation_id: CorrelationId,
    pub builder: &'a KeySequenceBuilder,
    pub variables: &'a VariableIndex,
    pub(crate) outputs: &'a [(String, Value)],
}

impl StepContext<'_> {
    /// Collaborator output of an earlier step.
    pub fn output(&self, step_name: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .rev()
            .find(|(name, _)| name == step_name)
            .map(|(_, value)| value)
    }

    /// Most recent collaborator output.
    pub fn last_output(&self) -> Option<&Value> {
        self.outputs.last().map(|(_, value)| value)
    }

    /// Shorthand for `builder.assign(variables, name, value)`.
    pub fn assign(&self, name: &str, value: impl fmt::Display) -> Result<KeySequence> {
        self.builder
            .assign(self.variables, name, &value.to_string())
    }
}

/// Side process invoked after a step's wait succeeds, such as the vision
/// pipeline. Its output is visible to later steps' builders.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn invoke(&self, step: &str, outcome: &WaitOutcome) -> Result<Value>;
}

/// How a step obtains its correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Fresh id from the allocator.
    Allocate,
    /// The previous step's id, incremented. The controller bumps its
    /// correlation register after every reply it writes.
    FollowOn,
}

/// Precondition attached to a step's dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreconditionPolicy {
    /// The configured marker.
    #[default]
    Configured,
    Custom(Precondition),
    Skip,
}

#[derive(Clone)]
pub struct StepSpec {
    name: String,
    correlation: Correlation,
    sequence: Option<SequenceFn>,
    precondition: PreconditionPolicy,
    expected_text: Option<String>,
    dispatch_timeout: Option<Duration>,
    wait_timeout: Option<Duration>,
    collaborator: Option<Arc<dyn Collaborator>>,
}

impl StepSpec {
    /// A step that dispatches the sequence built by `sequence` under a
    /// freshly allocated id.
    pub fn dispatch<F>(name: impl Into<String>, sequence: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> Result<KeySequence> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            correlation: Correlation::Allocate,
            sequence: Some(Arc::new(sequence)),
            precondition: PreconditionPolicy::default(),
            expected_text: None,
            dispatch_timeout: None,
            wait_timeout: None,
            collaborator: None,
        }
    }

    /// A step that only waits for the next reply of the previous dispatch.
    pub fn wait_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation: Correlation::FollowOn,
            sequence: None,
            precondition: PreconditionPolicy::default(),
            expected_text: None,
            dispatch_timeout: None,
            wait_timeout: None,
            collaborator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn correlation(&self) -> Correlation {
        self.correlation
    }

    pub fn is_wait_only(&self) -> bool {
        self.sequence.is_none()
    }

    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }

    /// Use the previous step's follow-on id.
    pub fn follow_on(self) -> Self {
        self.with_correlation(Correlation::FollowOn)
    }

    /// Require the reply payload to equal `text`.
    pub fn expect(mut self, text: impl Into<String>) -> Self {
        self.expected_text = Some(text.into());
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn with_precondition(mut self, precondition: PreconditionPolicy) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn with_collaborator(mut self, collaborator: Arc<dyn Collaborator>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("correlation", &self.correlation)
            .field("wait_only", &self.is_wait_only())
            .field("precondition", &self.precondition)
            .field("expected_text", &self.expected_text)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("collaborator", &self.collaborator.is_some())
            .finish()
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    steps: Vec<StepSpec>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }
}

/// Runs workflows against one controller.
pub struct WorkflowCoordinator {
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    allocator: Arc<CorrelationAllocator>,
    variables: Arc<VariableIndex>,
    builder: KeySequenceBuilder,
    dispatcher: CommandDispatcher,
    waiter: ResponseWaiter,
}

/// Where a step stopped.
struct Stop {
    kind: ErrorKind,
    message: Option<String>,
}

impl WorkflowCoordinator {
    pub fn new(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        allocator: Arc<CorrelationAllocator>,
        variables: Arc<VariableIndex>,
    ) -> Self {
        Self {
            builder: KeySequenceBuilder::from_config(&config),
            dispatcher: CommandDispatcher::new(transport.clone()),
            waiter: ResponseWaiter::new(transport.clone(), &config),
            config,
            transport,
            allocator,
            variables,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn allocator(&self) -> &CorrelationAllocator {
        &self.allocator
    }

    pub fn variables(&self) -> &VariableIndex {
        &self.variables
    }

    pub fn builder(&self) -> &KeySequenceBuilder {
        &self.builder
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn waiter(&self) -> &ResponseWaiter {
        &self.waiter
    }

    /// Run `workflow` while holding `channel`. Never fails; see
    /// [`WorkflowResult`].
    #[instrument(skip_all, fields(workflow = workflow.name(), steps = workflow.steps().len()))]
    pub async fn run(&self, channel: &ChannelGuard, workflow: &Workflow) -> WorkflowResult {
        let mut steps: Vec<WorkflowStepResult> = Vec::with_capacity(workflow.steps().len());
        let mut outputs: Vec<(String, Value)> = Vec::new();
        let mut previous_id: Option<CorrelationId> = None;
        let mut stop: Option<(usize, ErrorKind)> = None;

        for (index, spec) in workflow.steps().iter().enumerate() {
            info!(step = spec.name(), index, "step started");
            let result = self.run_step(channel, spec, previous_id, &mut outputs).await;
            previous_id = result.correlation_id.or(previous_id);

            let kind = result.error_kind();
            steps.push(result);
            if let Some(kind) = kind {
                stop = Some((index, kind));
                break;
            }
        }

        let (status, ok, first_failure_index) = match stop {
            None => (OverallStatus::Success, true, None),
            Some((index, kind)) => (kind.severity(), !kind.is_infrastructure(), Some(index)),
        };

        let result = WorkflowResult {
            workflow: workflow.name().to_string(),
            ok,
            status,
            steps,
            first_failure_index,
        };
        match result.status {
            OverallStatus::Success => info!("workflow completed"),
            _ => warn!(
                status = result.status.as_str(),
                ok = result.ok,
                first_failure_index = ?result.first_failure_index,
                error_kind = ?result.error_kind(),
                "workflow stopped"
            ),
        }
        result
    }

    async fn run_step(
        &self,
        channel: &ChannelGuard,
        spec: &StepSpec,
        previous_id: Option<CorrelationId>,
        outputs: &mut Vec<(String, Value)>,
    ) -> WorkflowStepResult {
        let mut result = WorkflowStepResult {
            step_name: spec.name().to_string(),
            correlation_id: None,
            state: StepState::Pending,
            dispatch: None,
            wait: None,
            collaborator_output: None,
            error_message: None,
        };

        // No id is consumed while the link is down.
        if !self.transport.is_connected() {
            if spec.is_wait_only() {
                result.wait = Some(WaitOutcome::failed(
                    ErrorKind::NotConnected,
                    false,
                    "cannot reach the robot: message bus disconnected",
                ));
            } else {
                result.dispatch = Some(DispatchOutcome::NotConnected);
            }
            return finish(
                result,
                Stop {
                    kind: ErrorKind::NotConnected,
                    message: DispatchOutcome::NotConnected.error_message(),
                },
            );
        }

        let id = self.correlation_for(spec, previous_id);
        result.correlation_id = Some(id);

        if let Some(sequence_fn) = &spec.sequence {
            let context = StepContext {
                correlation_id: id,
                builder: &self.builder,
                variables: &self.variables,
                outputs: outputs.as_slice(),
            };
            let sequence = match sequence_fn(&context) {
                Ok(sequence) => sequence,
                Err(e) => {
                    warn!(step = spec.name(), error = %e, "step sequence rejected");
                    return finish(
                        result,
                        Stop {
                            kind: ErrorKind::InvalidRequest,
                            message: Some(e.to_string()),
                        },
                    );
                }
            };

            result.state = StepState::Dispatched;
            let precondition = match &spec.precondition {
                PreconditionPolicy::Configured => Some(self.config.precondition()),
                PreconditionPolicy::Custom(p) => Some(p.clone()),
                PreconditionPolicy::Skip => None,
            };
            let timeout = spec
                .dispatch_timeout
                .unwrap_or_else(|| self.config.dispatch_timeout());
            let outcome = self
                .dispatcher
                .dispatch(channel, spec.name(), sequence, precondition, timeout)
                .await;
            let failure = outcome.error_kind().map(|kind| Stop {
                kind,
                message: outcome.error_message(),
            });
            result.dispatch = Some(outcome);
            if let Some(stop) = failure {
                return finish(result, stop);
            }
            result.state = StepState::Acknowledged;
            debug!(step = spec.name(), "step acknowledged");
        }

        result.state = StepState::Waiting;
        let timeout = spec
            .wait_timeout
            .unwrap_or_else(|| self.config.wait_timeout());
        let outcome = self
            .waiter
            .wait_for(channel, id, spec.expected_text.as_deref(), timeout)
            .await;
        let failure = (!outcome.success).then(|| Stop {
            kind: outcome.error_kind.unwrap_or(ErrorKind::InternalError),
            message: outcome.error_message.clone(),
        });
        if let Some(stop) = failure {
            result.wait = Some(outcome);
            return finish(result, stop);
        }

        if let Some(collaborator) = &spec.collaborator {
            // A panic surfaces as a JoinError and ends the step.
            let invoked = {
                let collaborator = collaborator.clone();
                let step = spec.name().to_string();
                let outcome = outcome.clone();
                tokio::spawn(async move { collaborator.invoke(&step, &outcome).await }).await
            };
            match invoked {
                Ok(Ok(value)) => {
                    outputs.push((spec.name().to_string(), value.clone()));
                    result.collaborator_output = Some(value);
                }
                Err(join_error) => {
                    error!(step = spec.name(), error = %join_error, "collaborator panicked");
                    result.wait = Some(outcome);
                    return finish(
                        result,
                        Stop {
                            kind: ErrorKind::InternalError,
                            message: Some(format!("collaborator aborted: {}", join_error)),
                        },
                    );
                }
                Ok(Err(e)) => {
                    warn!(step = spec.name(), error = %e, "collaborator failed");
                    result.wait = Some(outcome);
                    return finish(
                        result,
                        Stop {
                            kind: ErrorKind::CollaboratorFailed,
                            message: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        result.wait = Some(outcome);
        result.state = StepState::Success;
        info!(step = spec.name(), correlation_id = %id, "step succeeded");
        result
    }

    fn correlation_for(&self, spec: &StepSpec, previous_id: Option<CorrelationId>) -> CorrelationId {
        match (spec.correlation(), previous_id) {
            (Correlation::FollowOn, Some(previous)) => {
                let id = previous.next();
                self.allocator.record(id);
                id
            }
            (Correlation::FollowOn, None) => {
                warn!(step = spec.name(), "follow-on step without a predecessor, allocating");
                self.allocator.allocate()
            }
            (Correlation::Allocate, _) => self.allocator.allocate(),
        }
    }
}

fn finish(mut result: WorkflowStepResult, stop: Stop) -> WorkflowStepResult {
    result.state = StepState::from_error_kind(stop.kind);
    result.error_message = stop.message;
    result
}
