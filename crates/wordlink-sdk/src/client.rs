// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The per-process context object for talking to one controller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use wordlink_protocol::{CorrelationId, KeySequence, Precondition, Transport};

use crate::builder::KeySequenceBuilder;
use crate::channel::ExclusiveChannel;
use crate::config::LinkConfig;
use crate::correlation::CorrelationAllocator;
use crate::error::Result;
use crate::routines::Routine;
use crate::types::{DispatchOutcome, WaitOutcome, WorkflowResult};
use crate::variables::VariableIndex;
use crate::workflow::{Workflow, WorkflowCoordinator};

/// Everything needed to run correlated exchanges against one controller.
///
/// Built once at startup and shared by reference. Every public call takes
/// the exclusive command channel for its full duration, so concurrent
/// callers are serialized.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wordlink_protocol::{BusClient, BusClientConfig};
/// use wordlink_sdk::RobotLink;
///
/// let (bus, outbound) = BusClient::new(BusClientConfig::default());
/// let link = RobotLink::from_env(Arc::new(bus))?;
///
/// let result = link.move_to_home().await;
/// if !result.is_success() {
///     tracing::warn!(status = result.status.as_str(), "robot did not reach home");
/// }
/// ```
pub struct RobotLink {
    coordinator: WorkflowCoordinator,
    channel: ExclusiveChannel,
}

impl RobotLink {
    /// Create a link with a fresh allocator and channel.
    pub fn new(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        variables: Arc<VariableIndex>,
    ) -> Self {
        Self::with_parts(
            config,
            transport,
            variables,
            Arc::new(CorrelationAllocator::new()),
            ExclusiveChannel::new(),
        )
    }

    /// Create a link sharing an allocator and channel with other links to the
    /// same controller.
    pub fn with_parts(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        variables: Arc<VariableIndex>,
        allocator: Arc<CorrelationAllocator>,
        channel: ExclusiveChannel,
    ) -> Self {
        info!(
            block_id = config.block_id,
            variables = variables.len(),
            "robot link created"
        );
        Self {
            coordinator: WorkflowCoordinator::new(config, transport, allocator, variables),
            channel,
        }
    }

    /// Load [`LinkConfig`] and the variable descriptor from the environment.
    pub fn from_env(transport: Arc<dyn Transport>) -> Result<Self> {
        let config = LinkConfig::from_env()?;
        let variables = VariableIndex::from_config(&config)?;
        Ok(Self::new(config, transport, Arc::new(variables)))
    }

    pub fn config(&self) -> &LinkConfig {
        self.coordinator.config()
    }

    pub fn variables(&self) -> &VariableIndex {
        self.coordinator.variables()
    }

    pub fn builder(&self) -> &KeySequenceBuilder {
        self.coordinator.builder()
    }

    pub fn allocator(&self) -> &CorrelationAllocator {
        self.coordinator.allocator()
    }

    pub fn channel(&self) -> &ExclusiveChannel {
        &self.channel
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator {
        &self.coordinator
    }

    pub fn is_connected(&self) -> bool {
        self.coordinator.transport().is_connected()
    }

    /// Allocate a correlation id.
    pub fn allocate(&self) -> CorrelationId {
        self.coordinator.allocator().allocate()
    }

    /// Dispatch one sequence.
    #[instrument(skip(self, sequence, precondition), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn dispatch(
        &self,
        label: &str,
        sequence: KeySequence,
        precondition: Option<Precondition>,
        timeout: Duration,
    ) -> DispatchOutcome {
        let guard = self.channel.acquire().await;
        self.coordinator
            .dispatcher()
            .dispatch(&guard, label, sequence, precondition, timeout)
            .await
    }

    /// Dispatch with the configured precondition and timeout.
    pub async fn send_sequence(&self, label: &str, sequence: KeySequence) -> DispatchOutcome {
        let config = self.config();
        self.dispatch(
            label,
            sequence,
            Some(config.precondition()),
            config.dispatch_timeout(),
        )
        .await
    }

    /// Wait for the reply tagged `id`.
    #[instrument(skip(self), fields(correlation_id = %id))]
    pub async fn wait_for(
        &self,
        id: CorrelationId,
        expected: Option<&str>,
        timeout: Duration,
    ) -> WaitOutcome {
        let guard = self.channel.acquire().await;
        self.coordinator
            .waiter()
            .wait_for(&guard, id, expected, timeout)
            .await
    }

    /// Run a workflow holding the channel for all of its steps.
    pub async fn run(&self, workflow: &Workflow) -> WorkflowResult {
        let guard = self.channel.acquire().await;
        self.coordinator.run(&guard, workflow).await
    }

    /// Type a predefined console routine.
    #[instrument(skip(self), fields(routine = routine.as_str()))]
    pub async fn execute_routine(&self, routine: Routine) -> DispatchOutcome {
        self.send_sequence(routine.as_str(), routine.sequence())
            .await
    }

    /// [`execute_routine`](Self::execute_routine) by name.
    pub async fn execute_routine_named(&self, name: &str) -> Result<DispatchOutcome> {
        let routine: Routine = name.parse()?;
        Ok(self.execute_routine(routine).await)
    }
}
