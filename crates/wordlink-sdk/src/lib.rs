// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wordlink SDK - correlated request/response on top of a keystroke console.
//!
//! The controller only understands typed keystrokes and only answers by
//! writing `[ <id>]: <text>#` into a shared memory block. This crate builds a
//! request/response protocol out of that: it allocates a correlation id,
//! compiles register assignments (including the id) into a keystroke script,
//! dispatches the script through a [`Transport`], then asks the bridge to find
//! the id's marker in memory and classifies what it finds.
//!
//! # Features
//!
//! - **Correlation ids**: 0..9999 with a 20-entry no-repeat window
//! - **Variables**: symbolic register names loaded from a `#define` descriptor
//! - **Key sequences**: `$WORD[a]:=v` assignments with the three-ENTER commit
//! - **Dispatch**: precondition gate and a bounded acknowledgement wait
//! - **Wait**: marker extraction with a typed outcome for every failure
//! - **Workflows**: multi-step operations that stop at the first failure and
//!   report every attempted step
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use wordlink_protocol::{BusClient, BusClientConfig};
//! use wordlink_sdk::{NotchJob, RobotLink};
//!
//! let (bus, outbound) = BusClient::new(BusClientConfig::default());
//! let link = RobotLink::from_env(Arc::new(bus))?;
//!
//! let home = link.move_to_home().await;
//! println!("{} ({})", home.status.as_str(), home.ok);
//!
//! let cycle = link
//!     .feeder_cycle(NotchJob::new(4).with_joint_height_mm(12.5), vision)
//!     .await;
//! if let Some(step) = cycle.failed_step() {
//!     eprintln!("{} stopped in {}", step.step_name, step.state.as_str());
//! }
//! ```
//!
//! # Custom Workflows
//!
//! ```ignore
//! use wordlink_sdk::{StepSpec, Workflow};
//!
//! let workflow = Workflow::new("say_hello").step(
//!     StepSpec::dispatch("hello", |ctx| {
//!         ctx.builder.concat([
//!             ctx.assign("ID_COM", ctx.correlation_id)?,
//!             ctx.assign("SAY_HELLO", 1)?,
//!         ])
//!     })
//!     .expect("Hello!"),
//! );
//! let result = link.run(&workflow).await;
//! ```
//!
//! # Outcome Severity
//!
//! | Stop reason | `status` | `ok` |
//! |-------------|----------|------|
//! | none | `success` | `true` |
//! | reply found but wrong, incomplete or malformed | `warning` | `true` |
//! | precondition failed, dispatch timeout | `warning` | `true` |
//! | not connected, internal error | `error` | `false` |
//! | anything else | `error` | `true` |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WORDLINK_BLOCK_ID` | `1` | Memory block holding markers |
//! | `WORDLINK_PRECONDITION_MARKER` | `Instr:` | Proof the console is interactive |
//! | `WORDLINK_PRECONDITION_TIMEOUT_MS` | `5000` | Precondition search timeout |
//! | `WORDLINK_DISPATCH_TIMEOUT_MS` | `30000` | Acknowledgement timeout |
//! | `WORDLINK_WAIT_TIMEOUT_MS` | `10000` | Reply search timeout |
//! | `WORDLINK_WAIT_GRACE_MS` | `5000` | Extra transport wait for replies |
//! | `WORDLINK_CONTEXT_LENGTH` | `70` | Context characters after a marker |
//! | `WORDLINK_KEY_SETTLE_MS` | `10` | Intermediate keystroke settle |
//! | `WORDLINK_CONFIRM_SETTLE_MS` | `500` | Final ENTER settle |
//! | `WORDLINK_DESCRIPTOR_PATH` | built-in | Variable descriptor file |

mod builder;
mod channel;
mod client;
mod config;
mod correlation;
mod dispatcher;
mod error;
mod exchange;
mod operations;
mod routines;
mod types;
mod variables;
mod waiter;
mod workflow;

// Main types
pub use client::RobotLink;
pub use config::LinkConfig;
pub use error::{Result, SdkError};
pub use types::{
    DispatchOutcome, ErrorKind, OverallStatus, StepState, WaitOutcome, WorkflowResult,
    WorkflowStepResult,
};

// Building blocks
pub use builder::{CONFIRMATION_PRESSES, KeySequenceBuilder};
pub use channel::{ChannelGuard, ExclusiveChannel};
pub use correlation::{CorrelationAllocator, MAX_ATTEMPTS, SeedSource, WINDOW_SIZE};
pub use dispatcher::{CommandDispatcher, UNKNOWN_ERROR_CODE, classify_reply};
pub use variables::{AllowedValues, Category, VariableDescriptor, VariableIndex};
pub use waiter::{ResponseWaiter, classify};

// Workflows
pub use operations::{
    FEEDER_DONE, HOME_DONE, MOVE_TO_FEEDER_STEP, MOVE_TO_HOME_STEP, NOTCHES_DONE, NotchJob,
    TAKE_PHOTO, TAKE_PHOTO_STEP, TrajectoryVector, UPLOAD_NOTCHES_STEP, feeder_cycle_workflow,
    move_to_home_workflow, parse_trajectory,
};
pub use routines::Routine;
pub use workflow::{
    Collaborator, Correlation, PreconditionPolicy, SequenceFn, StepContext, StepSpec, Workflow,
    WorkflowCoordinator,
};

// Re-export protocol types callers need
pub use wordlink_protocol::{CorrelationId, Key, KeyAction, KeySequence, Precondition, Transport};
