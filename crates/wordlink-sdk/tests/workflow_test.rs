// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow tests against a simulated controller.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::*;
use serde_json::{Value, json};
use wordlink_sdk::{
    Collaborator, CorrelationId, DispatchOutcome, ErrorKind, NotchJob, OverallStatus, SdkError,
    StepSpec, StepState, TAKE_PHOTO_STEP, WaitOutcome, Workflow,
};

fn id_of(step: &wordlink_sdk::WorkflowStepResult) -> CorrelationId {
    step.correlation_id.expect("step should have an id")
}

fn assignment(step: &str, name: &str, value: &str) -> StepSpec {
    let name = name.to_string();
    let value = value.to_string();
    StepSpec::dispatch(step, move |ctx| {
        ctx.builder.concat([
            ctx.assign("ID_COM", ctx.correlation_id)?,
            ctx.assign(&name, &value)?,
        ])
    })
}

struct Vision {
    result: Result<Value, String>,
    calls: AtomicUsize,
}

impl Vision {
    fn returning(result: Value) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(result),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Collaborator for Vision {
    async fn invoke(&self, step: &str, outcome: &WaitOutcome) -> wordlink_sdk::Result<Value> {
        assert_eq!(step, TAKE_PHOTO_STEP);
        assert_eq!(outcome.response_text, "Take a Photo!");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(SdkError::Collaborator)
    }
}

#[tokio::test]
async fn test_move_to_home_success() {
    init_tracing();
    let controller = SimulatedController::new();
    controller.script(&["$HOME done!"]);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Success);
    assert_eq!(result.first_failure_index, None);
    assert_eq!(result.steps.len(), 1);

    let step = &result.steps[0];
    assert_eq!(step.state, StepState::Success);
    let id = id_of(step);
    assert!(link.allocator().contains(id));

    let wait = step.wait.as_ref().unwrap();
    assert!(wait.success && wait.id_found && wait.text_match);
    assert_eq!(wait.response_text, "$HOME done!");

    let dispatched = controller.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert!(dispatched[0].starts_with(&format!("$WORD[1]:={}<ENTER>", id)));
    assert!(dispatched[0].contains("$WORD[4]:=1<ENTER><ENTER><ENTER>"));
    assert_eq!(controller.searches(), vec![format!("[ {}]:", id)]);
}

#[tokio::test(start_paused = true)]
async fn test_second_step_not_found_stops_with_error() {
    let controller = SimulatedController::new();
    controller.script(&["Gripper open"]);
    controller.script_nothing();
    let link = link_for(&controller);

    let workflow = Workflow::new("open_then_close")
        .step(assignment("open", "EV_PINZA", "1").expect("Gripper open"))
        .step(assignment("close", "EV_PINZA", "0").expect("Gripper closed"));
    let result = link.run(&workflow).await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    assert_eq!(result.first_failure_index, Some(1));
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].state, StepState::Success);

    let failed = result.failed_step().unwrap();
    assert_eq!(failed.state, StepState::NotFound);
    assert!(failed.dispatch.as_ref().unwrap().is_acknowledged());
    let wait = failed.wait.as_ref().unwrap();
    assert!(!wait.id_found);
    assert_eq!(wait.error_kind, Some(ErrorKind::IdNotFound));
    assert_ne!(id_of(&result.steps[0]), id_of(&result.steps[1]));
}

#[tokio::test]
async fn test_wrong_text_is_a_warning() {
    let controller = SimulatedController::new();
    controller.script(&["$HOME blocked"]);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Warning);
    assert_eq!(result.error_kind(), Some(ErrorKind::WrongText));
    let wait = result.steps[0].wait.as_ref().unwrap();
    assert!(wait.id_found && !wait.text_match);
    assert_eq!(wait.response_text, "$HOME blocked");
}

#[tokio::test]
async fn test_not_connected_consumes_no_id() {
    let controller = SimulatedController::new();
    controller.set_connected(false);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(!result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    assert_eq!(result.first_failure_index, Some(0));
    assert_eq!(result.steps.len(), 1);
    let step = &result.steps[0];
    assert_eq!(step.state, StepState::NotConnected);
    assert_eq!(step.correlation_id, None);
    assert_eq!(step.dispatch, Some(DispatchOutcome::NotConnected));
    assert!(step.wait.is_none());
    assert!(link.allocator().recent().is_empty());
    assert!(controller.sent().is_empty());
}

#[tokio::test]
async fn test_precondition_failure_is_a_warning() {
    let controller = SimulatedController::new();
    controller.set_console_ready(false);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Warning);
    let step = &result.steps[0];
    assert_eq!(step.state, StepState::PreconditionFailed);
    assert!(step.wait.is_none());
    assert!(controller.searches().is_empty());
}

#[tokio::test]
async fn test_device_error_is_an_error() {
    let controller = SimulatedController::new();
    controller.set_dispatch_mode(DispatchMode::Reject {
        code: "FOCUS_LOST".to_string(),
        message: "console window not focused".to_string(),
    });
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    let step = &result.steps[0];
    assert_eq!(step.state, StepState::DeviceError);
    assert_eq!(
        step.error_message.as_deref(),
        Some("FOCUS_LOST: console window not focused")
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_timeout_is_a_warning() {
    let controller = SimulatedController::new();
    controller.set_dispatch_mode(DispatchMode::Silent);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Warning);
    assert_eq!(result.steps[0].state, StepState::Timeout);
    assert!(matches!(
        result.steps[0].dispatch,
        Some(DispatchOutcome::Timeout {
            timeout_ms: 1_000,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hung_transport_is_bounded() {
    let controller = SimulatedController::new();
    controller.set_dispatch_mode(DispatchMode::Hang);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert_eq!(result.steps[0].state, StepState::Timeout);
    assert_eq!(result.status, OverallStatus::Warning);
    // The channel is free again.
    assert!(link.channel().try_acquire().is_some());
}

#[tokio::test]
async fn test_transport_panic_is_an_internal_error() {
    let controller = SimulatedController::new();
    controller.set_dispatch_mode(DispatchMode::Crash);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(!result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    assert_eq!(result.steps[0].state, StepState::InternalError);
}

#[tokio::test]
async fn test_incomplete_reply() {
    let controller = SimulatedController::new();
    controller.script_unterminated("$HOME do");
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Warning);
    assert_eq!(result.first_failure_index, Some(0));
    let step = &result.steps[0];
    assert_eq!(step.state, StepState::Incomplete);
    let wait = step.wait.as_ref().unwrap();
    assert!(wait.id_found && !wait.success);
    assert_eq!(wait.response_text, "$HOME do");
}

#[tokio::test]
async fn test_reply_without_separator_is_a_warning() {
    let controller = SimulatedController::new();
    controller.script(&["$HOME done!"]);
    controller.set_garbled_context("[ 7] garbled");
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Warning);
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidFormat));
    let wait = result.steps[0].wait.as_ref().unwrap();
    assert!(wait.id_found && !wait.text_match && !wait.success);
}

#[tokio::test]
async fn test_search_failure_is_a_server_error() {
    let controller = SimulatedController::new();
    controller.script(&["$HOME done!"]);
    controller.set_search_failure("block 1 unreadable");
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert_eq!(result.steps[0].state, StepState::ServerError);
    assert_eq!(
        result.steps[0].error_message.as_deref(),
        Some("block 1 unreadable")
    );
}

#[tokio::test]
async fn test_invalid_value_is_rejected_before_dispatch() {
    let controller = SimulatedController::new();
    let link = link_for(&controller);

    let workflow = Workflow::new("bad_state").step(assignment("set_state", "MAQUINA_ESTADOS", "400"));
    let result = link.run(&workflow).await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    let step = &result.steps[0];
    assert_eq!(step.state, StepState::InvalidRequest);
    assert!(step.correlation_id.is_some());
    assert!(step.dispatch.is_none());
    assert!(controller.sent().is_empty());
}

#[tokio::test]
async fn test_feeder_cycle_end_to_end() {
    init_tracing();
    let controller = SimulatedController::new();
    controller.script(&["Move to Feeder done!", "Take a Photo!"]);
    controller.script(&["Troqueles hechos!"]);
    let link = link_for(&controller);
    let vision = Vision::returning(json!({
        "trajectory_vectors": [
            { "segmento": "notch 1", "vector_mm": [12.34, -5.0] },
            { "segmento": "notch 2", "centro_mm": [40.0, 7.25] }
        ]
    }));

    let job = NotchJob::new(2).with_joint_height_mm(18.5);
    let result = link.feeder_cycle(job, vision.clone()).await;

    assert!(result.is_success(), "{:?}", result);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);

    let first = id_of(&result.steps[0]);
    assert_eq!(id_of(&result.steps[1]), first.next());
    assert_eq!(id_of(&result.steps[2]), first.next().next());
    assert!(result.steps[1].dispatch.is_none());

    let dispatched = controller.dispatched();
    assert_eq!(dispatched.len(), 2);
    assert!(dispatched[0].contains(&format!("$WORD[1]:={}<ENTER>", first)));
    assert!(dispatched[0].contains("$WORD[3]:=10<ENTER>"));
    assert!(dispatched[0].contains("$WORD[30]:=2<ENTER>"));
    assert!(dispatched[0].contains("$WORD[24]:=2015<ENTER>"));

    let upload = &dispatched[1];
    assert!(upload.starts_with("$WORD[3]:=40<ENTER>"));
    for expected in [
        "$WORD[31]:=123<ENTER>",
        "$WORD[32]:=-50<ENTER>",
        "$WORD[33]:=400<ENTER>",
        "$WORD[34]:=73<ENTER>",
    ] {
        assert!(upload.contains(expected), "missing {}", expected);
    }

    let vectors = result.output_of(TAKE_PHOTO_STEP).unwrap();
    assert_eq!(vectors.as_array().unwrap().len(), 2);
    for step in &result.steps {
        assert!(link.allocator().contains(id_of(step)));
    }
}

#[tokio::test]
async fn test_feeder_cycle_vision_failure_stops_before_upload() {
    let controller = SimulatedController::new();
    controller.script(&["Move to Feeder done!", "Take a Photo!"]);
    let link = link_for(&controller);

    let result = link
        .feeder_cycle(NotchJob::new(3), Vision::failing("no joint in frame"))
        .await;

    assert!(result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    assert_eq!(result.first_failure_index, Some(1));
    let step = result.failed_step().unwrap();
    assert_eq!(step.state, StepState::CollaboratorFailed);
    assert!(step.wait.as_ref().unwrap().success);
    assert!(step.error_message.as_deref().unwrap().contains("no joint in frame"));
    assert_eq!(controller.dispatched().len(), 1);
}

#[tokio::test]
async fn test_feeder_cycle_rejects_malformed_vision_output() {
    let controller = SimulatedController::new();
    controller.script(&["Move to Feeder done!", "Take a Photo!"]);
    let link = link_for(&controller);

    let result = link
        .feeder_cycle(NotchJob::new(1), Vision::returning(json!([{ "vector_mm": 3 }])))
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::CollaboratorFailed));
    assert_eq!(controller.dispatched().len(), 1);
}

struct PanickingVision;

#[async_trait]
impl Collaborator for PanickingVision {
    async fn invoke(&self, _step: &str, _outcome: &WaitOutcome) -> wordlink_sdk::Result<Value> {
        panic!("vision pipeline bug");
    }
}

#[tokio::test]
async fn test_feeder_cycle_vision_panic_is_an_internal_error() {
    let controller = SimulatedController::new();
    controller.script(&["Move to Feeder done!", "Take a Photo!"]);
    let link = link_for(&controller);

    let result = link
        .feeder_cycle(NotchJob::new(2), Arc::new(PanickingVision))
        .await;

    assert!(!result.ok);
    assert_eq!(result.status, OverallStatus::Error);
    assert_eq!(result.first_failure_index, Some(1));
    let step = result.failed_step().unwrap();
    assert_eq!(step.state, StepState::InternalError);
    assert!(step.wait.as_ref().unwrap().success);
    assert_eq!(controller.dispatched().len(), 1);
}

#[tokio::test]
async fn test_concurrent_workflows_are_serialized() {
    let controller = SimulatedController::new();
    controller.script(&["$HOME done!"]);
    controller.script(&["$HOME done!"]);
    let link = link_for(&controller);

    let (a, b) = tokio::join!(link.move_to_home(), link.move_to_home());

    assert!(a.is_success() && b.is_success());
    assert_ne!(id_of(&a.steps[0]), id_of(&b.steps[0]));

    // Each dispatch is followed by its own search before the next dispatch.
    let kinds: Vec<_> = controller.sent().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds.len(), 4);
    assert_eq!(kinds[0], kinds[2]);
    assert_eq!(kinds[1], kinds[3]);
    assert_ne!(kinds[0], kinds[1]);
}

#[tokio::test]
async fn test_slow_robot_reply_is_found() {
    let controller = SimulatedController::new();
    controller.script_after(std::time::Duration::from_millis(150), &["$HOME done!"]);
    let link = link_for(&controller);

    let result = link.move_to_home().await;

    assert!(result.is_success());
}
