// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Named robot operations built on [`Workflow`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use wordlink_protocol::KeySequence;

use crate::client::RobotLink;
use crate::error::{Result, SdkError};
use crate::types::{WaitOutcome, WorkflowResult};
use crate::workflow::{Collaborator, StepContext, StepSpec, Workflow};

pub const HOME_DONE: &str = "$HOME done!";
pub const FEEDER_DONE: &str = "Move to Feeder done!";
pub const TAKE_PHOTO: &str = "Take a Photo!";
pub const NOTCHES_DONE: &str = "Troqueles hechos!";

pub const MOVE_TO_HOME_STEP: &str = "move_to_home";
pub const MOVE_TO_FEEDER_STEP: &str = "move_to_feeder";
pub const TAKE_PHOTO_STEP: &str = "take_photo";
pub const UPLOAD_NOTCHES_STEP: &str = "upload_notches";

const HOME_TIMEOUT: Duration = Duration::from_secs(10);
const FEEDER_TIMEOUT: Duration = Duration::from_secs(30);

/// State machine value that sends the robot to the feeder.
const STATE_MOVE_TO_FEEDER: u32 = 10;
/// State machine value that starts notching with the uploaded matrix.
const STATE_NOTCHING: u32 = 40;
/// Z offset in tenths of a millimetre for a joint of zero height.
const DZ_BASE: i64 = 2200;
/// Fallback address of the notch matrix when the descriptor lacks it.
const NOTCH_MATRIX_DEFAULT: u32 = 31;

/// Parameters of one feeder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotchJob {
    pub notch_count: u32,
    /// Measured joint height; unknown or zero leaves dZ at 0.
    #[serde(default)]
    pub joint_height_mm: Option<f64>,
}

impl NotchJob {
    pub fn new(notch_count: u32) -> Self {
        Self {
            notch_count,
            joint_height_mm: None,
        }
    }

    pub fn with_joint_height_mm(mut self, height: f64) -> Self {
        self.joint_height_mm = Some(height);
        self
    }

    /// Value written to dZ.
    pub fn dz(&self) -> i64 {
        match self.joint_height_mm {
            Some(height) if height != 0.0 => DZ_BASE - tenths(height),
            _ => 0,
        }
    }
}

/// One notch position reported by the vision pipeline, in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryVector {
    #[serde(default, alias = "segmento")]
    pub segment: Option<String>,
    #[serde(alias = "centro_mm")]
    pub vector_mm: [f64; 2],
}

impl TrajectoryVector {
    pub fn new(x_mm: f64, y_mm: f64) -> Self {
        Self {
            segment: None,
            vector_mm: [x_mm, y_mm],
        }
    }

    /// X and Y in tenths of a millimetre.
    pub fn tenths(&self) -> (i64, i64) {
        (tenths(self.vector_mm[0]), tenths(self.vector_mm[1]))
    }
}

fn tenths(mm: f64) -> i64 {
    (mm * 10.0).round() as i64
}

/// Read trajectory vectors from a vision result, either a bare array or an
/// object with a `trajectory_vectors` field.
pub fn parse_trajectory(value: &Value) -> Result<Vec<TrajectoryVector>> {
    let vectors = match value {
        Value::Object(map) => map
            .get("trajectory_vectors")
            .cloned()
            .unwrap_or(Value::Array(Vec::new())),
        other => other.clone(),
    };
    serde_json::from_value(vectors)
        .map_err(|e| SdkError::Collaborator(format!("invalid trajectory vectors: {}", e)))
}

/// Normalizes the vision pipeline's output into a list of
/// [`TrajectoryVector`]s so a malformed result fails the photo step.
struct VisionStage {
    vision: Arc<dyn Collaborator>,
}

#[async_trait]
impl Collaborator for VisionStage {
    async fn invoke(&self, step: &str, outcome: &WaitOutcome) -> Result<Value> {
        let raw = self.vision.invoke(step, outcome).await?;
        let vectors = parse_trajectory(&raw)?;
        info!(vectors = vectors.len(), "vision result received");
        serde_json::to_value(vectors).map_err(|e| SdkError::Collaborator(e.to_string()))
    }
}

/// `ID_COM := id`, `MOVE_TO_HOME := 1`, expecting `$HOME done!`.
pub fn move_to_home_workflow() -> Workflow {
    Workflow::new("move_to_home").step(
        StepSpec::dispatch(MOVE_TO_HOME_STEP, |ctx| {
            ctx.builder.concat([
                ctx.assign("ID_COM", ctx.correlation_id)?,
                ctx.assign("MOVE_TO_HOME", 1)?,
            ])
        })
        .expect(HOME_DONE)
        .with_wait_timeout(HOME_TIMEOUT),
    )
}

/// Move to the feeder, photograph the joint, then upload the notch matrix.
///
/// The controller writes `Move to Feeder done!` and `Take a Photo!` under
/// consecutive ids after the first dispatch, and `Troqueles hechos!` under
/// the id after that once the matrix is uploaded.
pub fn feeder_cycle_workflow(job: NotchJob, vision: Arc<dyn Collaborator>) -> Workflow {
    Workflow::new("feeder_cycle")
        .step(
            StepSpec::dispatch(MOVE_TO_FEEDER_STEP, move |ctx| {
                ctx.builder.concat([
                    ctx.assign("ID_COM", ctx.correlation_id)?,
                    ctx.assign("MAQUINA_ESTADOS", STATE_MOVE_TO_FEEDER)?,
                    ctx.assign("CANTIDAD_MUESCAS", job.notch_count)?,
                    ctx.assign("dZ", job.dz())?,
                ])
            })
            .expect(FEEDER_DONE)
            .with_wait_timeout(FEEDER_TIMEOUT),
        )
        .step(
            StepSpec::wait_only(TAKE_PHOTO_STEP)
                .expect(TAKE_PHOTO)
                .with_wait_timeout(FEEDER_TIMEOUT)
                .with_collaborator(Arc::new(VisionStage { vision })),
        )
        .step(
            StepSpec::dispatch(UPLOAD_NOTCHES_STEP, notch_matrix)
                .follow_on()
                .expect(NOTCHES_DONE)
                .with_wait_timeout(FEEDER_TIMEOUT),
        )
}

/// `MAQUINA_ESTADOS := 40`, then X,Y pairs on consecutive words from
/// `MUESCAS_MATRIX_XY`.
fn notch_matrix(ctx: &StepContext<'_>) -> Result<KeySequence> {
    let output = ctx
        .output(TAKE_PHOTO_STEP)
        .ok_or_else(|| SdkError::Collaborator("no vision result".to_string()))?;
    let vectors = parse_trajectory(output)?;
    let base = ctx
        .variables
        .lookup_or_default("MUESCAS_MATRIX_XY", NOTCH_MATRIX_DEFAULT);

    let mut sequence = ctx.assign("MAQUINA_ESTADOS", STATE_NOTCHING)?;
    for (i, vector) in vectors.iter().enumerate() {
        let (x, y) = vector.tenths();
        let address = base + (i as u32) * 2;
        debug!(address, x, y, "notch");
        sequence = sequence
            .append(ctx.builder.build_assignment(address, &x.to_string()))
            .append(ctx.builder.build_assignment(address + 1, &y.to_string()));
    }
    Ok(sequence)
}

impl RobotLink {
    /// Send the robot home and wait for it to report arrival.
    #[instrument(skip(self))]
    pub async fn move_to_home(&self) -> WorkflowResult {
        self.run(&move_to_home_workflow()).await
    }

    /// Run one feeder cycle with `vision` computing the notch positions.
    #[instrument(skip(self, vision), fields(notches = job.notch_count))]
    pub async fn feeder_cycle(
        &self,
        job: NotchJob,
        vision: Arc<dyn Collaborator>,
    ) -> WorkflowResult {
        self.run(&feeder_cycle_workflow(job, vision)).await
    }
}
