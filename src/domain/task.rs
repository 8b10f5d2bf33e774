//! Task lifecycle types (§3): `Task`, `TaskState`'s finite states,
//! `OperatorResponse`, and `ConsensusResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::geo::GeoPoint;
use crate::domain::observation::Observation;
use crate::helpers::hex_bytes;

pub type TaskId = String;
pub type OperatorId = String;
pub type SourceId = String;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: TaskId,
    pub point: GeoPoint,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    pub chain_id: Option<String>,
}

/// The finite states a task moves through. Monotonic — no re-entry once a
/// terminal state (`Completed`/`Failed`) is reached (§3, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Distributed,
    Executing,
    Aggregating,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether `self -> next` is a legal transition in the monotonic FSM
    /// (§3's `Pending -> Distributed -> Executing -> Aggregating ->
    /// (Completed | Failed)`).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Distributed)
                | (Distributed, Executing)
                | (Executing, Aggregating)
                | (Aggregating, Completed)
                | (Aggregating, Failed)
                // tryAggregate is idempotent: re-entering Aggregating while
                // already there, or failing straight out of Executing/
                // Distributed when a deadline elapses, are both legal.
                | (Executing, Failed)
                | (Distributed, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A single operator's submitted observations for one task (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OperatorResponse {
    pub operator_id: OperatorId,
    pub task_id: TaskId,
    pub observations: Vec<Observation>,
    #[serde(with = "hex_bytes")]
    #[schema(value_type = String)]
    pub signature: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// The pure output of the consensus engine (§4.3), attached to a task once
/// it reaches `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsensusResult {
    pub task_id: TaskId,
    pub value: f64,
    pub meets_threshold: bool,
    pub confidence: f64,
    pub kept_observations: Vec<Observation>,
    #[serde(with = "hex_bytes")]
    #[schema(value_type = String)]
    pub aggregated_sig: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Why a task moved to `Failed` — surfaced to callers (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientResponses,
    InsufficientQuorum,
}

/// The full mutable record the aggregator owns for one task. Mutated only
/// under the aggregator's lock (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskState {
    pub task: Task,
    pub status: TaskStatus,
    pub committed_operators: Vec<OperatorId>,
    pub source_assignments: std::collections::HashMap<OperatorId, Vec<SourceId>>,
    pub responses: Vec<OperatorResponse>,
    pub result: Option<ConsensusResult>,
    pub failure_reason: Option<FailureReason>,
    pub deadline: DateTime<Utc>,
}

impl TaskState {
    pub fn new(task: Task, deadline: DateTime<Utc>) -> Self {
        Self {
            task,
            status: TaskStatus::Pending,
            committed_operators: Vec::new(),
            source_assignments: std::collections::HashMap::new(),
            responses: Vec::new(),
            result: None,
            failure_reason: None,
            deadline,
        }
    }
}
