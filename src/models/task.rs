use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use super::epitope::Epitope;
use super::user::UserId;

pub type TaskId = i64;

/// Which pipeline stage(s) a task requests.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Predict,
    Analyze,
    PredictAndAnalyze,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Predict => "PREDICT",
            ActionType::Analyze => "ANALYZE",
            ActionType::PredictAndAnalyze => "PREDICT_AND_ANALYZE",
        }
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PREDICT" => Ok(ActionType::Predict),
            "ANALYZE" => Ok(ActionType::Analyze),
            "PREDICT_AND_ANALYZE" => Ok(ActionType::PredictAndAnalyze),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

// Define task status enum
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Durable configuration and results of one epitope prediction/analysis run.
///
/// Carries no behaviour: required fields are enforced by their types and by
/// the repository at write time. The uploaded FASTA is deliberately absent,
/// see [`crate::models::TaskCreationRequest`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EpitopeTaskData {
    pub id: Option<TaskId>,
    pub task_name: Option<String>,
    pub execution_date: Option<DateTime<Utc>>,
    pub user_id: UserId,
    pub run_name: String,
    pub action: ActionType,
    pub bepipred_min: f64,
    pub bepipred_max: f64,
    pub min_epitope_length: u32,
    pub max_epitope_length: u32,
    pub subcell: String,
    pub interpro: String,
    pub epitope_search: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub epitopes: Vec<Epitope>,
}

impl EpitopeTaskData {
    /// Copy of the task without its result collection, as stored in the task row.
    pub fn row(&self) -> EpitopeTaskData {
        EpitopeTaskData {
            epitopes: Vec::new(),
            ..self.clone()
        }
    }
}
