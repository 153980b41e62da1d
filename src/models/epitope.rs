use serde::{Deserialize, Serialize};

pub type EpitopeId = i64;

/// One result record produced by the pipeline for a task.
///
/// The record belongs to exactly one task for its whole life; the owning
/// task is implied by the collection it sits in.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Epitope {
    #[serde(default)]
    pub id: Option<EpitopeId>,
    pub protein_id: String,
    pub sequence: String,
    pub start: u32,
    pub end: u32,
    pub score: f64,
}
