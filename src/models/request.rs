use bio::io::fasta;
use bytes::Bytes;
use chrono::Utc;
use super::task::{ActionType, EpitopeTaskData, TaskStatus};
use super::user::UserId;
use crate::errors::{AppError, AppResult};

/// Uploaded sequence file. Lives only for the request that creates the task
/// and the pipeline run that consumes it; it is never written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FastaPayload {
    pub filename: Option<String>,
    pub content: Bytes,
}

impl FastaPayload {
    pub fn new(filename: Option<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename,
            content: content.into(),
        }
    }

    /// Parses every record, failing on the first malformed one.
    pub fn records(&self) -> AppResult<Vec<fasta::Record>> {
        let reader = fasta::Reader::new(&self.content[..]);
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| AppError::Upload(format!("Malformed FASTA: {}", e)))?;
            record
                .check()
                .map_err(|e| AppError::Upload(format!("Invalid FASTA record: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Everything a caller submits to start a task, including the transient file.
#[derive(Debug, Clone)]
pub struct TaskCreationRequest {
    pub task_name: Option<String>,
    pub run_name: String,
    pub action: ActionType,
    pub bepipred_min: f64,
    pub bepipred_max: f64,
    pub min_epitope_length: u32,
    pub max_epitope_length: u32,
    pub subcell: String,
    pub interpro: String,
    pub epitope_search: String,
    pub fasta: FastaPayload,
}

impl TaskCreationRequest {
    /// Consumes the request, splitting it into the durable task configuration
    /// owned by `owner` and the payload handed to the pipeline.
    pub fn into_task(self, owner: UserId) -> AppResult<(EpitopeTaskData, FastaPayload)> {
        if self.run_name.trim().is_empty() {
            return Err(AppError::Validation("run_name must not be blank".into()));
        }
        if self.bepipred_min.is_nan()
            || self.bepipred_max.is_nan()
            || self.bepipred_min > self.bepipred_max
        {
            return Err(AppError::Validation(format!(
                "bepipred_min ({}) must not exceed bepipred_max ({})",
                self.bepipred_min, self.bepipred_max
            )));
        }
        if self.min_epitope_length == 0 || self.min_epitope_length > self.max_epitope_length {
            return Err(AppError::Validation(format!(
                "epitope length bounds must satisfy 1 <= min ({}) <= max ({})",
                self.min_epitope_length, self.max_epitope_length
            )));
        }

        let records = self.fasta.records()?;
        if records.is_empty() {
            return Err(AppError::Upload("FASTA file contains no sequences".into()));
        }
        tracing::debug!(
            "Accepted FASTA {:?} with {} record(s)",
            self.fasta.filename,
            records.len()
        );

        let task = EpitopeTaskData {
            id: None,
            task_name: self.task_name,
            execution_date: Some(Utc::now()),
            user_id: owner,
            run_name: self.run_name,
            action: self.action,
            bepipred_min: self.bepipred_min,
            bepipred_max: self.bepipred_max,
            min_epitope_length: self.min_epitope_length,
            max_epitope_length: self.max_epitope_length,
            subcell: self.subcell,
            interpro: self.interpro,
            epitope_search: self.epitope_search,
            status: TaskStatus::Queued,
            epitopes: Vec::new(),
        };
        Ok((task, self.fasta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fasta: &'static str) -> TaskCreationRequest {
        TaskCreationRequest {
            task_name: Some("spike scan".into()),
            run_name: "run-1".into(),
            action: ActionType::Predict,
            bepipred_min: 0.5,
            bepipred_max: 0.9,
            min_epitope_length: 8,
            max_epitope_length: 20,
            subcell: "Secreted".into(),
            interpro: "IPR000001".into(),
            epitope_search: String::new(),
            fasta: FastaPayload::new(Some("spike.fasta".into()), fasta),
        }
    }

    #[test]
    fn request_splits_into_task_and_payload() {
        let (task, payload) = request(">p1\nMKTAYIAKQR\n>p2\nGGSLLV\n").into_task(7).unwrap();
        assert_eq!(task.id, None);
        assert_eq!(task.user_id, 7);
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.execution_date.is_some());
        assert!(task.epitopes.is_empty());
        assert_eq!(payload.records().unwrap().len(), 2);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut req = request(">p1\nMKT\n");
        req.bepipred_min = 0.95;
        assert!(matches!(req.into_task(1), Err(AppError::Validation(_))));

        let mut req = request(">p1\nMKT\n");
        req.min_epitope_length = 30;
        assert!(matches!(req.into_task(1), Err(AppError::Validation(_))));
    }

    #[test]
    fn blank_run_name_is_rejected() {
        let mut req = request(">p1\nMKT\n");
        req.run_name = "  ".into();
        assert!(matches!(req.into_task(1), Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_or_garbage_upload_is_rejected() {
        assert!(matches!(request("").into_task(1), Err(AppError::Upload(_))));
        assert!(matches!(request("not a fasta").into_task(1), Err(AppError::Upload(_))));
    }
}
