use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use tokio::process::Command;
use crate::config::PipelineConfig;
use crate::errors::worker::{WorkerError, WorkerResult};
use crate::models::{Epitope, EpitopeTaskData, FastaPayload};

/// The prediction/analysis engine, seen from this service.
///
/// Receives a task's configuration and its uploaded sequences and returns
/// the result records to attach. Scoring happens entirely on the other side.
#[async_trait]
pub trait EpitopePipeline: Send + Sync {
    async fn run(&self, task: &EpitopeTaskData, fasta: &FastaPayload) -> WorkerResult<Vec<Epitope>>;
}

/// Runs an external program per task.
///
/// The FASTA is written to a temporary file passed as `--fasta`, followed by
/// one flag per configuration field. The program prints one JSON epitope per
/// line on stdout and exits 0.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn task_flags(task: &EpitopeTaskData) -> Vec<String> {
        vec![
            "--action".into(),
            task.action.as_str().into(),
            "--bepipred-min".into(),
            task.bepipred_min.to_string(),
            "--bepipred-max".into(),
            task.bepipred_max.to_string(),
            "--min-length".into(),
            task.min_epitope_length.to_string(),
            "--max-length".into(),
            task.max_epitope_length.to_string(),
            "--subcell".into(),
            task.subcell.clone(),
            "--interpro".into(),
            task.interpro.clone(),
            "--search".into(),
            task.epitope_search.clone(),
        ]
    }
}

fn parse_results(stdout: &[u8]) -> WorkerResult<Vec<Epitope>> {
    let text = String::from_utf8_lossy(stdout);
    let mut epitopes = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut epitope: Epitope = serde_json::from_str(line).map_err(|e| {
            WorkerError::Pipeline(format!("unreadable result on line {}: {}", n + 1, e))
        })?;
        // Ids are assigned by storage.
        epitope.id = None;
        epitopes.push(epitope);
    }
    Ok(epitopes)
}

#[async_trait]
impl EpitopePipeline for CommandPipeline {
    async fn run(&self, task: &EpitopeTaskData, fasta: &FastaPayload) -> WorkerResult<Vec<Epitope>> {
        let mut input = tempfile::Builder::new()
            .prefix("epibuilder-")
            .suffix(".fasta")
            .tempfile()?;
        input.write_all(&fasta.content)?;
        input.flush()?;

        tracing::debug!(
            "Running {} for task {:?} on {}",
            self.program,
            task.id,
            input.path().display()
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--fasta")
            .arg(input.path())
            .args(Self::task_flags(task))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::Pipeline(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_results(&output.stdout)
    }
}
