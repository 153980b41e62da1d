use axum::{
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tower_sessions::Session;
use std::str::FromStr;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ActionType, EpitopeTaskData, FastaPayload, TaskCreationRequest, TaskId, TaskStatus, User,
};
use crate::worker::PipelineJob;
use super::{auth::current_user, AppState};

// Form fields collected from the multipart body before validation.
#[derive(Default)]
struct UploadData {
    fasta: Option<FastaPayload>,
    task_name: Option<String>,
    run_name: Option<String>,
    action: Option<ActionType>,
    bepipred_min: Option<f64>,
    bepipred_max: Option<f64>,
    min_epitope_length: Option<u32>,
    max_epitope_length: Option<u32>,
    subcell: Option<String>,
    interpro: Option<String>,
    epitope_search: Option<String>,
}

fn required<T>(value: Option<T>, name: &str) -> AppResult<T> {
    value.ok_or_else(|| AppError::Validation(format!("Missing form field: {}", name)))
}

impl UploadData {
    fn into_request(self) -> AppResult<TaskCreationRequest> {
        Ok(TaskCreationRequest {
            fasta: self
                .fasta
                .ok_or_else(|| AppError::Upload("No FASTA file uploaded".into()))?,
            task_name: self.task_name.filter(|name| !name.trim().is_empty()),
            run_name: required(self.run_name, "run_name")?,
            action: required(self.action, "action")?,
            bepipred_min: required(self.bepipred_min, "bepipred_min")?,
            bepipred_max: required(self.bepipred_max, "bepipred_max")?,
            min_epitope_length: required(self.min_epitope_length, "min_epitope_length")?,
            max_epitope_length: required(self.max_epitope_length, "max_epitope_length")?,
            subcell: required(self.subcell, "subcell")?,
            interpro: required(self.interpro, "interpro")?,
            epitope_search: self.epitope_search.unwrap_or_default(),
        })
    }
}

async fn field_text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Upload(format!("Failed to read form field: {}", e)))
}

async fn parse_field_value<T>(field: Field<'_>, name: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = field_text(field).await?;
    text.trim()
        .parse()
        .map_err(|e| AppError::Validation(format!("Invalid value for {}: {}", name, e)))
}

async fn process_multipart_form(multipart: &mut Multipart) -> AppResult<UploadData> {
    let mut data = UploadData::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to get next field from multipart form: {}", e);
        AppError::Upload(format!("Failed to process form field: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "fasta" => {
                let filename = field.file_name().map(str::to_string);
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Upload(format!("Failed to read upload: {}", e)))?;
                tracing::debug!("Received FASTA upload {:?} ({} bytes)", filename, content.len());
                data.fasta = Some(FastaPayload::new(filename, content));
            }
            "task_name" => data.task_name = Some(field_text(field).await?),
            "run_name" => data.run_name = Some(field_text(field).await?),
            "action" => data.action = Some(parse_field_value(field, &name).await?),
            "bepipred_min" => data.bepipred_min = Some(parse_field_value(field, &name).await?),
            "bepipred_max" => data.bepipred_max = Some(parse_field_value(field, &name).await?),
            "min_epitope_length" => {
                data.min_epitope_length = Some(parse_field_value(field, &name).await?)
            }
            "max_epitope_length" => {
                data.max_epitope_length = Some(parse_field_value(field, &name).await?)
            }
            "subcell" => data.subcell = Some(field_text(field).await?),
            "interpro" => data.interpro = Some(field_text(field).await?),
            "epitope_search" => data.epitope_search = Some(field_text(field).await?),
            other => tracing::warn!("Unexpected form field: {}", other),
        }
    }

    Ok(data)
}

/// Tasks are visible to their owner and to administrators only. Anything
/// else reads as missing so ids of other users' tasks are not disclosed.
fn ensure_visible(user: &User, task: &EpitopeTaskData) -> AppResult<()> {
    if user.is_admin() || user.id == Some(task.user_id) {
        Ok(())
    } else {
        Err(AppError::TaskNotFound(task.id.unwrap_or_default()))
    }
}

pub async fn create_task(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    let owner = user
        .id
        .ok_or_else(|| AppError::Auth("Stored user has no id".into()))?;

    let request = process_multipart_form(&mut multipart).await?.into_request()?;
    let (task, fasta) = request.into_task(owner)?;
    let task = state.tasks.save(task).await?;
    let task_id = task
        .id
        .ok_or_else(|| AppError::Validation("Storage returned a task without id".into()))?;

    if let Err(e) = state.jobs.enqueue(PipelineJob { task_id, fasta }).await {
        tracing::error!("Could not queue task {}: {}", task_id, e);
        let mut failed = task;
        failed.status = TaskStatus::Failed;
        state.tasks.update(failed).await?;
        return Err(e.into());
    }

    tracing::info!("Created task {} for user {}", task_id, owner);
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

pub async fn get_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<TaskId>,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    let task = state
        .tasks
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::TaskNotFound(task_id))?;
    ensure_visible(&user, &task)?;

    Ok(Json(task).into_response())
}

pub async fn delete_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<TaskId>,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    tracing::info!("Attempting to delete task {} for user {}", task_id, user.username);

    let task = state
        .tasks
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::TaskNotFound(task_id))?;
    ensure_visible(&user, &task)?;

    if !state.tasks.delete_by_id(task_id).await? {
        return Err(AppError::TaskNotFound(task_id));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
