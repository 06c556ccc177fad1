use crate::{
    auth::{
        policy::{authorize_task, TaskAction},
        AuthenticatedUser,
    },
    error::{AppError, AppResult},
    models::{
        task::ensure_future_due_date, CreateTaskInput, StatusUpdate, Task, TaskQuery, TaskView,
        UpdateTaskInput,
    },
    pagination::Paginated,
    store::{Repository, TaskFilter},
};
use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

fn task_not_found() -> AppError {
    AppError::NotFound("Task not found".into())
}

async fn ensure_assignee_exists(repo: &dyn Repository, assignee: Option<Uuid>) -> AppResult<()> {
    if let Some(id) = assignee {
        if repo.find_user(id).await?.is_none() {
            return Err(AppError::invalid_field("assignedTo", "Assigned user not found"));
        }
    }
    Ok(())
}

async fn list(
    repo: &dyn Repository,
    filter: TaskFilter,
    query: &TaskQuery,
) -> AppResult<Paginated<TaskView>> {
    let page = query.page_request();
    let (tasks, total) = repo.list_tasks(filter, page).await?;
    let now = Utc::now();
    let views = tasks.into_iter().map(|t| t.into_view(now)).collect();
    Ok(Paginated::new(views, page, total))
}

/// Retrieves the tasks visible to the authenticated user.
///
/// By default this is the union of tasks the user created, tasks assigned to
/// them, and public tasks.
///
/// ## Query Parameters:
/// - `status`, `priority` (optional): exact filters.
/// - `search` (optional): case-insensitive substring over title, description and tags.
/// - `scope` (optional): `created`, `assigned` or `public` narrows the union.
/// - `sortBy` / `order` (optional): defaults to `createdAt` / `desc`.
/// - `page` / `limit` (optional): defaults to 1 / 10.
///
/// ## Responses:
/// - `200 OK`: `{ data: [Task], pagination: { page, limit, total, pages } }`.
/// - `400 Bad Request`: malformed query string.
/// - `401 Unauthorized`: missing or invalid token.
#[get("")]
pub async fn get_tasks(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    query: web::Query<TaskQuery>,
) -> Result<impl Responder, AppError> {
    let filter = TaskFilter::from_query(Some(user.id), &query);
    let page = list(repo.get_ref(), filter, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Lists public tasks. No token required; accepts the same filters as `get_tasks`.
#[get("/tasks/public")]
pub async fn get_public_tasks(
    repo: web::Data<dyn Repository>,
    query: web::Query<TaskQuery>,
) -> Result<impl Responder, AppError> {
    let filter = TaskFilter::from_query(None, &query);
    let page = list(repo.get_ref(), filter, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Counts of the tasks the user created or is assigned to, by status and priority.
#[get("/stats")]
pub async fn get_task_stats(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let stats = repo.task_stats(user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// Creates a new task for the authenticated user.
///
/// The creator is always the caller. Defaults: status `pending`, priority
/// `medium`, `isPublic` false.
///
/// ## Responses:
/// - `201 Created`: the new task.
/// - `400 Bad Request`: validation failure, past due date, or unknown assignee.
/// - `401 Unauthorized`: missing or invalid token.
#[post("")]
pub async fn create_task(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    task_data: web::Json<CreateTaskInput>,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let now = Utc::now();
    ensure_future_due_date(task_data.due_date, now)?;
    ensure_assignee_exists(repo.get_ref(), task_data.assigned_to).await?;

    let task = Task::new(task_data.into_inner(), user.id, now);
    let task = repo.insert_task(task).await?;

    log::debug!("Task {} created by {}", task.id, user.id);
    Ok(HttpResponse::Created().json(task.into_view(now)))
}

/// Retrieves a specific task by its ID.
///
/// ## Responses:
/// - `200 OK`: the task, if the caller created it, is assigned to it, or it is public.
/// - `403 Forbidden`: the task is private and the caller is neither creator nor assignee.
/// - `404 Not Found`: no task with this id, or the id is malformed.
#[get("/{id}")]
pub async fn get_task(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    task_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let task = repo
        .find_task(task_id.into_inner())
        .await?
        .ok_or_else(task_not_found)?;
    authorize_task(Some(&user), TaskAction::View, &task)?;

    Ok(HttpResponse::Ok().json(task.into_view(Utc::now())))
}

/// Full edit of a task. Only the creator may do this; `createdBy` never changes.
///
/// ## Responses:
/// - `200 OK`: the updated task.
/// - `400 Bad Request`: validation failure, past due date, or unknown assignee.
/// - `403 Forbidden`: the caller is not the creator.
/// - `404 Not Found`: no task with this id.
#[put("/{id}")]
pub async fn update_task(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    task_id: web::Path<Uuid>,
    task_data: web::Json<UpdateTaskInput>,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let mut task = repo
        .find_task(task_id.into_inner())
        .await?
        .ok_or_else(task_not_found)?;
    authorize_task(Some(&user), TaskAction::Edit, &task)?;

    let now = Utc::now();
    if let Some(due_date) = task_data.due_date {
        ensure_future_due_date(due_date, now)?;
    }
    if let Some(assignee) = task_data.assigned_to {
        ensure_assignee_exists(repo.get_ref(), assignee).await?;
    }

    task.apply_update(task_data.into_inner(), now);
    let task = repo.save_task(task).await?.ok_or_else(task_not_found)?;

    Ok(HttpResponse::Ok().json(task.into_view(now)))
}

/// Status-only update, open to the creator and the assignee.
#[patch("/{id}/status")]
pub async fn update_task_status(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    task_id: web::Path<Uuid>,
    body: web::Json<StatusUpdate>,
) -> Result<impl Responder, AppError> {
    let mut task = repo
        .find_task(task_id.into_inner())
        .await?
        .ok_or_else(task_not_found)?;
    authorize_task(Some(&user), TaskAction::UpdateStatus, &task)?;

    let now = Utc::now();
    task.set_status(body.status, now);
    let task = repo.save_task(task).await?.ok_or_else(task_not_found)?;

    Ok(HttpResponse::Ok().json(task.into_view(now)))
}

/// Deletes a task. Only the creator may do this.
#[delete("/{id}")]
pub async fn delete_task(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(user): AuthenticatedUser,
    task_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let task = repo
        .find_task(task_id.into_inner())
        .await?
        .ok_or_else(task_not_found)?;
    authorize_task(Some(&user), TaskAction::Delete, &task)?;

    if !repo.delete_task(task.id).await? {
        return Err(task_not_found());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Task deleted successfully" })))
}
