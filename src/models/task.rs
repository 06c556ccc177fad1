use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};
use crate::pagination::{deserialize_optional_i64, PageRequest};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LENGTH: usize = 30;

/// Represents the priority of a task.
/// Corresponds to the `task_priority` SQL enum; variants are declared in ascending order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Represents the status of a task.
/// Corresponds to the `task_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task is yet to be started.
    #[default]
    Pending,
    /// Task is currently being worked on.
    InProgress,
    /// Task is done. Only this status carries a completion timestamp.
    Completed,
    /// Task was abandoned.
    Cancelled,
}

/// Represents a task entity as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub assigned_to: Option<Uuid>,
    /// The creator. Never changes after insertion.
    pub created_by: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task as returned by the API, with the derived fields filled in.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub is_overdue: bool,
    pub age_in_days: i64,
}

/// Payload of `POST /api/tasks`.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskInput {
    #[validate(custom = "validate_title")]
    pub title: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(custom = "validate_tags")]
    pub tags: Option<Vec<String>>,
    pub assigned_to: Option<Uuid>,
    pub is_public: Option<bool>,
}

/// Payload of `PUT /api/tasks/{id}`. Absent fields are left untouched.
///
/// `dueDate` and `assignedTo` accept an explicit `null` to clear them; an empty
/// `description` clears the description. `createdBy` is not part of the payload,
/// so sending it has no effect.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskInput {
    #[validate(custom = "validate_title")]
    pub title: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[validate(custom = "validate_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
    pub is_public: Option<bool>,
}

/// Payload of `PATCH /api/tasks/{id}/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: TaskStatus,
}

/// Which slice of the caller's visible tasks a listing covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskScope {
    /// Created by, assigned to, or public.
    #[default]
    All,
    Created,
    Assigned,
    Public,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
    Title,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query parameters for filtering tasks when listing them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive substring matched against title, description, and tags.
    pub search: Option<String>,
    pub scope: Option<TaskScope>,
    pub sort_by: Option<SortField>,
    pub order: Option<SortOrder>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub limit: Option<i64>,
}

impl TaskQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    #[serde(rename = "in-progress")]
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub urgent: i64,
}

/// Aggregate counts over the tasks a user created or is assigned to.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: i64,
    pub overdue: i64,
    pub by_status: StatusCounts,
    pub by_priority: PriorityCounts,
}

impl TaskStats {
    pub fn record(&mut self, task: &Task, now: DateTime<Utc>) {
        self.total += 1;
        if task.is_overdue(now) {
            self.overdue += 1;
        }
        match task.status {
            TaskStatus::Pending => self.by_status.pending += 1,
            TaskStatus::InProgress => self.by_status.in_progress += 1,
            TaskStatus::Completed => self.by_status.completed += 1,
            TaskStatus::Cancelled => self.by_status.cancelled += 1,
        }
        match task.priority {
            TaskPriority::Low => self.by_priority.low += 1,
            TaskPriority::Medium => self.by_priority.medium += 1,
            TaskPriority::High => self.by_priority.high += 1,
            TaskPriority::Urgent => self.by_priority.urgent += 1,
        }
    }
}

impl Task {
    /// Creates a new `Task` owned by `creator`, applying the field defaults.
    pub fn new(input: CreateTaskInput, creator: Uuid, now: DateTime<Utc>) -> Self {
        let mut task = Self {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            description: input.description.and_then(non_blank),
            status: TaskStatus::Pending,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date,
            completed_at: None,
            tags: normalize_tags(input.tags.unwrap_or_default()),
            assigned_to: input.assigned_to,
            created_by: creator,
            is_public: input.is_public.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        task.set_status(input.status.unwrap_or_default(), now);
        task
    }

    /// Changes the status, keeping `completed_at` in step: it is stamped when the
    /// task moves into `completed` and cleared when it moves anywhere else.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        match status {
            TaskStatus::Completed => {
                if self.status != TaskStatus::Completed || self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            _ => self.completed_at = None,
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Applies a full edit. The creator field is never touched.
    pub fn apply_update(&mut self, input: UpdateTaskInput, now: DateTime<Utc>) {
        if let Some(title) = input.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = input.description {
            self.description = non_blank(description);
        }
        if let Some(priority) = input.priority {
            self.priority = priority;
        }
        if let Some(due_date) = input.due_date {
            self.due_date = due_date;
        }
        if let Some(tags) = input.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(assigned_to) = input.assigned_to {
            self.assigned_to = assigned_to;
        }
        if let Some(is_public) = input.is_public {
            self.is_public = is_public;
        }
        if let Some(status) = input.status {
            self.set_status(status, now);
        }
        self.updated_at = now;
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due < now && self.status != TaskStatus::Completed,
            None => false,
        }
    }

    /// Whole days elapsed since creation.
    pub fn age_in_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }

    pub fn into_view(self, now: DateTime<Utc>) -> TaskView {
        TaskView {
            is_overdue: self.is_overdue(now),
            age_in_days: self.age_in_days(now),
            task: self,
        }
    }
}

/// Rejects due dates that are not strictly in the future.
pub fn ensure_future_due_date(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AppResult<()> {
    match due_date {
        Some(due) if due <= now => Err(AppError::invalid_field(
            "dueDate",
            "Due date must be in the future",
        )),
        _ => Ok(()),
    }
}

/// Trims every tag and drops empty entries and duplicates, keeping order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Checks the title as it will be stored, i.e. trimmed.
fn validate_title(value: &str) -> Result<(), ValidationError> {
    let title = value.trim();
    if title.is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(Cow::from("Title is required"));
        return Err(err);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        let mut err = ValidationError::new("length");
        err.message = Some(Cow::from(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
        return Err(err);
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        let mut err = ValidationError::new("too_many_tags");
        err.message = Some(Cow::from(format!("A task cannot have more than {} tags", MAX_TAGS)));
        return Err(err);
    }
    if tags.iter().any(|t| t.trim().chars().count() > MAX_TAG_LENGTH) {
        let mut err = ValidationError::new("tag_length");
        err.message = Some(Cow::from(format!(
            "Tags cannot exceed {} characters",
            MAX_TAG_LENGTH
        )));
        return Err(err);
    }
    Ok(())
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn input(title: &str) -> CreateTaskInput {
        CreateTaskInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_task_defaults() {
        let creator = Uuid::new_v4();
        let task = Task::new(input("  Write report "), creator, Utc::now());

        assert_eq!(task.title, "Write report");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(!task.is_public);
        assert_eq!(task.created_by, creator);
        assert!(task.assigned_to.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.tags.is_empty());
    }

    #[test]
    fn test_created_as_completed_is_stamped() {
        let now = Utc::now();
        let task = Task::new(
            CreateTaskInput {
                status: Some(TaskStatus::Completed),
                ..input("Done already")
            },
            Uuid::new_v4(),
            now,
        );
        assert_eq!(task.completed_at, Some(now));
    }

    #[test]
    fn test_completion_timestamp_follows_status() {
        let now = Utc::now();
        let mut task = Task::new(input("Ship it"), Uuid::new_v4(), now);

        let done_at = now + Duration::hours(1);
        task.set_status(TaskStatus::Completed, done_at);
        assert_eq!(task.completed_at, Some(done_at));

        // Re-saving as completed keeps the original stamp.
        task.set_status(TaskStatus::Completed, done_at + Duration::hours(1));
        assert_eq!(task.completed_at, Some(done_at));

        task.set_status(TaskStatus::InProgress, done_at + Duration::hours(2));
        assert_eq!(task.completed_at, None);

        task.set_status(TaskStatus::Completed, done_at + Duration::hours(3));
        task.set_status(TaskStatus::Cancelled, done_at + Duration::hours(4));
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn test_apply_update_keeps_creator_and_clears_nullables() {
        let now = Utc::now();
        let creator = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let mut task = Task::new(
            CreateTaskInput {
                description: Some("old".into()),
                due_date: Some(now + Duration::days(2)),
                assigned_to: Some(assignee),
                ..input("Original")
            },
            creator,
            now,
        );

        let update: UpdateTaskInput = serde_json::from_value(serde_json::json!({
            "title": "Renamed",
            "description": "",
            "dueDate": null,
            "assignedTo": null,
            "createdBy": Uuid::new_v4(),
            "status": "completed",
            "tags": [" a ", "b", "a", ""]
        }))
        .unwrap();
        task.apply_update(update, now + Duration::minutes(1));

        assert_eq!(task.title, "Renamed");
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.assigned_to, None);
        assert_eq!(task.created_by, creator);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_absent_fields_are_untouched() {
        let now = Utc::now();
        let assignee = Uuid::new_v4();
        let mut task = Task::new(
            CreateTaskInput {
                assigned_to: Some(assignee),
                ..input("Keep me")
            },
            Uuid::new_v4(),
            now,
        );
        let update: UpdateTaskInput =
            serde_json::from_value(serde_json::json!({ "priority": "urgent" })).unwrap();
        task.apply_update(update, now);

        assert_eq!(task.assigned_to, Some(assignee));
        assert_eq!(task.priority, TaskPriority::Urgent);
        assert_eq!(task.title, "Keep me");
    }

    #[test]
    fn test_overdue_and_age() {
        let now = Utc::now();
        let mut task = Task::new(input("Late"), Uuid::new_v4(), now - Duration::days(3));
        task.due_date = Some(now - Duration::hours(1));
        assert!(task.is_overdue(now));
        assert_eq!(task.age_in_days(now), 3);

        task.set_status(TaskStatus::Completed, now);
        assert!(!task.is_overdue(now));

        task.set_status(TaskStatus::Cancelled, now);
        assert!(task.is_overdue(now));

        let view = task.into_view(now);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["isOverdue"], true);
        assert_eq!(json["ageInDays"], 3);
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["isPublic"], false);
    }

    #[test]
    fn test_task_validation() {
        assert!(input("Valid").validate().is_ok());
        assert!(input("").validate().is_err());
        assert!(input("   ").validate().is_err());
        assert!(input(&"a".repeat(101)).validate().is_err());
        // Surrounding whitespace does not count towards the limit
        assert!(input(&format!("  {}  ", "a".repeat(100))).validate().is_ok());
        let update = UpdateTaskInput {
            title: Some(format!(" {} ", "a".repeat(100))),
            ..Default::default()
        };
        assert!(update.validate().is_ok());

        let long_description = CreateTaskInput {
            description: Some("b".repeat(501)),
            ..input("Valid")
        };
        assert!(long_description.validate().is_err());

        let long_tag = CreateTaskInput {
            tags: Some(vec!["x".repeat(31)]),
            ..input("Valid")
        };
        assert!(long_tag.validate().is_err());

        let too_many = CreateTaskInput {
            tags: Some((0..21).map(|i| i.to_string()).collect()),
            ..input("Valid")
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_due_date_must_be_future() {
        let now = Utc::now();
        assert!(ensure_future_due_date(None, now).is_ok());
        assert!(ensure_future_due_date(Some(now + Duration::minutes(1)), now).is_ok());
        assert!(ensure_future_due_date(Some(now), now).is_err());
        assert!(ensure_future_due_date(Some(now - Duration::days(1)), now).is_err());
    }

    #[test]
    fn test_status_wire_names() {
        let status: TaskStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(status, TaskStatus::InProgress);
        assert!(serde_json::from_str::<TaskStatus>("\"done\"").is_err());
        assert!(TaskPriority::Urgent > TaskPriority::High);
    }
}
