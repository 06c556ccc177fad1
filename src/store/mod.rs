//! Storage seam between the route handlers and the database.
//!
//! Handlers only ever see `web::Data<dyn Repository>`. [`PgRepository`] is the
//! production backend; [`MemoryRepository`] keeps everything in process and backs
//! the integration tests and `DATABASE_URL=memory://` runs.
//!
//! Mutations follow a load / modify / save cycle: handlers fetch a record, apply
//! the domain change (`Task::set_status`, `User::apply`, ...) and hand the whole
//! record back. Each save touches a single row, which is all the atomicity this
//! service relies on.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    SortField, SortOrder, Task, TaskPriority, TaskQuery, TaskScope, TaskStats, TaskStatus, User,
    UserQuery, UserRole,
};
use crate::pagination::PageRequest;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

pub trait Repository: Send + Sync {
    /// Cheap round trip used by the health check.
    fn ping(&self) -> BoxFuture<'_, AppResult<()>>;

    fn insert_user(&self, user: User) -> BoxFuture<'_, AppResult<User>>;
    fn find_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<User>>>;
    /// `email` must already be normalized.
    fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<Option<User>>>;
    fn find_user_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<User>>>;
    /// Returns one page of matching users (ordered by creation, oldest first) and the total.
    fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<User>, i64)>>;
    /// Overwrites the stored user; `Ok(None)` if it no longer exists.
    fn save_user(&self, user: User) -> BoxFuture<'_, AppResult<Option<User>>>;
    /// Deletes the user together with the tasks they created and unassigns the
    /// tasks assigned to them. Returns whether a user was removed.
    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>>;

    fn insert_task(&self, task: Task) -> BoxFuture<'_, AppResult<Task>>;
    fn find_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<Task>>>;
    fn list_tasks(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<Task>, i64)>>;
    /// Overwrites the stored task; `Ok(None)` if it no longer exists.
    fn save_task(&self, task: Task) -> BoxFuture<'_, AppResult<Option<Task>>>;
    fn delete_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>>;
    /// Counts over the tasks `user_id` created or is assigned to.
    fn task_stats(&self, user_id: Uuid, now: DateTime<Utc>) -> BoxFuture<'_, AppResult<TaskStats>>;
}

/// Filters for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring over username, email, first and last name.
    pub search: Option<String>,
}

impl UserFilter {
    pub fn from_query(query: &UserQuery) -> Self {
        Self {
            role: query.role,
            is_active: query.is_active,
            search: clean_search(query.search.as_deref()),
        }
    }

    pub fn search(term: &str) -> Self {
        Self {
            search: clean_search(Some(term)),
            ..Default::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|role| role != user.role) {
            return false;
        }
        if self.is_active.is_some_and(|active| active != user.is_active) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                [
                    Some(user.username.as_str()),
                    Some(user.email.as_str()),
                    user.first_name.as_deref(),
                    user.last_name.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|value| value.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// Filters for task listings, always relative to a viewer.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// `None` for anonymous callers, who only ever see public tasks.
    pub viewer: Option<Uuid>,
    pub scope: TaskScope,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl TaskFilter {
    pub fn from_query(viewer: Option<Uuid>, query: &TaskQuery) -> Self {
        let scope = match viewer {
            Some(_) => query.scope.unwrap_or_default(),
            None => TaskScope::Public,
        };
        Self {
            viewer,
            scope,
            status: query.status,
            priority: query.priority,
            search: clean_search(query.search.as_deref()),
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.order.unwrap_or_default(),
        }
    }

    /// The effective scope: anonymous callers are always limited to public tasks.
    pub fn effective_scope(&self) -> TaskScope {
        match self.viewer {
            Some(_) => self.scope,
            None => TaskScope::Public,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        let visible = match (self.effective_scope(), self.viewer) {
            (TaskScope::Public, _) => task.is_public,
            (TaskScope::Created, Some(me)) => task.created_by == me,
            (TaskScope::Assigned, Some(me)) => task.assigned_to == Some(me),
            (TaskScope::All, Some(me)) => {
                task.created_by == me || task.assigned_to == Some(me) || task.is_public
            }
            (_, None) => task.is_public,
        };
        if !visible {
            return false;
        }
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                task.title.to_lowercase().contains(&term)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
                    || task.tags.iter().any(|t| t.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

fn clean_search(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Escapes `%`, `_` and `\` so user input is matched literally by `ILIKE`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Fails with 400 if `username` or `email` already belongs to someone other than `except`.
pub async fn ensure_identity_available(
    repo: &dyn Repository,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<Uuid>,
) -> AppResult<()> {
    if let Some(email) = email {
        if let Some(existing) = repo.find_user_by_email(email).await? {
            if Some(existing.id) != except {
                return Err(AppError::BadRequest(
                    "User with this email already exists".into(),
                ));
            }
        }
    }
    if let Some(username) = username {
        if let Some(existing) = repo.find_user_by_username(username).await? {
            if Some(existing.id) != except {
                return Err(AppError::BadRequest("Username already exists".into()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateTaskInput;

    fn task(creator: Uuid, assignee: Option<Uuid>, public: bool) -> Task {
        Task::new(
            CreateTaskInput {
                title: "Quarterly Report".into(),
                description: Some("Numbers for Q3".into()),
                tags: Some(vec!["Finance".into()]),
                assigned_to: assignee,
                is_public: Some(public),
                ..Default::default()
            },
            creator,
            Utc::now(),
        )
    }

    #[test]
    fn test_default_scope_is_union() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let filter = TaskFilter::from_query(Some(me), &TaskQuery::default());

        assert!(filter.matches(&task(me, None, false)));
        assert!(filter.matches(&task(other, Some(me), false)));
        assert!(filter.matches(&task(other, None, true)));
        assert!(!filter.matches(&task(other, None, false)));
    }

    #[test]
    fn test_anonymous_viewer_sees_public_only() {
        let creator = Uuid::new_v4();
        let query = TaskQuery {
            scope: Some(TaskScope::Created),
            ..Default::default()
        };
        let filter = TaskFilter::from_query(None, &query);
        assert_eq!(filter.effective_scope(), TaskScope::Public);
        assert!(filter.matches(&task(creator, None, true)));
        assert!(!filter.matches(&task(creator, None, false)));
    }

    #[test]
    fn test_search_covers_title_description_and_tags() {
        let me = Uuid::new_v4();
        let t = task(me, None, false);
        for term in ["quarterly", "q3", "finance", "  REPORT "] {
            let query = TaskQuery {
                search: Some(term.into()),
                ..Default::default()
            };
            assert!(TaskFilter::from_query(Some(me), &query).matches(&t), "{}", term);
        }
        let query = TaskQuery {
            search: Some("marketing".into()),
            ..Default::default()
        };
        assert!(!TaskFilter::from_query(Some(me), &query).matches(&t));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }
}
