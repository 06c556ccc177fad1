use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{like_pattern, Repository, TaskFilter, UserFilter};
use crate::error::AppResult;
use crate::models::{SortField, SortOrder, Task, TaskScope, TaskStats, User};
use crate::pagination::PageRequest;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, \
     is_active, last_login_at, created_at, updated_at";

const TASK_COLUMNS: &str = "id, title, description, status, priority, due_date, completed_at, \
     tags, assigned_to, created_by, is_public, created_at, updated_at";

/// PostgreSQL backend. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE TRUE");
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_task_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    qb.push(" WHERE ");
    match (filter.effective_scope(), filter.viewer) {
        (TaskScope::Created, Some(me)) => {
            qb.push("created_by = ").push_bind(me);
        }
        (TaskScope::Assigned, Some(me)) => {
            qb.push("assigned_to = ").push_bind(me);
        }
        (TaskScope::All, Some(me)) => {
            qb.push("(created_by = ")
                .push_bind(me)
                .push(" OR assigned_to = ")
                .push_bind(me)
                .push(" OR is_public)");
        }
        _ => {
            qb.push("is_public");
        }
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

fn order_clause(sort_by: SortField, order: SortOrder) -> String {
    let column = match sort_by {
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::DueDate => "due_date",
        SortField::Priority => "priority",
        SortField::Title => "LOWER(title)",
    };
    let direction = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    format!(" ORDER BY {} {}, id {}", column, direction, direction)
}

impl Repository for PgRepository {
    fn ping(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }

    fn insert_user(&self, user: User) -> BoxFuture<'_, AppResult<User>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO users ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 RETURNING {cols}",
                cols = USER_COLUMNS
            );
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(user.id)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.role)
                .bind(user.is_active)
                .bind(user.last_login_at)
                .bind(user.created_at)
                .bind(user.updated_at)
                .fetch_one(&self.pool)
                .await?;
            Ok(user)
        })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<User>>> {
        Box::pin(async move {
            let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        })
    }

    fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<Option<User>>> {
        Box::pin(async move {
            let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        })
    }

    fn find_user_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<User>>> {
        Box::pin(async move {
            let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        })
    }

    fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<User>, i64)>> {
        Box::pin(async move {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
            push_user_filters(&mut count, &filter);
            let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

            let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
            push_user_filters(&mut select, &filter);
            select
                .push(" ORDER BY created_at ASC, id ASC LIMIT ")
                .push_bind(page.limit)
                .push(" OFFSET ")
                .push_bind(page.offset());
            let users = select.build_query_as::<User>().fetch_all(&self.pool).await?;

            Ok((users, total))
        })
    }

    fn save_user(&self, user: User) -> BoxFuture<'_, AppResult<Option<User>>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE users SET username = $1, email = $2, password_hash = $3, first_name = $4, \
                 last_name = $5, role = $6, is_active = $7, last_login_at = $8, updated_at = $9 \
                 WHERE id = $10 RETURNING {}",
                USER_COLUMNS
            );
            let saved = sqlx::query_as::<_, User>(&sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.role)
                .bind(user.is_active)
                .bind(user.last_login_at)
                .bind(user.updated_at)
                .bind(user.id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(saved)
        })
    }

    // Created tasks go with the user (ON DELETE CASCADE); assignments are
    // cleared by ON DELETE SET NULL.
    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn insert_task(&self, task: Task) -> BoxFuture<'_, AppResult<Task>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO tasks ({cols}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 RETURNING {cols}",
                cols = TASK_COLUMNS
            );
            let task = sqlx::query_as::<_, Task>(&sql)
                .bind(task.id)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.status)
                .bind(task.priority)
                .bind(task.due_date)
                .bind(task.completed_at)
                .bind(&task.tags)
                .bind(task.assigned_to)
                .bind(task.created_by)
                .bind(task.is_public)
                .bind(task.created_at)
                .bind(task.updated_at)
                .fetch_one(&self.pool)
                .await?;
            Ok(task)
        })
    }

    fn find_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<Task>>> {
        Box::pin(async move {
            let sql = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
            let task = sqlx::query_as::<_, Task>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(task)
        })
    }

    fn list_tasks(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<Task>, i64)>> {
        Box::pin(async move {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks");
            push_task_filters(&mut count, &filter);
            let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

            let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
            push_task_filters(&mut select, &filter);
            select
                .push(order_clause(filter.sort_by, filter.order))
                .push(" LIMIT ")
                .push_bind(page.limit)
                .push(" OFFSET ")
                .push_bind(page.offset());
            let tasks = select.build_query_as::<Task>().fetch_all(&self.pool).await?;

            Ok((tasks, total))
        })
    }

    // created_by is immutable and not part of the SET list.
    fn save_task(&self, task: Task) -> BoxFuture<'_, AppResult<Option<Task>>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE tasks SET title = $1, description = $2, status = $3, priority = $4, \
                 due_date = $5, completed_at = $6, tags = $7, assigned_to = $8, is_public = $9, \
                 updated_at = $10 WHERE id = $11 RETURNING {}",
                TASK_COLUMNS
            );
            let saved = sqlx::query_as::<_, Task>(&sql)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.status)
                .bind(task.priority)
                .bind(task.due_date)
                .bind(task.completed_at)
                .bind(&task.tags)
                .bind(task.assigned_to)
                .bind(task.is_public)
                .bind(task.updated_at)
                .bind(task.id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(saved)
        })
    }

    fn delete_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn task_stats(&self, user_id: Uuid, now: DateTime<Utc>) -> BoxFuture<'_, AppResult<TaskStats>> {
        Box::pin(async move {
            let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), \
                 COUNT(*) FILTER (WHERE due_date < $2 AND status <> 'completed'), \
                 COUNT(*) FILTER (WHERE status = 'pending'), \
                 COUNT(*) FILTER (WHERE status = 'in-progress'), \
                 COUNT(*) FILTER (WHERE status = 'completed'), \
                 COUNT(*) FILTER (WHERE status = 'cancelled'), \
                 COUNT(*) FILTER (WHERE priority = 'low'), \
                 COUNT(*) FILTER (WHERE priority = 'medium'), \
                 COUNT(*) FILTER (WHERE priority = 'high'), \
                 COUNT(*) FILTER (WHERE priority = 'urgent') \
                 FROM tasks WHERE created_by = $1 OR assigned_to = $1",
            )
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

            let mut stats = TaskStats {
                total: row.0,
                overdue: row.1,
                ..Default::default()
            };
            stats.by_status.pending = row.2;
            stats.by_status.in_progress = row.3;
            stats.by_status.completed = row.4;
            stats.by_status.cancelled = row.5;
            stats.by_priority.low = row.6;
            stats.by_priority.medium = row.7;
            stats.by_priority.high = row.8;
            stats.by_priority.urgent = row.9;
            Ok(stats)
        })
    }
}
