use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Repository, TaskFilter, UserFilter};
use crate::error::{AppError, AppResult};
use crate::models::{SortField, SortOrder, Task, TaskStats, User};
use crate::pagination::PageRequest;

/// In-process store with the same semantics as the PostgreSQL backend.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    users: RwLock<HashMap<Uuid, User>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflicts(users: &HashMap<Uuid, User>, candidate: &User) -> bool {
    users.values().any(|u| {
        u.id != candidate.id && (u.email == candidate.email || u.username == candidate.username)
    })
}

fn page_of<T>(mut items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let start = usize::try_from(page.offset())
        .unwrap_or(usize::MAX)
        .min(items.len());
    let end = start
        .saturating_add(usize::try_from(page.limit).unwrap_or(usize::MAX))
        .min(items.len());
    (items.drain(start..end).collect(), total)
}

fn compare_tasks(a: &Task, b: &Task, sort_by: SortField) -> Ordering {
    match sort_by {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        // Tasks without a due date sort last, as in PostgreSQL's ascending order.
        SortField::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortField::Priority => a.priority.cmp(&b.priority),
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    }
}

impl Repository for MemoryRepository {
    fn ping(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn insert_user(&self, user: User) -> BoxFuture<'_, AppResult<User>> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            if conflicts(&users, &user) {
                return Err(AppError::BadRequest("User already exists".into()));
            }
            users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<User>>> {
        Box::pin(async move { Ok(self.users.read().await.get(&id).cloned()) })
    }

    fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<Option<User>>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users.values().find(|u| u.email == email).cloned())
        })
    }

    fn find_user_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<User>>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users.values().find(|u| u.username == username).cloned())
        })
    }

    fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<User>, i64)>> {
        Box::pin(async move {
            let users = self.users.read().await;
            let mut matching: Vec<User> =
                users.values().filter(|u| filter.matches(u)).cloned().collect();
            matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(page_of(matching, page))
        })
    }

    fn save_user(&self, user: User) -> BoxFuture<'_, AppResult<Option<User>>> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            if !users.contains_key(&user.id) {
                return Ok(None);
            }
            if conflicts(&users, &user) {
                return Err(AppError::BadRequest("User already exists".into()));
            }
            users.insert(user.id, user.clone());
            Ok(Some(user))
        })
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            let mut tasks = self.tasks.write().await;
            if users.remove(&id).is_none() {
                return Ok(false);
            }
            tasks.retain(|_, t| t.created_by != id);
            for task in tasks.values_mut() {
                if task.assigned_to == Some(id) {
                    task.assigned_to = None;
                }
            }
            Ok(true)
        })
    }

    fn insert_task(&self, task: Task) -> BoxFuture<'_, AppResult<Task>> {
        Box::pin(async move {
            self.tasks.write().await.insert(task.id, task.clone());
            Ok(task)
        })
    }

    fn find_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<Option<Task>>> {
        Box::pin(async move { Ok(self.tasks.read().await.get(&id).cloned()) })
    }

    fn list_tasks(
        &self,
        filter: TaskFilter,
        page: PageRequest,
    ) -> BoxFuture<'_, AppResult<(Vec<Task>, i64)>> {
        Box::pin(async move {
            let tasks = self.tasks.read().await;
            let mut matching: Vec<Task> =
                tasks.values().filter(|t| filter.matches(t)).cloned().collect();
            matching.sort_by(|a, b| {
                let ord = compare_tasks(a, b, filter.sort_by).then(a.id.cmp(&b.id));
                match filter.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
            Ok(page_of(matching, page))
        })
    }

    fn save_task(&self, task: Task) -> BoxFuture<'_, AppResult<Option<Task>>> {
        Box::pin(async move {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&task.id) {
                Some(stored) => {
                    *stored = task.clone();
                    Ok(Some(task))
                }
                None => Ok(None),
            }
        })
    }

    fn delete_task(&self, id: Uuid) -> BoxFuture<'_, AppResult<bool>> {
        Box::pin(async move { Ok(self.tasks.write().await.remove(&id).is_some()) })
    }

    fn task_stats(&self, user_id: Uuid, now: DateTime<Utc>) -> BoxFuture<'_, AppResult<TaskStats>> {
        Box::pin(async move {
            let tasks = self.tasks.read().await;
            let mut stats = TaskStats::default();
            for task in tasks
                .values()
                .filter(|t| t.created_by == user_id || t.assigned_to == Some(user_id))
            {
                stats.record(task, now);
            }
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateTaskInput, TaskPriority, TaskQuery, TaskStatus};

    fn user(name: &str) -> User {
        User::new(name, &format!("{}@example.com", name), "hash".into(), None, None, Utc::now())
    }

    fn task(title: &str, creator: Uuid, priority: TaskPriority) -> Task {
        Task::new(
            CreateTaskInput {
                title: title.into(),
                priority: Some(priority),
                ..Default::default()
            },
            creator,
            Utc::now(),
        )
    }

    #[actix_rt::test]
    async fn test_user_uniqueness() {
        let repo = MemoryRepository::new();
        repo.insert_user(user("alice")).await.unwrap();

        let mut dup_email = user("alice2");
        dup_email.email = "alice@example.com".into();
        assert!(matches!(
            repo.insert_user(dup_email).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(repo.insert_user(user("alice")).await.is_err());
        assert!(repo.insert_user(user("bob")).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_delete_user_cascades() {
        let repo = MemoryRepository::new();
        let alice = repo.insert_user(user("alice")).await.unwrap();
        let bob = repo.insert_user(user("bob")).await.unwrap();

        let owned = repo.insert_task(task("Alice's", alice.id, TaskPriority::Low)).await.unwrap();
        let mut assigned = task("Bob's", bob.id, TaskPriority::Low);
        assigned.assigned_to = Some(alice.id);
        let assigned = repo.insert_task(assigned).await.unwrap();

        assert!(repo.delete_user(alice.id).await.unwrap());
        assert!(repo.find_task(owned.id).await.unwrap().is_none());
        let remaining = repo.find_task(assigned.id).await.unwrap().unwrap();
        assert_eq!(remaining.assigned_to, None);
        assert!(!repo.delete_user(alice.id).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_list_tasks_sorts_and_pages() {
        let repo = MemoryRepository::new();
        let me = Uuid::new_v4();
        for (title, priority) in [
            ("a", TaskPriority::Low),
            ("b", TaskPriority::Urgent),
            ("c", TaskPriority::Medium),
        ] {
            repo.insert_task(task(title, me, priority)).await.unwrap();
        }
        let query = TaskQuery {
            sort_by: Some(SortField::Priority),
            ..Default::default()
        };
        let (page, total) = repo
            .list_tasks(TaskFilter::from_query(Some(me), &query), PageRequest::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(total, 3);
        let titles: Vec<_> = page.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["b", "c"]);

        let (page, _) = repo
            .list_tasks(TaskFilter::from_query(Some(me), &query), PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "a");
    }

    #[actix_rt::test]
    async fn test_stats_count_created_and_assigned() {
        let repo = MemoryRepository::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut done = task("done", me, TaskPriority::High);
        done.set_status(TaskStatus::Completed, Utc::now());
        repo.insert_task(done).await.unwrap();
        let mut assigned = task("assigned", other, TaskPriority::Low);
        assigned.assigned_to = Some(me);
        repo.insert_task(assigned).await.unwrap();
        repo.insert_task(task("not mine", other, TaskPriority::Low)).await.unwrap();

        let stats = repo.task_stats(me, Utc::now()).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.completed, 1);
        assert_eq!(stats.by_status.pending, 1);
        assert_eq!(stats.by_priority.high, 1);
        assert_eq!(stats.by_priority.low, 1);
        assert_eq!(stats.overdue, 0);
    }
}
