//! Authorization rules.
//!
//! Tasks are governed by ownership: the creator may do anything, the assignee may
//! read and change the status, everybody may read a public task. Admins get no
//! special treatment on tasks. User management is governed by role, with a
//! carve-out for reading one's own profile.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Task, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    View,
    Edit,
    UpdateStatus,
    Delete,
}

fn is_creator(task: &Task, user: &User) -> bool {
    task.created_by == user.id
}

fn is_assignee(task: &Task, user: &User) -> bool {
    task.assigned_to == Some(user.id)
}

pub fn can(user: Option<&User>, action: TaskAction, task: &Task) -> bool {
    match (action, user) {
        (TaskAction::View, _) if task.is_public => true,
        (TaskAction::View, Some(user)) | (TaskAction::UpdateStatus, Some(user)) => {
            is_creator(task, user) || is_assignee(task, user)
        }
        (TaskAction::Edit, Some(user)) | (TaskAction::Delete, Some(user)) => is_creator(task, user),
        (_, None) => false,
    }
}

pub fn authorize_task(user: Option<&User>, action: TaskAction, task: &Task) -> AppResult<()> {
    if can(user, action, task) {
        return Ok(());
    }
    let message = match action {
        TaskAction::View => "Not authorized to view this task",
        TaskAction::Edit => "Only the task creator can edit this task",
        TaskAction::UpdateStatus => "Only the task creator or assignee can update the status",
        TaskAction::Delete => "Only the task creator can delete this task",
    };
    Err(AppError::Forbidden(message.into()))
}

pub fn ensure_admin(user: &User) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".into()))
    }
}

/// Admins may read anyone; everyone else only themselves.
pub fn ensure_can_view_user(actor: &User, target: Uuid) -> AppResult<()> {
    if actor.is_admin() || actor.id == target {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not authorized to view this user".into()))
    }
}

pub fn ensure_can_delete_user(actor: &User, target: Uuid) -> AppResult<()> {
    ensure_admin(actor)?;
    if actor.id == target {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateTaskInput, UserRole};
    use chrono::Utc;

    fn user(name: &str) -> User {
        User::new(name, &format!("{}@example.com", name), String::new(), None, None, Utc::now())
    }

    fn task(creator: &User, assignee: Option<&User>, public: bool) -> Task {
        Task::new(
            CreateTaskInput {
                title: "Policy".into(),
                assigned_to: assignee.map(|u| u.id),
                is_public: Some(public),
                ..Default::default()
            },
            creator.id,
            Utc::now(),
        )
    }

    #[test]
    fn test_private_task_visibility() {
        let creator = user("creator");
        let assignee = user("assignee");
        let stranger = user("stranger");
        let t = task(&creator, Some(&assignee), false);

        assert!(can(Some(&creator), TaskAction::View, &t));
        assert!(can(Some(&assignee), TaskAction::View, &t));
        assert!(!can(Some(&stranger), TaskAction::View, &t));
        assert!(!can(None, TaskAction::View, &t));
        assert!(matches!(
            authorize_task(Some(&stranger), TaskAction::View, &t),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_public_task_is_readable_by_anyone() {
        let creator = user("creator");
        let t = task(&creator, None, true);
        assert!(can(None, TaskAction::View, &t));
        assert!(can(Some(&user("stranger")), TaskAction::View, &t));
        assert!(!can(Some(&user("stranger")), TaskAction::UpdateStatus, &t));
    }

    #[test]
    fn test_assignee_may_only_change_status() {
        let creator = user("creator");
        let assignee = user("assignee");
        let t = task(&creator, Some(&assignee), false);

        assert!(can(Some(&assignee), TaskAction::UpdateStatus, &t));
        assert!(!can(Some(&assignee), TaskAction::Edit, &t));
        assert!(!can(Some(&assignee), TaskAction::Delete, &t));

        for action in [TaskAction::Edit, TaskAction::UpdateStatus, TaskAction::Delete] {
            assert!(can(Some(&creator), action, &t));
        }
    }

    #[test]
    fn test_admin_has_no_task_bypass() {
        let creator = user("creator");
        let mut admin = user("admin");
        admin.role = UserRole::Admin;
        let t = task(&creator, None, false);
        assert!(!can(Some(&admin), TaskAction::View, &t));
        assert!(!can(Some(&admin), TaskAction::Delete, &t));
    }

    #[test]
    fn test_user_management_rules() {
        let mut admin = user("admin");
        admin.role = UserRole::Admin;
        let regular = user("regular");

        assert!(ensure_admin(&admin).is_ok());
        assert!(matches!(ensure_admin(&regular), Err(AppError::Forbidden(_))));

        assert!(ensure_can_view_user(&regular, regular.id).is_ok());
        assert!(ensure_can_view_user(&regular, admin.id).is_err());
        assert!(ensure_can_view_user(&admin, regular.id).is_ok());

        assert!(ensure_can_delete_user(&admin, regular.id).is_ok());
        assert!(matches!(
            ensure_can_delete_user(&admin, admin.id),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            ensure_can_delete_user(&regular, admin.id),
            Err(AppError::Forbidden(_))
        ));
    }
}
