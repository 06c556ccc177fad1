pub mod task;
pub mod user;

pub use task::{
    CreateTaskInput, SortField, SortOrder, StatusUpdate, Task, TaskPriority, TaskQuery, TaskScope,
    TaskStats, TaskStatus, TaskView, UpdateTaskInput,
};
pub use user::{UpdateUserRequest, User, UserChanges, UserQuery, UserRole, UserSearchQuery};
