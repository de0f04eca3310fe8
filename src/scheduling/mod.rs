pub mod mutex_delegating;
pub mod place;
pub mod sync_task;
