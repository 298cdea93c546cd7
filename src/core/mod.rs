pub mod clock;
pub mod rollover;
pub mod task;
pub mod task_list;
