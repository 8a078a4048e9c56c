//! Workflow orchestration: activities, batch workflows, schedules

pub mod activities;
pub mod scheduler;
pub mod workflows;

pub use activities::Activities;
pub use scheduler::{ScheduleController, ScheduleSpec, ScheduledWorkflow};
pub use workflows::{BatchOptions, BatchSummary};
