//! Scheduler: cron evaluation, the persistent task store, and the
//! due-task runner daemon.

pub mod cron;
pub mod runner;
pub mod store;

pub use cron::{cron_next, parse_cron, parse_zone, TaskZone};
pub use runner::{notify, run_daemon, step, ChatTaskRunner, TaskOutcome, TaskRunner};
pub use store::{NewTask, Task, TaskRun, TaskStatus, TaskStore};
