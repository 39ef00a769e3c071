//! A non-preemptive, cooperative round-robin task scheduler with per-task
//! stacks and stack-switched context saves.
//!
//! Tasks run to completion of each turn on a single OS thread; there is no
//! preemption, no priorities, and no SMP — a task keeps the CPU until it
//! calls [`task_api::yield_now`], [`task_api::delay`], or
//! [`task_api::wait_for_notify`].

mod context;
mod handle;
mod log;
mod platform;
mod scheduler;
mod stats;
mod tcb;

pub mod task_api;

pub use handle::{TaskHandle, DEFAULT_STACK, INVALID_HANDLE, MAX_NAME, TIMEOUT_MAX};
pub use platform::{install_platform, Platform, StdPlatform};
pub use scheduler::{create_task, find_task, start_scheduler};
pub use stats::{dump_stats_to, TaskState};
pub use tcb::{stack_usage, TaskEntry};

#[cfg(any(test, feature = "test-support"))]
pub use platform::FakePlatform;
