//! Task handles and the sentinel constants that describe the stable surface
//! of the scheduler's task-side API.

/// Maximum length, in bytes, of a task's printable name.
pub const MAX_NAME: usize = 20;

/// Stack size used when a caller doesn't care to size it explicitly.
pub const DEFAULT_STACK: usize = 2048;

/// Sentinel meaning "wait forever" when passed to [`crate::task_api::wait_for_notify`].
pub const TIMEOUT_MAX: u32 = 0xFFFF_FFFF;

/// Sentinel value for an absent/invalid task, kept for parity with C-style
/// handle APIs that have no `Option` to reach for. The safe API expresses
/// the same idea with `Option<TaskHandle>` and should be preferred over
/// comparing against this constant directly.
pub const INVALID_HANDLE: u32 = 0xFFFF_FFFF;

/// An opaque, stable identifier for a task.
///
/// A handle's pointer identity is the address of its [`crate::tcb::Tcb`] for
/// the lifetime of the process: handles never alias across distinct tasks
/// and are never reused once a scheduler starts, because tasks are never
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) *const crate::tcb::Tcb);

// The TCB a handle points to is only ever mutated from the thread the
// scheduler runs on; handles themselves are plain addresses and are safe to
// move between threads (though this crate is single-threaded by design).
unsafe impl Send for TaskHandle {}
unsafe impl Sync for TaskHandle {}

impl TaskHandle {
    pub(crate) fn as_ptr(self) -> *const crate::tcb::Tcb {
        self.0
    }
}
