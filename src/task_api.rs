//! The task-side API: the only functions a task's own entry point is meant
//! to call. Every one of these is a suspend point — each either returns
//! immediately or parks the calling task and only returns once the
//! scheduler resumes it.

use crate::handle::{TaskHandle, TIMEOUT_MAX};
use crate::platform::platform;
use crate::scheduler::{current_tcb_ptr, suspend_current, with_all_tasks};
use crate::tcb::{Deadline, Tcb};

/// Identifies the task that is currently executing by checking which task's
/// stack the current stack pointer falls within — there is no OS
/// thread-local storage to consult instead. Returns `None` if called from
/// outside any task's context (e.g. from the scheduler thread itself
/// before any task has been entered).
pub fn current_task() -> Option<TaskHandle> {
    let sp = current_stack_pointer();
    let direct = current_tcb_ptr().filter(|&p| {
        let tcb = unsafe { &*p };
        tcb.is_valid_marker() && tcb.owns_stack_pointer(sp)
    });
    if direct.is_some() {
        return direct.map(TaskHandle);
    }
    with_all_tasks(|tasks| {
        tasks
            .iter()
            .find(|t| t.is_valid_marker() && t.owns_stack_pointer(sp))
            .map(|t| TaskHandle(&**t as *const Tcb))
    })
}

#[inline(never)]
fn current_stack_pointer() -> usize {
    let probe: u8 = 0;
    &probe as *const u8 as usize
}

/// Looks up the calling task's TCB, if any. Every task-side operation below
/// is meaningless (and a no-op) when called from outside a task's own
/// context — there is no current task to suspend or mutate.
fn require_current() -> Option<&'static Tcb> {
    current_task().map(|h| unsafe { &*h.as_ptr() })
}

/// Voluntarily gives up the remainder of this task's turn. The task becomes
/// runnable again on the scheduler's very next pass, via the `yielding`
/// flag on its TCB. A no-op when called outside a task's own context.
pub fn yield_now() {
    let Some(tcb) = require_current() else {
        return;
    };
    tcb.set_yielding(true);
    suspend_current(tcb);
}

/// Suspends the calling task for at least `ms` milliseconds. Sets an
/// absolute deadline rather than a countdown so the runnability predicate
/// only ever compares against "now". A no-op when called outside a task's
/// own context.
pub fn delay(ms: u32) {
    let Some(tcb) = require_current() else {
        return;
    };
    let now = platform().now_ms();
    tcb.set_delay_deadline(Deadline::at(now.saturating_add(ms)));
    suspend_current(tcb);
    tcb.set_delay_deadline(Deadline::NONE);
}

/// Waits for at least one notification bit to be set, or for `timeout_ms`
/// to elapse (`TIMEOUT_MAX` waits forever). Returns the bitset that was
/// pending at wakeup, with those bits consumed (cleared) on the way out —
/// "take and clear", not a priority mask; there is just the one
/// notification bitset per task.
///
/// Always resets the internal event deadline to the "unarmed" sentinel
/// before returning, on both the immediate and the suspended path. Leaving
/// a timeout deadline armed after a wakeup would let a *later* call with
/// `timeout_ms == TIMEOUT_MAX` see a stale already-elapsed deadline and
/// return instantly instead of actually waiting forever, so every return
/// path clears it unconditionally. Returns `0` when called outside a
/// task's own context, rather than suspending anything.
pub fn wait_for_notify(timeout_ms: u32) -> u32 {
    let Some(tcb) = require_current() else {
        return 0;
    };

    let pending = tcb.events();
    if pending != 0 {
        tcb.set_events(0);
        tcb.set_event_deadline(Deadline::NONE);
        return pending;
    }

    tcb.set_pending_event(true);
    if timeout_ms != TIMEOUT_MAX {
        let now = platform().now_ms();
        tcb.set_event_deadline(Deadline::at(now.saturating_add(timeout_ms)));
    } else {
        tcb.set_event_deadline(Deadline::NONE);
    }

    suspend_current(tcb);

    tcb.set_pending_event(false);
    let woke_with = tcb.events();
    tcb.set_events(0);
    tcb.set_event_deadline(Deadline::NONE);
    woke_with
}

/// Sets bits in `handle`'s notification bitset by direct bitwise OR — there
/// is no queue, so repeated notifications with the same bit before the
/// target wakes up coalesce into one. Safe to call from any task,
/// including the target itself.
///
/// A null or stale `handle` (marker mismatch) is a silent no-op; there is
/// no error channel to report it on.
pub fn notify(handle: TaskHandle, bits: u32) {
    let ptr = handle.as_ptr();
    if ptr.is_null() {
        return;
    }
    // SAFETY: non-null handle pointers are either a live `Tcb` (produced by
    // `create_task`/`find_task`) or dangling memory whose marker we check
    // before trusting anything else.
    let tcb = unsafe { &*ptr };
    if !tcb.is_valid_marker() {
        return;
    }
    tcb.notify_bits(bits);
}

/// Alias for [`current_task`] kept for callers that prefer the
/// handle-centric name.
pub fn current_handle() -> Option<TaskHandle> {
    current_task()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_ors_bits_without_a_running_scheduler() {
        extern "C" fn noop(_: *mut ()) {}
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        let handle = TaskHandle(&*tcb as *const Tcb);
        notify(handle, 0b001);
        notify(handle, 0b100);
        assert_eq!(tcb.events(), 0b101);
    }

    #[test]
    fn notify_on_a_null_handle_is_a_silent_no_op() {
        // A dangling handle must not panic or corrupt anything reachable.
        notify(TaskHandle(std::ptr::null()), 0xff);
    }

    #[test]
    fn task_side_calls_outside_any_task_context_are_silent_no_ops() {
        // None of these run on a task's own stack (they're on the test
        // thread's), so `current_task()` returns `None` and each call must
        // return without suspending anything or panicking.
        yield_now();
        delay(5);
        assert_eq!(wait_for_notify(5), 0);
    }
}
