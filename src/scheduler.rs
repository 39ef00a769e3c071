//! The dispatcher: task creation, the bootstrap pass, and the main
//! round-robin loop that decides which task runs next.

use std::sync::{Mutex, OnceLock};

use crate::context::ctx_swap;
use crate::handle::TaskHandle;
use crate::log::scheduler_log;
use crate::platform::platform;
use crate::tcb::{Deadline, TaskEntry, Tcb};

/// Milliseconds the scheduler sleeps before its first dispatch pass, giving
/// any co-resident startup work (console/HAL init, banner output) time to
/// settle before the bootstrap pass starts entering tasks.
const STARTUP_SETTLE_MS: u32 = 100;

static PANIC_HOOK_INSTALLED: std::sync::Once = std::sync::Once::new();

/// Chains a `[PANIC]` log line in front of whatever panic hook was already
/// installed, the hosted-std equivalent of a bare-metal `#[panic_handler]`
/// that writes to the serial console before halting. Installed at most once
/// regardless of how many times [`start_scheduler`] is reached.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            scheduler_log!("PANIC", "{}", info);
            previous(info);
        }));
    });
}

pub(crate) struct Scheduler {
    tasks: Vec<Box<Tcb>>,
    current: Option<*const Tcb>,
    running: bool,
}

// See the note on `Tcb`'s own `unsafe impl Sync`: exactly one logical
// participant (the scheduler thread or whichever task it has resumed) ever
// touches this structure at a time.
unsafe impl Send for Scheduler {}

static SCHEDULER: OnceLock<Mutex<Scheduler>> = OnceLock::new();

fn global() -> &'static Mutex<Scheduler> {
    SCHEDULER.get_or_init(|| {
        Mutex::new(Scheduler {
            tasks: Vec::new(),
            current: None,
            running: false,
        })
    })
}

/// Creates a task and appends it to the round-robin order. Returns `None`
/// if the scheduler has already started, since the dispatch loop's task
/// list is never resized while a context may be parked mid-switch.
///
/// `stack_size` of `0` selects [`crate::handle::DEFAULT_STACK`].
///
/// A task whose entry point never calls [`crate::task_api::yield_now`],
/// [`crate::task_api::delay`], or [`crate::task_api::wait_for_notify`] will
/// never return control to the scheduler once [`start_scheduler`] enters it
/// — the bootstrap pass hangs forever on that task. This precondition is
/// documented, not defended against at runtime.
pub fn create_task(name: &str, entry: TaskEntry, arg: *mut (), stack_size: usize) -> Option<TaskHandle> {
    let mut sched = global().lock().unwrap();
    if sched.running {
        return None;
    }
    let tcb = Tcb::new(name, entry, arg, stack_size);
    let handle = TaskHandle(&*tcb as *const Tcb);
    scheduler_log!("SCHED", "task '{}' created ({} bytes of stack)", name, tcb.stack_size());
    sched.tasks.push(tcb);
    Some(handle)
}

/// Looks up a task by name.
pub fn find_task(name: &str) -> Option<TaskHandle> {
    let sched = global().lock().unwrap();
    sched
        .tasks
        .iter()
        .find(|t| t.name() == name)
        .map(|t| TaskHandle(&**t as *const Tcb))
}

/// Starts the dispatcher. Does not return until every task is permanently
/// unrunnable, which this crate does not otherwise try to detect or
/// recover from — tasks are expected to run forever.
///
/// Returns `false` if the scheduler is already running or no tasks have
/// been created.
pub fn start_scheduler() -> bool {
    install_panic_hook();
    {
        let mut sched = global().lock().unwrap();
        if sched.running || sched.tasks.is_empty() {
            return false;
        }
        sched.running = true;
        for t in &sched.tasks {
            t.set_running(true);
        }
        scheduler_log!("SCHED", "starting dispatcher with {} task(s)", sched.tasks.len());
    }

    platform().sleep_ms(STARTUP_SETTLE_MS);

    // Bootstrap pass: enter each task once, in creation order. Each task
    // runs until its first suspend point, which parks it back here via
    // `ctx_swap`.
    let task_ptrs: Vec<*const Tcb> = {
        let sched = global().lock().unwrap();
        sched.tasks.iter().map(|t| &**t as *const Tcb).collect()
    };
    for tcb_ptr in &task_ptrs {
        let tcb = unsafe { &*(*tcb_ptr) };
        scheduler_log!("SCHED", "bootstrapping task '{}'", tcb.name());
        enter_task(*tcb_ptr);
    }

    scheduler_log!("SCHED", "bootstrap pass complete, entering dispatch loop");
    dispatch_loop(&task_ptrs);
    true
}

/// Transfers control into `tcb_ptr`'s task context, parking the scheduler's
/// own context in a scratch slot on the caller's stack until the task
/// suspends again.
fn enter_task(tcb_ptr: *const Tcb) {
    let tcb = unsafe { &*tcb_ptr };
    {
        let mut sched = global().lock().unwrap();
        sched.current = Some(tcb_ptr);
    }
    let now = platform().now_ms();
    tcb.set_ticks_start(now);
    // SAFETY: `ctx_sched_ptr`/`ctx_task_ptr` are valid for the lifetime of
    // the Tcb, which outlives this call (tasks are never deleted).
    unsafe {
        ctx_swap(tcb.ctx_sched_ptr(), tcb.ctx_task_ptr());
    }
    let elapsed = platform().now_ms().saturating_sub(now);
    tcb.accumulate_ticks(elapsed);
}

fn dispatch_loop(task_ptrs: &[*const Tcb]) {
    loop {
        let now = platform().now_ms();
        let mut ran_any = false;

        for &tcb_ptr in task_ptrs {
            let tcb = unsafe { &*tcb_ptr };
            if is_runnable(tcb, now) {
                ran_any = true;
                tcb.set_yielding(false);
                enter_task(tcb_ptr);
            }
        }

        if platform().try_read_key().is_some() {
            scheduler_log!("SCHED", "on-demand stats dump requested, pausing for space");
            crate::stats::dump_stats(task_ptrs);
            platform().wait_for_key(b' ');
        }

        if !ran_any {
            // Every task is asleep on a delay or a notification deadline;
            // there is nothing to round-robin through until time passes.
            platform().sleep_ms(1);
        }
    }
}

/// The runnability predicate: a task already marked not-running is skipped
/// outright; then "activity pending" (yielding, or events already set, or
/// its event deadline has elapsed) short-circuits the delay check; only if
/// neither holds does the delay deadline gate the task.
fn is_runnable(tcb: &Tcb, now_ms: u32) -> bool {
    if !tcb.is_running() {
        return false;
    }
    let activity_pending = tcb.is_yielding()
        || tcb.events() != 0
        || tcb.event_deadline().has_elapsed(now_ms);
    if activity_pending {
        return true;
    }
    match tcb.delay_deadline() {
        Deadline::NONE => false,
        d => d.has_elapsed(now_ms),
    }
}

/// Suspends the currently running task, handing control back to the
/// scheduler's dispatch loop. Used by every task-side suspend point in
/// [`crate::task_api`].
pub(crate) fn suspend_current(tcb: &Tcb) {
    // SAFETY: the scheduler's context for this task was parked by the
    // matching `enter_task` call that is currently blocked in `ctx_swap`
    // further down this same native call stack.
    unsafe {
        ctx_swap(tcb.ctx_task_ptr(), tcb.ctx_sched_ptr());
    }
}

pub(crate) fn current_tcb_ptr() -> Option<*const Tcb> {
    global().lock().unwrap().current
}

pub(crate) fn with_all_tasks<R>(f: impl FnOnce(&[Box<Tcb>]) -> R) -> R {
    let sched = global().lock().unwrap();
    f(&sched.tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    // The global scheduler is a process-wide singleton, so these tests only
    // exercise the pure predicate logic rather than a full `start_scheduler`
    // run (which would conflict across tests in the same binary). Full
    // dispatch behaviour is covered by the integration tests in
    // `tests/scenarios.rs`, each run in its own `#[test]` process... no —
    // see that file's own note about why it uses a single shared scenario.

    #[test]
    fn activity_pending_short_circuits_delay_gate() {
        extern "C" fn noop(_: *mut ()) {}
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_running(true);
        tcb.set_delay_deadline(Deadline::at(1_000_000));
        assert!(!is_runnable(&tcb, 0));
        tcb.set_yielding(true);
        assert!(is_runnable(&tcb, 0));
    }

    #[test]
    fn elapsed_event_deadline_makes_task_runnable() {
        extern "C" fn noop(_: *mut ()) {}
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_running(true);
        tcb.set_event_deadline(Deadline::at(100));
        assert!(!is_runnable(&tcb, 50));
        assert!(is_runnable(&tcb, 100));
    }

    #[test]
    fn stopped_task_is_never_runnable() {
        extern "C" fn noop(_: *mut ()) {}
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_yielding(true);
        assert!(!is_runnable(&tcb, 0));
        let _ = AtomicU32::new(0).load(Ordering::Relaxed);
    }
}
