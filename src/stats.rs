//! The statistics dump: one line per task, printed through
//! [`crate::platform::Platform::print`] on demand.

use crate::platform::platform;
use crate::tcb::Tcb;

/// A task's state as reported by the statistics dump. Precedence when more
/// than one condition could apply, highest first: `Stopped` (never
/// started), `Pending` (waiting on a notification), `Delaying` (waiting on
/// a timed sleep), `Executing` (runnable right now).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Pending,
    Delaying,
    Executing,
}

impl TaskState {
    fn label(self) -> &'static str {
        match self {
            TaskState::Stopped => "Stopped",
            TaskState::Pending => "Pending",
            TaskState::Delaying => "Delaying",
            TaskState::Executing => "Executing",
        }
    }
}

pub(crate) fn task_state(tcb: &Tcb) -> TaskState {
    if !tcb.is_running() {
        TaskState::Stopped
    } else if tcb.has_pending_event() {
        TaskState::Pending
    } else if tcb.delay_deadline().is_armed() {
        TaskState::Delaying
    } else {
        TaskState::Executing
    }
}

fn ticks_to_hms(ticks_ms: u32) -> (u32, u32, u32) {
    let total_secs = ticks_ms / 1000;
    (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60)
}

/// Prints the header, one row per task, then a trailer with the total task
/// count and the TCB's own size in bytes. Column layout: name, state,
/// stack size, stack usage percent, accumulated run time as `H:MM:SS`,
/// peak single-quantum run time in milliseconds.
fn dump_stats_with(task_ptrs: &[*const Tcb], mut print_fn: impl FnMut(&str)) {
    print_fn("Name                 State     Stack  Usage%  Time spent  Time peak");
    for &ptr in task_ptrs {
        let tcb = unsafe { &*ptr };
        let state = task_state(tcb);
        let (h, m, s) = ticks_to_hms(tcb.ticks_accumulated());
        print_fn(&format!(
            "{:<20} {:<9} {:>6} {:>7} {:>2}:{:02}:{:02}     {:>6}ms",
            tcb.name(),
            state.label(),
            tcb.stack_size(),
            tcb.stack_usage_percent(),
            h,
            m,
            s,
            tcb.ticks_peak(),
        ));
    }
    print_fn(&format!(
        "Tasks: {}, TCB size: {} bytes",
        task_ptrs.len(),
        std::mem::size_of::<Tcb>(),
    ));
}

/// Dispatch-loop path: always goes through the installed [`Platform`], used
/// when a key press on the console triggers an on-demand dump.
pub(crate) fn dump_stats(task_ptrs: &[*const Tcb]) {
    dump_stats_with(task_ptrs, |line| platform().print(line));
}

/// Emits the same report as a console key-triggered dump, through a
/// caller-supplied sink instead of the installed [`Platform`] — useful for
/// tests and for embedding the report in a host's own logging rather than
/// stdout.
pub fn dump_stats_to(print_fn: impl FnMut(&str)) {
    crate::scheduler::with_all_tasks(|tasks| {
        let ptrs: Vec<*const Tcb> = tasks.iter().map(|t| &**t as *const Tcb).collect();
        dump_stats_with(&ptrs, print_fn);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::Deadline;

    extern "C" fn noop(_: *mut ()) {}

    #[test]
    fn stopped_beats_every_other_condition() {
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_pending_event(true);
        tcb.set_delay_deadline(Deadline::at(5));
        assert_eq!(task_state(&tcb), TaskState::Stopped);
    }

    #[test]
    fn pending_beats_delaying() {
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_running(true);
        tcb.set_pending_event(true);
        tcb.set_delay_deadline(Deadline::at(5));
        assert_eq!(task_state(&tcb), TaskState::Pending);
    }

    #[test]
    fn running_with_nothing_armed_is_executing() {
        let tcb = Tcb::new("t", noop, std::ptr::null_mut(), 512);
        tcb.set_running(true);
        assert_eq!(task_state(&tcb), TaskState::Executing);
    }
}
