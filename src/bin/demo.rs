//! A three-task demonstration of the scheduler: Moshe notifies Eli every
//! couple of seconds, Aviv burns CPU in tight `yield_now()` bursts between
//! long naps, and Eli waits on Moshe's notifications and naps in between.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use anyhow::{bail, Context as _};
use clap::Parser;

use cotask::{create_task, install_platform, start_scheduler, StdPlatform, TaskHandle};

/// Run the Moshe/Aviv/Eli cooperative scheduling demo.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Stack size, in bytes, given to each demo task.
    #[arg(long, default_value_t = 0x3000)]
    stack_size: usize,
}

static ELI_HANDLE: OnceLock<TaskHandle> = OnceLock::new();
static NEXT_NOTIFY_VALUE: AtomicU32 = AtomicU32::new(1);

extern "C" fn task_moshe(_arg: *mut ()) {
    loop {
        println!("[moshe] tick");
        cotask::task_api::delay(2000);
        println!("[moshe] notifying eli");
        if let Some(&eli) = ELI_HANDLE.get() {
            let value = NEXT_NOTIFY_VALUE.fetch_add(1, Ordering::Relaxed);
            cotask::task_api::notify(eli, value);
        }
    }
}

extern "C" fn task_aviv(_arg: *mut ()) {
    loop {
        let mut busy = 0u32;
        while busy < 0xffff {
            busy += 1;
            cotask::task_api::yield_now();
        }
        println!("[aviv] done spinning, napping");
        cotask::task_api::delay(5000);
    }
}

extern "C" fn task_eli(_arg: *mut ()) {
    loop {
        let event = cotask::task_api::wait_for_notify(cotask::TIMEOUT_MAX);
        println!("[eli] woke with notification bits {event:#x}");
        cotask::task_api::delay(2000);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    install_platform(Box::new(StdPlatform::new()));

    create_task("moshe", task_moshe, std::ptr::null_mut(), args.stack_size)
        .context("failed to create task 'moshe'")?;
    create_task("aviv", task_aviv, std::ptr::null_mut(), args.stack_size)
        .context("failed to create task 'aviv'")?;
    let eli = create_task("eli", task_eli, std::ptr::null_mut(), args.stack_size)
        .context("failed to create task 'eli'")?;
    ELI_HANDLE
        .set(eli)
        .map_err(|_| ())
        .expect("ELI_HANDLE set exactly once, before the scheduler starts");

    if !start_scheduler() {
        bail!("scheduler refused to start (already running, or no tasks created)");
    }

    Ok(())
}
