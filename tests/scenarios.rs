//! End-to-end exercise of the cooperative scheduler through its public API
//! only, against a deterministic [`cotask::FakePlatform`] so the test
//! doesn't depend on wall-clock jitter.
//!
//! `create_task`/`start_scheduler`/the installed `Platform` are all
//! process-global singletons, so this file deliberately runs exactly one
//! scenario through exactly one `#[test]` rather than trying to isolate
//! several scheduler instances in one test binary.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use cotask::{create_task, install_platform, start_scheduler, FakePlatform, TaskHandle, TIMEOUT_MAX};

static WAITER_HANDLE: OnceLock<TaskHandle> = OnceLock::new();
static RECEIVED: OnceLock<Mutex<Vec<u32>>> = OnceLock::new();

fn received() -> &'static Mutex<Vec<u32>> {
    RECEIVED.get_or_init(|| Mutex::new(Vec::new()))
}

extern "C" fn task_waiter(_arg: *mut ()) {
    for _ in 0..3 {
        let bits = cotask::task_api::wait_for_notify(TIMEOUT_MAX);
        received().lock().unwrap().push(bits);
    }
    loop {
        cotask::task_api::delay(u32::MAX / 2);
    }
}

extern "C" fn task_pinger(_arg: *mut ()) {
    for n in 1..=3u32 {
        cotask::task_api::delay(50);
        if let Some(&waiter) = WAITER_HANDLE.get() {
            cotask::task_api::notify(waiter, n);
        }
    }
    loop {
        cotask::task_api::delay(u32::MAX / 2);
    }
}

#[test]
fn notifications_are_delivered_in_order_and_coalesce_while_pending() {
    // `FakePlatform::sleep_ms` only advances an atomic counter rather than
    // sleeping in real time, so the scheduler's idle loop free-runs through
    // simulated milliseconds as fast as the CPU allows; a short real-time
    // wait below is enough for the scenario to fully play out.
    install_platform(Box::new(FakePlatform::new()));

    let waiter = create_task("waiter", task_waiter, std::ptr::null_mut(), 64 * 1024)
        .expect("waiter task should be created before the scheduler starts");
    WAITER_HANDLE
        .set(waiter)
        .unwrap_or_else(|_| panic!("WAITER_HANDLE set exactly once"));
    create_task("pinger", task_pinger, std::ptr::null_mut(), 64 * 1024)
        .expect("pinger task should be created before the scheduler starts");

    std::thread::spawn(|| {
        start_scheduler();
    });

    std::thread::sleep(Duration::from_millis(200));

    let seen = received().lock().unwrap().clone();
    assert_eq!(seen, vec![1, 2, 3]);
}
