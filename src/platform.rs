//! The scheduler core's only window onto the outside world: a millisecond
//! tick source, a way to yield real wall-clock time back to the OS while no
//! task is runnable, a console sink, a non-blocking keypress poll, and a
//! blocking wait for a specific keypress.
//!
//! Keeping this behind a trait means the core scheduling logic never
//! touches a real clock or terminal directly. Tests get a deterministic
//! fake so timing assertions don't depend on wall-clock jitter; see
//! `tests/scenarios.rs`.

use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

/// Everything the scheduler core needs from the host environment.
pub trait Platform: Send + Sync {
    /// Milliseconds since some arbitrary epoch fixed at startup. Must be
    /// monotonically non-decreasing.
    fn now_ms(&self) -> u32;

    /// Block the calling (scheduler) thread for approximately `ms`
    /// milliseconds. Used only when every task is asleep: the startup
    /// settle pause before the dispatch loop starts, and its idle spin
    /// between polls.
    fn sleep_ms(&self, ms: u32);

    /// Non-blocking check for an available keypress; `None` if nothing is
    /// waiting. Used to trigger an on-demand statistics dump.
    fn try_read_key(&self) -> Option<u8>;

    /// Write a line of diagnostic/demo output.
    fn print(&self, line: &str);

    /// Blocks the calling (scheduler) thread until `expected` is read.
    /// Used after an on-demand statistics dump: the dispatch loop pauses
    /// there until the user presses the key that dismisses it, rather than
    /// free-running straight past output that hasn't been read yet.
    ///
    /// The default implementation just polls [`Platform::try_read_key`]
    /// between [`Platform::sleep_ms`] naps; a platform with its own
    /// blocking-read primitive can override this instead.
    fn wait_for_key(&self, expected: u8) {
        loop {
            if self.try_read_key() == Some(expected) {
                return;
            }
            self.sleep_ms(10);
        }
    }
}

/// Host implementation of [`Platform`] backed by `std`.
pub struct StdPlatform {
    start: Instant,
    keys: Mutex<Receiver<u8>>,
    reader_spawned: AtomicBool,
    last_key: AtomicI32,
}

impl StdPlatform {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        // stdin reads block, so polling it from the scheduler thread
        // directly would turn `try_read_key` into the one blocking call in
        // an otherwise non-blocking dispatch loop; a background thread
        // absorbs that block instead and hands keys over through a channel.
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                if stdin.read_line(&mut line).is_err() {
                    break;
                }
                if let Some(&b) = line.as_bytes().first() {
                    if tx.send(b).is_err() {
                        break;
                    }
                }
            }
        });
        StdPlatform {
            start: Instant::now(),
            keys: Mutex::new(rx),
            reader_spawned: AtomicBool::new(true),
            last_key: AtomicI32::new(-1),
        }
    }
}

impl Default for StdPlatform {
    fn default() -> Self {
        StdPlatform::new()
    }
}

impl Platform for StdPlatform {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }

    fn try_read_key(&self) -> Option<u8> {
        let _ = self.reader_spawned.load(Ordering::Relaxed);
        let rx = self.keys.lock().unwrap();
        match rx.try_recv() {
            Ok(b) => {
                self.last_key.store(b as i32, Ordering::Relaxed);
                Some(b)
            }
            Err(_) => None,
        }
    }

    fn print(&self, line: &str) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{line}");
    }
}

/// A deterministic, manually-advanced clock for tests: `now_ms` never moves
/// on its own, `sleep_ms` advances it by exactly the requested amount, and
/// keys/output are captured rather than touching a real terminal.
#[cfg(any(test, feature = "test-support"))]
pub struct FakePlatform {
    pub now: std::sync::atomic::AtomicU32,
    pub pending_key: Mutex<Option<u8>>,
    pub log: Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakePlatform {
    pub fn new() -> Self {
        FakePlatform {
            now: std::sync::atomic::AtomicU32::new(0),
            pending_key: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn push_key(&self, key: u8) {
        *self.pending_key.lock().unwrap() = Some(key);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakePlatform {
    fn default() -> Self {
        FakePlatform::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Platform for FakePlatform {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }

    fn sleep_ms(&self, ms: u32) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }

    fn try_read_key(&self) -> Option<u8> {
        self.pending_key.lock().unwrap().take()
    }

    fn print(&self, line: &str) {
        self.log.lock().unwrap().push(line.to_string());
    }
}

static PLATFORM: OnceLock<Box<dyn Platform>> = OnceLock::new();

/// Installs the platform the scheduler will use for its lifetime. Must be
/// called at most once, before [`crate::scheduler::start_scheduler`]; later
/// calls are ignored rather than silently re-pointing a running system at a
/// different clock.
pub fn install_platform(platform: Box<dyn Platform>) {
    let _ = PLATFORM.set(platform);
}

pub(crate) fn platform() -> &'static dyn Platform {
    PLATFORM
        .get_or_init(|| Box::new(StdPlatform::new()))
        .as_ref()
}
