//! Hand-rolled, per-architecture context switch.
//!
//! A pair of saved register files plus a stack pointer, swapped with a
//! short asm routine. This is deliberately not `setjmp`/`longjmp`: that
//! pairing is not sound for general coroutine-style suspension once a
//! stack has been re-parented across calls. Only the callee-saved register
//! set is preserved, since the swap always happens at an explicit call
//! site inside [`crate::task_api`] — never from arbitrary, unplanned
//! points — so the usual C ABI already guarantees the caller-saved
//! registers are dead across the call.
//!
//! [`Context::bootstrap`] prepares a context for a task that has never run:
//! it fabricates the illusion of a pending call into [`trampoline`] by
//! writing a fake return address (x86-64) or link register (aarch64)
//! directly into a freshly constructed register file, so the first restore
//! of that context lands in the task's entry point without the compiler
//! ever having generated a call instruction for it. The swap functions
//! themselves are `naked` so no compiler-generated prologue/epilogue gets
//! in the way of the hand-written save/restore sequence.

use crate::tcb::Tcb;

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::Tcb;

    /// Callee-saved register file (System V AMD64 ABI) plus the stack
    /// pointer. `owner` rides along in the same struct purely so the
    /// bootstrap trampoline can recover which [`Tcb`] it is entering; it is
    /// not touched by the save/restore asm itself.
    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct Context {
        rsp: u64,
        rbx: u64,
        rbp: u64,
        r12: u64,
        r13: u64,
        r14: u64,
        r15: u64,
        owner: *const Tcb,
    }

    impl Default for Context {
        fn default() -> Self {
            Context {
                rsp: 0,
                rbx: 0,
                rbp: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                owner: core::ptr::null(),
            }
        }
    }

    impl Context {
        /// Build a context for a task that has never been entered.
        ///
        /// `stack_top` must be the exclusive upper bound of a stack buffer
        /// at least 16 bytes long. We carve the fake return address out of
        /// the top 16 bytes so the write below never lands past the end of
        /// the buffer regardless of `stack_top`'s own alignment.
        pub fn bootstrap(stack_top: *mut u8, owner: *const Tcb) -> Self {
            let aligned = (stack_top as usize - 16) & !0xF;
            // SAFETY: `aligned` is inside the caller-provided stack buffer
            // (at least 16 bytes below `stack_top`, 16-byte aligned), and
            // nothing else has a live reference into it yet.
            unsafe {
                (aligned as *mut u64).write(trampoline as usize as u64);
            }
            Context {
                rsp: aligned as u64,
                owner,
                ..Context::default()
            }
        }
    }

    /// Save the currently executing context into `save_to`, restore the one
    /// in `restore_from`, and resume it. Returns (to the matching call site
    /// in the now-current context) the next time *this* context is restored
    /// by some other call to `ctx_swap`.
    #[unsafe(naked)]
    pub unsafe extern "C" fn ctx_swap(save_to: *mut Context, restore_from: *const Context) {
        core::arch::naked_asm!(
            "mov [rdi + 0], rsp",
            "mov [rdi + 8], rbx",
            "mov [rdi + 16], rbp",
            "mov [rdi + 24], r12",
            "mov [rdi + 32], r13",
            "mov [rdi + 40], r14",
            "mov [rdi + 48], r15",
            "mov rsp, [rsi + 0]",
            "mov rbx, [rsi + 8]",
            "mov rbp, [rsi + 16]",
            "mov r12, [rsi + 24]",
            "mov r13, [rsi + 32]",
            "mov r14, [rsi + 40]",
            "mov r15, [rsi + 48]",
            // `rsi` still holds `restore_from`; `trampoline` reads it to
            // find the owning Tcb the first time a context is entered. For
            // a context that has run before, `ret` pops the return address
            // this same function pushed (implicitly, via `call`) on the
            // *last* suspend and control resumes there instead.
            "ret",
        );
    }

    /// Entered via `ret` the first time a fresh task's context is restored.
    /// `rsi` (preserved by `ctx_swap`, since it never writes that register)
    /// still holds the `restore_from` pointer passed to `ctx_swap`, i.e. a
    /// pointer to this very `Context`.
    ///
    /// `ctx_swap`'s `ret` lands here exactly as if `trampoline` had been
    /// `call`ed: `rsp % 16 == 8`, the SysV entry state for a function
    /// reached via `call`. A `call {enter}` here would itself push an
    /// 8-byte return address, leaving `bootstrap_enter` entered with
    /// `rsp % 16 == 0` — misaligned, since it also expects to be entered
    /// as if by `call`. Tail-jumping instead pushes nothing, so
    /// `bootstrap_enter` sees the same (correct) `rsp % 16 == 8` alignment
    /// `trampoline` itself was entered with.
    #[unsafe(naked)]
    extern "C" fn trampoline() -> ! {
        core::arch::naked_asm!(
            "mov rdi, rsi",
            "jmp {enter}",
            enter = sym super::bootstrap_enter,
        );
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn bootstrap_writes_trampoline_below_stack_top_and_keeps_alignment() {
            let mut buf = [0u8; 256];
            let top = unsafe { buf.as_mut_ptr().add(buf.len()) };
            let ctx = Context::bootstrap(top, core::ptr::null());
            assert_eq!(ctx.rsp % 16, 0);
            let written = unsafe { (ctx.rsp as *const u64).read() };
            assert_eq!(written, trampoline as usize as u64);
            assert!(ctx.rsp < top as u64);
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::Tcb;

    /// Callee-saved register file (AAPCS64: `x19`-`x30`, `sp`).
    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct Context {
        x19: u64,
        x20: u64,
        x21: u64,
        x22: u64,
        x23: u64,
        x24: u64,
        x25: u64,
        x26: u64,
        x27: u64,
        x28: u64,
        x29: u64, // frame pointer
        x30: u64, // link register / return address
        sp: u64,
        owner: *const Tcb,
    }

    impl Default for Context {
        fn default() -> Self {
            Context {
                x19: 0,
                x20: 0,
                x21: 0,
                x22: 0,
                x23: 0,
                x24: 0,
                x25: 0,
                x26: 0,
                x27: 0,
                x28: 0,
                x29: 0,
                x30: 0,
                sp: 0,
                owner: core::ptr::null(),
            }
        }
    }

    impl Context {
        /// AAPCS64's `ret` jumps through `x30` rather than popping the
        /// stack, so bootstrapping a fresh task is simpler than on x86-64:
        /// no fake stack frame is required, just an `x30` that points at
        /// the trampoline and a 16-byte-aligned `sp`.
        pub fn bootstrap(stack_top: *mut u8, owner: *const Tcb) -> Self {
            let sp = (stack_top as usize) & !0xF;
            Context {
                x30: trampoline as usize as u64,
                sp: sp as u64,
                owner,
                ..Context::default()
            }
        }
    }

    #[unsafe(naked)]
    pub unsafe extern "C" fn ctx_swap(save_to: *mut Context, restore_from: *const Context) {
        core::arch::naked_asm!(
            "stp x19, x20, [x0, #0]",
            "stp x21, x22, [x0, #16]",
            "stp x23, x24, [x0, #32]",
            "stp x25, x26, [x0, #48]",
            "stp x27, x28, [x0, #64]",
            "stp x29, x30, [x0, #80]",
            "mov x9, sp",
            "str x9, [x0, #96]",
            "ldp x19, x20, [x1, #0]",
            "ldp x21, x22, [x1, #16]",
            "ldp x23, x24, [x1, #32]",
            "ldp x25, x26, [x1, #48]",
            "ldp x27, x28, [x1, #64]",
            "ldp x29, x30, [x1, #80]",
            "ldr x9, [x1, #96]",
            "mov sp, x9",
            // `x1` still holds `restore_from`; see `trampoline`.
            "mov x0, x1",
            "ret",
        );
    }

    #[unsafe(naked)]
    extern "C" fn trampoline() -> ! {
        core::arch::naked_asm!(
            "bl {enter}",
            enter = sym super::bootstrap_enter,
        );
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn bootstrap_sets_lr_to_trampoline_and_aligns_sp() {
            let mut buf = [0u8; 256];
            let top = unsafe { buf.as_mut_ptr().add(buf.len()) };
            let ctx = Context::bootstrap(top, core::ptr::null());
            assert_eq!(ctx.sp % 16, 0);
            assert_eq!(ctx.x30, trampoline as usize as u64);
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("cotask's context switch is implemented for x86_64 and aarch64 only");

pub use arch::{ctx_swap, Context};

/// Reached (indirectly, via each arch's naked `trampoline`) the first time a
/// task's context is ever restored. Recovers the owning [`Tcb`] from the
/// context pointer and invokes its entry point. A task's entry returning is
/// undefined behaviour — tasks run forever by design — so we park the
/// thread rather than fall into whatever garbage follows on the stack.
extern "C" fn bootstrap_enter(ctx_ptr: *const Context) -> ! {
    // SAFETY: `ctx_ptr` was produced by `Context::bootstrap`, which always
    // sets `owner` to a live `Tcb` before the context is ever restored.
    let owner = unsafe { (*ctx_ptr).owner_for_bootstrap() };
    let tcb = unsafe { &*owner };
    (tcb.entry())(tcb.arg());
    loop {
        core::hint::spin_loop();
    }
}

impl Context {
    /// Exposes the bootstrap-only `owner` field to [`bootstrap_enter`]
    /// without making it part of the public, architecture-specific layout.
    unsafe fn owner_for_bootstrap(&self) -> *const Tcb {
        // Both arch variants place `owner` as their last field; read it via
        // a raw pointer cast rather than duplicating per-arch accessors.
        unsafe { *(self as *const Context as *const u8).add(Self::OWNER_OFFSET).cast() }
    }
}

#[cfg(target_arch = "x86_64")]
impl Context {
    const OWNER_OFFSET: usize = core::mem::size_of::<u64>() * 7;
}

#[cfg(target_arch = "aarch64")]
impl Context {
    const OWNER_OFFSET: usize = core::mem::size_of::<u64>() * 13;
}
