//! Interrupt-enable primitives, mirroring `x86_64::instructions::interrupts`
//! closely enough that call sites only change their `use` path.

use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether interrupts are enabled, for `are_enabled()`. The CPU
/// flags register is the real source of truth; this is a best-effort mirror
/// so callers can assert on it in tests without reading EFLAGS.
static IF_ENABLED: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn enable() {
    unsafe { asm!("sti", options(nomem, nostack)) };
    IF_ENABLED.store(true, Ordering::Relaxed);
}

#[inline]
pub fn disable() {
    unsafe { asm!("cli", options(nomem, nostack)) };
    IF_ENABLED.store(false, Ordering::Relaxed);
}

#[inline]
pub fn are_enabled() -> bool {
    IF_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn hlt() {
    unsafe { asm!("hlt", options(nomem, nostack)) };
}

#[inline]
pub fn enable_and_hlt() {
    unsafe { asm!("sti", "hlt", options(nomem, nostack)) };
    IF_ENABLED.store(true, Ordering::Relaxed);
}

/// Run `f` with interrupts disabled, restoring the prior state on exit.
/// Every shared-kernel-data lock (runqueues, sleep queue, free lists,
/// process table, frame bitmap) is taken through this.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let was_enabled = are_enabled();
    if was_enabled {
        disable();
    }
    let result = f();
    if was_enabled {
        enable();
    }
    result
}
