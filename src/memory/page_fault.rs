//! Page-fault dispatch.
//!
//! Called from `interrupts::idt`'s `#[page_fault]` handler with the raw
//! CPU error code. Bit layout per the x86 SDM: bit0 present, bit1 write,
//! bit2 user, bit3 reserved-bit violation, bit4 instruction fetch.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

bitflags::bitflags! {
    struct FaultCode: u32 {
        const PRESENT   = 1 << 0;
        const WRITE     = 1 << 1;
        const USER      = 1 << 2;
        const RESERVED  = 1 << 3;
        const FETCH     = 1 << 4;
    }
}

static TOTAL_FAULTS: AtomicU64 = AtomicU64::new(0);
static HANDLED_FAULTS: AtomicU64 = AtomicU64::new(0);
static FATAL_FAULTS: AtomicU64 = AtomicU64::new(0);
static HANDLING: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Default, Clone, Copy)]
pub struct PageFaultStats {
    pub total: u64,
    pub handled: u64,
    pub fatal: u64,
}

pub fn stats() -> PageFaultStats {
    PageFaultStats {
        total: TOTAL_FAULTS.load(Ordering::Relaxed),
        handled: HANDLED_FAULTS.load(Ordering::Relaxed),
        fatal: FATAL_FAULTS.load(Ordering::Relaxed),
    }
}

/// Returns `true` if the fault was resolved (either by populating a page or
/// by terminating the offending process) and execution may continue;
/// `false` means the caller should panic — a kernel-mode fault against
/// unmapped memory is a programmer bug.
pub fn handle(fault_addr: u32, error_code: u32) -> bool {
    TOTAL_FAULTS.fetch_add(1, Ordering::Relaxed);

    // A fault while already handling one on this (single) CPU means the
    // handler itself touched unmapped memory — unrecoverable.
    if HANDLING.swap(true, Ordering::Acquire) {
        FATAL_FAULTS.fetch_add(1, Ordering::Relaxed);
        return false;
    }
    let outcome = handle_inner(fault_addr, error_code);
    HANDLING.store(false, Ordering::Release);
    outcome
}

fn handle_inner(fault_addr: u32, error_code: u32) -> bool {
    let code = FaultCode::from_bits_truncate(error_code);

    if !code.contains(FaultCode::USER) {
        // Kernel-mode fault. The only legitimate case would be a deliberate
        // user-pointer access that validates through the VMA table first
        // (syscalls do this explicitly), so reaching here is always a bug.
        FATAL_FAULTS.fetch_add(1, Ordering::Relaxed);
        return false;
    }

    let Some(result) = crate::process::with_current_address_space_mut(|aspace| {
        let Some(vma_index) = aspace.vma_index_at(fault_addr) else {
            return FaultOutcome::NoVma;
        };
        let vma = &aspace.vma_at(vma_index);
        let wants_write = code.contains(FaultCode::WRITE);
        let wants_exec = code.contains(FaultCode::FETCH);
        if wants_write && !vma.flags.contains(crate::memory::vma::VmaFlags::WRITE) {
            return FaultOutcome::PermissionDenied;
        }
        if wants_exec && !vma.flags.contains(crate::memory::vma::VmaFlags::EXEC) {
            return FaultOutcome::PermissionDenied;
        }
        let page_addr = fault_addr & !(crate::config::PAGE_SIZE as u32 - 1);
        match aspace.populate_page(vma_index, page_addr) {
            Ok(()) => FaultOutcome::Populated,
            Err(_) => FaultOutcome::OutOfMemory,
        }
    }) else {
        // No current process at all: still a kernel-mode bug by another name.
        return false;
    };

    match result {
        FaultOutcome::Populated => {
            HANDLED_FAULTS.fetch_add(1, Ordering::Relaxed);
            true
        }
        FaultOutcome::NoVma | FaultOutcome::PermissionDenied | FaultOutcome::OutOfMemory => {
            crate::log_error!("segfault at {:#x} (outcome {:?}), terminating process", fault_addr, result);
            crate::process::terminate_current_with_fault();
            true
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FaultOutcome {
    Populated,
    NoVma,
    PermissionDenied,
    OutOfMemory,
}
