//! Memory management: Multiboot memory-map ingestion, physical frames, the
//! kernel buddy heap, paging, VMAs, and page-fault dispatch.
//!
//! Built against a hand-rolled Multiboot v1 parser and i386 paging code;
//! the overall shape — a handful of `lazy_static!` singletons guarded by
//! `spin::Mutex`, initialised in one `init()` called from `lib.rs` — stays
//! the same regardless of which Multiboot version or bitness backs it.

pub mod buddy;
pub mod error;
pub mod frame_allocator;
pub mod kmalloc;
pub mod multiboot;
pub mod page_fault;
pub mod paging;
pub mod vma;

use crate::config::{HEAP_SIZE, HEAP_START, PAGE_SIZE};
use error::MmError;
use frame_allocator::{BitmapFrameAllocator, FrameStats};
use lazy_static::lazy_static;
use paging::PageFlags;
use spin::Mutex;

lazy_static! {
    static ref FRAME_ALLOCATOR: Mutex<BitmapFrameAllocator> = Mutex::new(BitmapFrameAllocator::new());
}

pub fn allocate_frame() -> Result<u32, MmError> {
    FRAME_ALLOCATOR.lock().allocate_frame()
}

pub fn free_frame(phys_addr: u32) {
    FRAME_ALLOCATOR.lock().free_frame(phys_addr);
}

pub fn frame_stats() -> FrameStats {
    FRAME_ALLOCATOR.lock().stats()
}

/// Zero a physical frame through the kernel's identity mapping. Valid only
/// because `init` identity-maps the whole of detected physical memory, not
/// just the kernel image — simpler than a per-access temporary mapping
/// window, and affordable since this is a single address space's worth of
/// physical memory on one CPU.
pub fn zero_frame_external(phys: u32) {
    unsafe { core::ptr::write_bytes(phys as *mut u8, 0, PAGE_SIZE) };
}

extern "C" {
    static __kernel_end: u8;
}

/// Bring up the whole memory subsystem. `multiboot_info_addr` is the
/// physical `EBX` value `boot.rs` passed through to `kernel_main`.
pub fn init(multiboot_info_addr: u32) {
    let boot_info = unsafe { multiboot::BootInfo::load(multiboot_info_addr) };
    let kernel_end = unsafe { &__kernel_end as *const u8 as u32 };

    let highest_addr = boot_info
        .memory_areas()
        .filter(|a| a.available)
        .map(|a| a.base + a.length)
        .max()
        .unwrap_or(16 * 1024 * 1024);

    unsafe {
        FRAME_ALLOCATOR.lock().init(&boot_info, kernel_end);
    }
    crate::log_info!("Physical frame allocator initialized from Multiboot v1 memory map.");

    let mut kernel_dir = paging::init(highest_addr as u32);
    crate::log_info!("Paging enabled ({} frames managed).", frame_stats().total_frames);

    let mut addr = HEAP_START as u32;
    let heap_end = HEAP_START as u32 + HEAP_SIZE as u32;
    while addr < heap_end {
        let frame = allocate_frame().expect("not enough physical memory for the kernel heap window");
        kernel_dir
            .map(addr, frame, PageFlags::PRESENT | PageFlags::WRITABLE)
            .expect("mapping the kernel heap window must not fail");
        addr += PAGE_SIZE as u32;
    }

    kmalloc::init();
    crate::log_info!("Kernel buddy heap initialized.");
}
