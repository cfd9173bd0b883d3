//! `kmalloc`: a small-object slab allocator over the buddy heap, backing
//! `#[global_allocator]` so `alloc::{vec, string, collections}` work in the
//! kernel the way the process table and VFS already rely on one.
//!
//! Size classes round every request up to the nearest of a short list of
//! powers of two. Each class is a free-list of fixed-size slots carved out
//! of one `MIN_ORDER` (4 KiB) block requested from the buddy heap whenever
//! the class runs dry — so a 16-byte `Vec<Pid>` push costs one 16-byte slot,
//! not a whole 4 KiB buddy block. Anything larger than the biggest class
//! falls straight through to the buddy allocator at its own order, since a
//! slab of 2 KiB objects buys nothing over a direct buddy block at that size.

use crate::memory::buddy::BuddyAllocator;
use crate::config::MIN_ORDER;
use core::alloc::{GlobalAlloc, Layout};
use spin::Mutex;

const SIZE_CLASSES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];
const NUM_CLASSES: usize = SIZE_CLASSES.len();
const SLAB_BLOCK_SIZE: usize = 1 << MIN_ORDER;

struct SlabNode(*mut SlabNode);

struct Inner {
    buddy: BuddyAllocator,
    free_lists: [*mut SlabNode; NUM_CLASSES],
}

unsafe impl Send for Inner {}

impl Inner {
    const fn new() -> Self {
        Inner { buddy: BuddyAllocator::new(), free_lists: [core::ptr::null_mut(); NUM_CLASSES] }
    }

    fn push_slot(&mut self, class_idx: usize, addr: usize) {
        let node = addr as *mut SlabNode;
        unsafe {
            (*node).0 = self.free_lists[class_idx];
        }
        self.free_lists[class_idx] = node;
    }

    fn pop_slot(&mut self, class_idx: usize) -> Option<usize> {
        let node = self.free_lists[class_idx];
        if node.is_null() {
            return None;
        }
        self.free_lists[class_idx] = unsafe { (*node).0 };
        Some(node as usize)
    }

    /// Pull a fresh `MIN_ORDER` block from the buddy heap and carve it into
    /// fixed-size slots for `class_idx`, growing that class's free list.
    fn refill(&mut self, class_idx: usize) -> Result<(), crate::memory::error::MmError> {
        let block = self.buddy.alloc(SLAB_BLOCK_SIZE)?;
        let slot_size = SIZE_CLASSES[class_idx];
        let slots_per_block = SLAB_BLOCK_SIZE / slot_size;
        for i in 0..slots_per_block {
            self.push_slot(class_idx, block + i * slot_size);
        }
        Ok(())
    }

    fn class_for(size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&class| size <= class)
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        match Self::class_for(size) {
            Some(idx) => {
                if self.free_lists[idx].is_null() && self.refill(idx).is_err() {
                    return core::ptr::null_mut();
                }
                match self.pop_slot(idx) {
                    Some(addr) => addr as *mut u8,
                    None => core::ptr::null_mut(),
                }
            }
            None => match self.buddy.alloc(size) {
                Ok(addr) => addr as *mut u8,
                Err(_) => core::ptr::null_mut(),
            },
        }
    }

    fn dealloc(&mut self, ptr: *mut u8, size: usize) {
        match Self::class_for(size) {
            Some(idx) => self.push_slot(idx, ptr as usize),
            None => self.buddy.free(ptr as usize, size),
        }
    }
}

pub struct KernelAllocator {
    inner: Mutex<Inner>,
}

impl KernelAllocator {
    pub const fn new() -> Self {
        KernelAllocator { inner: Mutex::new(Inner::new()) }
    }

    pub fn init(&self) {
        self.inner.lock().buddy.init();
    }
}

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(layout.align());
        self.inner.lock().alloc(size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let size = layout.size().max(layout.align());
        self.inner.lock().dealloc(ptr, size);
    }
}

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator::new();

/// Map heap-exhaustion to an abort rather than a silent null-deref: an
/// unrecoverable resource exhaustion panics with context, same as every
/// other allocator failure mode here (callers that can tolerate OOM
/// should check `Layout` sizes against `stats()` up front
/// instead of relying on this handler).
#[alloc_error_handler]
fn alloc_error_handler(layout: Layout) -> ! {
    panic!("kmalloc: out of heap allocating {} bytes (align {})", layout.size(), layout.align());
}

pub fn init() {
    ALLOCATOR.init();
}

pub fn stats() -> crate::memory::buddy::BuddyStats {
    ALLOCATOR.inner.lock().buddy.stats()
}
