//! Compile-time tunables shared across the core subsystems.
//!
//! Collecting these here keeps every tunable choice at one authoritative
//! value instead of magic numbers scattered through the tree.

/// Size of one physical page frame / virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Buddy heap order bounds. Order k spans `2^k` bytes.
pub const MIN_ORDER: usize = 12; // 4 KiB
pub const MAX_ORDER: usize = 20; // 1 MiB

/// Virtual window the kernel buddy heap is carved from.
pub const HEAP_START: usize = 0xD000_0000;
pub const HEAP_SIZE: usize = 4 * 1024 * 1024; // 4 MiB

/// Lowest/highest virtual address a user VMA may occupy. Below this is
/// reserved for the null-pointer guard page; at and above
/// `KERNEL_SPACE_START` is the shared kernel half, identical in every
/// address space.
pub const USER_SPACE_START: u32 = 0x0040_0000;
pub const KERNEL_SPACE_START: u32 = 0xC000_0000;

/// Default user stack size for a freshly ELF-loaded process.
pub const USER_STACK_SIZE: usize = 256 * 1024;
/// Top of the user stack region (grows down from here).
pub const USER_STACK_TOP: u32 = KERNEL_SPACE_START - PAGE_SIZE as u32;

/// Priority levels: 0 is highest, `NUM_PRIORITIES - 1` is the idle task's
/// fixed, never-changing priority.
pub const NUM_PRIORITIES: usize = 16;
pub const IDLE_PRIORITY: u8 = (NUM_PRIORITIES - 1) as u8;
pub const DEFAULT_PRIORITY: u8 = 8;

/// Ticks granted to a task per visit to the head of its runqueue.
pub const TIME_SLICE_TICKS: u32 = 5;

/// Hardware timer frequency, in Hz, as programmed into the PIT.
pub const TIMER_HZ: u32 = 100;

/// Size of the kernel stack allocated per task.
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// Syscall dispatch table size.
pub const MAX_SYSCALLS: usize = 256;

/// Per-process open-file-descriptor table size.
pub const MAX_OPEN_FILES: usize = 64;

/// Maximum live processes; bounds the process table's PID space.
pub const MAX_PROCESSES: usize = 256;

/// PID reserved for the init process.
pub const INIT_PID: u32 = 1;
