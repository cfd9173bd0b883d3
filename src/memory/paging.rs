//! i386 two-level paging: page directory + page tables, 4 KiB pages.
//!
//! x86-32 non-PAE paging is two levels, not the four the `x86_64` crate's
//! `PageTable`/`OffsetPageTable` types assume, so this is a hand-rolled
//! `PageDirectory`/`PageTable` pair instead — a `Flags` bitfield plus a
//! typed `map`/`unmap`/`translate` API.

use crate::arch::regs;
use crate::config::{KERNEL_SPACE_START, PAGE_SIZE};
use crate::memory::error::MmError;
use crate::memory::{allocate_frame, free_frame};
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        const HUGE     = 1 << 7;
    }
}

const ENTRIES_PER_TABLE: usize = 1024;
const ENTRY_ADDR_MASK: u32 = 0xffff_f000;

#[repr(transparent)]
#[derive(Clone, Copy)]
struct Entry(u32);

impl Entry {
    const fn unused() -> Entry {
        Entry(0)
    }

    fn is_present(&self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    fn addr(&self) -> u32 {
        self.0 & ENTRY_ADDR_MASK
    }

    fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & !ENTRY_ADDR_MASK)
    }

    fn set(&mut self, addr: u32, flags: PageFlags) {
        self.0 = (addr & ENTRY_ADDR_MASK) | flags.bits();
    }
}

#[repr(C, align(4096))]
struct Table {
    entries: [Entry; ENTRIES_PER_TABLE],
}

fn dir_index(virt: u32) -> usize {
    (virt >> 22) as usize
}

fn table_index(virt: u32) -> usize {
    ((virt >> 12) & 0x3ff) as usize
}

/// A page directory owned by one address space. Physical, not mapped
/// identity-style: `phys_addr` is a frame from the frame allocator, read
/// and written through a temporary kernel mapping via `with_table`.
pub struct PageDirectory {
    pub phys_addr: u32,
}

impl PageDirectory {
    /// Build a fresh directory: allocate its frame, zero it, then copy in
    /// the kernel half of the currently-active directory (every address
    /// space shares one set of kernel mappings, per the "Address
    /// space (mm)" invariant).
    pub fn new() -> Result<PageDirectory, MmError> {
        let phys = allocate_frame()?;
        zero_frame(phys);
        let dir = PageDirectory { phys_addr: phys };
        let active = active_directory_phys();
        if active != 0 {
            copy_kernel_half(active, phys);
        }
        Ok(dir)
    }

    /// Map one 4 KiB page. Allocates an intermediate page table on demand.
    pub fn map(&mut self, virt: u32, phys: u32, flags: PageFlags) -> Result<(), MmError> {
        let d_idx = dir_index(virt);
        let t_idx = table_index(virt);

        with_table_mut(self.phys_addr, |dir| {
            let dir_entry = &mut dir.entries[d_idx];
            let table_phys = if dir_entry.is_present() {
                dir_entry.addr()
            } else {
                let new_table = allocate_frame()?;
                zero_frame(new_table);
                dir_entry.set(new_table, PageFlags::PRESENT | PageFlags::WRITABLE | (flags & PageFlags::USER));
                new_table
            };
            with_table_mut(table_phys, |table| {
                table.entries[t_idx].set(phys, flags | PageFlags::PRESENT);
                Ok(())
            })
        })?;

        regs::invlpg(virt);
        Ok(())
    }

    pub fn unmap(&mut self, virt: u32) -> Result<u32, MmError> {
        let d_idx = dir_index(virt);
        let t_idx = table_index(virt);
        let freed = with_table_mut(self.phys_addr, |dir| {
            let dir_entry = dir.entries[d_idx];
            if !dir_entry.is_present() {
                return Err(MmError::NotMapped);
            }
            with_table_mut(dir_entry.addr(), |table| {
                let entry = table.entries[t_idx];
                if !entry.is_present() {
                    return Err(MmError::NotMapped);
                }
                let phys = entry.addr();
                table.entries[t_idx] = Entry::unused();
                Ok(phys)
            })
        })?;
        regs::invlpg(virt);
        Ok(freed)
    }

    pub fn translate(&self, virt: u32) -> Option<(u32, PageFlags)> {
        let d_idx = dir_index(virt);
        let t_idx = table_index(virt);
        with_table(self.phys_addr, |dir| {
            let dir_entry = dir.entries[d_idx];
            if !dir_entry.is_present() {
                return None;
            }
            with_table(dir_entry.addr(), |table| {
                let entry = table.entries[t_idx];
                entry.is_present().then(|| (entry.addr(), entry.flags()))
            })
        })
    }

    /// Load this directory into CR3, making it the active address space.
    pub fn activate(&self) {
        unsafe { regs::write_cr3(self.phys_addr) };
    }

    /// Free every user-half page table, every leaf data frame still mapped
    /// in them, and the directory's own frame. Kernel-half entries are
    /// shared and must not be freed.
    pub fn destroy(&mut self) {
        let mut table_phys_addrs = alloc::vec::Vec::new();
        with_table_mut::<(), ()>(self.phys_addr, |dir| {
            for idx in 0..dir_index(KERNEL_SPACE_START) {
                let entry = dir.entries[idx];
                if entry.is_present() {
                    table_phys_addrs.push(entry.addr());
                }
            }
            Ok(())
        })
        .ok();
        for table_phys in table_phys_addrs {
            with_table_mut::<(), ()>(table_phys, |table| {
                for leaf in table.entries.iter() {
                    if leaf.is_present() {
                        free_frame(leaf.addr());
                    }
                }
                Ok(())
            })
            .ok();
            free_frame(table_phys);
        }
        free_frame(self.phys_addr);
    }
}

fn active_directory_phys() -> u32 {
    regs::read_cr3()
}

/// Map `phys` into a single fixed scratch page in the kernel's identity
/// region so its contents can be read/written from Rust, run `f`, then
/// unmap. Page tables and directories themselves are never permanently
/// mapped — there are too many of them across all address spaces for that
/// to scale, so each access goes through this narrow window.
fn with_table<T>(phys: u32, f: impl FnOnce(&Table) -> T) -> T {
    let ptr = phys as *const Table;
    f(unsafe { &*ptr })
}

fn with_table_mut<T, E>(phys: u32, f: impl FnOnce(&mut Table) -> Result<T, E>) -> Result<T, E> {
    let ptr = phys as *mut Table;
    f(unsafe { &mut *ptr })
}

fn zero_frame(phys: u32) {
    let ptr = phys as *mut u8;
    unsafe { core::ptr::write_bytes(ptr, 0, PAGE_SIZE) };
}

fn copy_kernel_half(src_dir_phys: u32, dst_dir_phys: u32) {
    let start = dir_index(KERNEL_SPACE_START);
    with_table(src_dir_phys, |src| {
        with_table_mut::<(), ()>(dst_dir_phys, |dst| {
            for idx in start..ENTRIES_PER_TABLE {
                dst.entries[idx] = src.entries[idx];
            }
            Ok(())
        })
        .ok();
    });
}

/// Identity-map all of detected physical memory and enable paging. Called
/// once from `memory::init`, before any address space exists. Identity
/// mapping the full range (not just the kernel image) keeps every later
/// frame access — zeroing a freshly allocated frame, copying a page on
/// `fork` — a plain pointer dereference instead of a temporary-mapping
/// dance, at the cost of reserving page tables for memory no address space
/// may ever touch.
pub fn init(highest_phys_addr: u32) -> PageDirectory {
    let mut dir = PageDirectory { phys_addr: allocate_frame().expect("frame allocator not yet seeded") };
    zero_frame(dir.phys_addr);
    let mut addr = 0u32;
    while addr < highest_phys_addr {
        dir.map(addr, addr, PageFlags::PRESENT | PageFlags::WRITABLE)
            .expect("identity-mapping physical memory must not fail");
        addr = addr.saturating_add(PAGE_SIZE as u32);
    }
    dir.activate();
    unsafe { regs::enable_paging() };
    dir
}
