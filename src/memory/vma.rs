//! VMAs and the address-space (mm) container.

use crate::config::{KERNEL_SPACE_START, PAGE_SIZE, USER_SPACE_START};
use crate::memory::error::MmError;
use crate::memory::paging::{PageDirectory, PageFlags};
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmaFlags: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
        const USER  = 1 << 3;
    }
}

/// The bytes an ELF `PT_LOAD` segment contributes to a file-backed VMA.
/// Held as a whole-segment buffer (this loader reads files through the VFS
/// collaborator once, up front, rather than re-opening them per fault) so
/// `populate_page` only needs an offset and a length to decide how much of
/// a faulting page comes from the file versus from zero-fill.
#[derive(Debug, Clone)]
pub struct FileBacking {
    pub data: Arc<Vec<u8>>,
    /// Length of `data` that is valid file content; anything in the VMA
    /// past this (the segment's `memsz - filesz` tail) is zero-filled.
    pub file_len: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultPolicy {
    ZeroFill,
    FileCopy(FileBackingHandle),
    AnonymousPreallocated,
}

/// `FileBacking` wraps an `Arc` but still needs `PartialEq`/`Eq` for
/// `set_brk`'s `policy == FaultPolicy::ZeroFill` comparison; compare by
/// pointer identity rather than deep content equality.
#[derive(Debug, Clone)]
pub struct FileBackingHandle(pub FileBacking);

impl PartialEq for FileBackingHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0.data, &other.0.data) && self.0.file_len == other.0.file_len
    }
}
impl Eq for FileBackingHandle {}

/// A half-open virtual range, page-aligned, with a fault policy deciding
/// how a not-yet-populated page within it is resolved.
#[derive(Debug, Clone)]
pub struct Vma {
    pub start: u32,
    pub end: u32,
    pub flags: VmaFlags,
    pub policy: FaultPolicy,
}

impl Vma {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end
    }

    fn page_flags(&self) -> PageFlags {
        let mut flags = PageFlags::empty();
        if self.flags.contains(VmaFlags::WRITE) {
            flags |= PageFlags::WRITABLE;
        }
        if self.flags.contains(VmaFlags::USER) {
            flags |= PageFlags::USER;
        }
        flags
    }
}

/// One process's address space: VMAs, page directory, and program break.
/// Invariant (enforced by `add_vma`): VMAs never overlap.
pub struct AddressSpace {
    pub directory: PageDirectory,
    vmas: Vec<Vma>,
    brk: u32,
    heap_vma_end_floor: u32,
}

impl AddressSpace {
    pub fn new() -> Result<AddressSpace, MmError> {
        Ok(AddressSpace {
            directory: PageDirectory::new()?,
            vmas: Vec::new(),
            brk: USER_SPACE_START,
            heap_vma_end_floor: USER_SPACE_START,
        })
    }

    pub fn add_vma(&mut self, vma: Vma) -> Result<(), MmError> {
        assert!(vma.start % PAGE_SIZE as u32 == 0 && vma.end % PAGE_SIZE as u32 == 0, "VMA bounds must be page-aligned");
        assert!(vma.start < vma.end, "VMA must be non-empty");
        if self.vmas.iter().any(|existing| existing.start < vma.end && vma.start < existing.end) {
            return Err(MmError::Overlap);
        }
        self.heap_vma_end_floor = self.heap_vma_end_floor.max(vma.end);

        // Anonymous-preallocated VMAs (the loader's argv/envp-carrying user
        // stack) must have real frames behind every page before the caller
        // can write into them — unlike zero-fill/file-copy regions, nothing
        // ever demand-faults them in.
        if vma.policy == FaultPolicy::AnonymousPreallocated {
            let flags = vma.page_flags();
            let mut addr = vma.start;
            while addr < vma.end {
                let frame = crate::memory::allocate_frame()?;
                crate::memory::zero_frame_external(frame);
                self.directory.map(addr, frame, flags)?;
                addr += PAGE_SIZE as u32;
            }
        }

        self.vmas.push(vma);
        Ok(())
    }

    pub fn find_vma(&self, addr: u32) -> Option<&Vma> {
        self.vmas.iter().find(|v| v.contains(addr))
    }

    /// Grow or shrink the break — the authoritative path for process heap
    /// sizing, called directly by whatever in-kernel code needs it (loader
    /// setup today; `sys_brk` itself is a `-ENOSYS` stub, since nothing in
    /// the core subset calls it across the syscall boundary). Extends or
    /// shrinks the last heap VMA in place, or creates one the first time
    /// `brk` is asked to grow past `USER_SPACE_START`.
    pub fn set_brk(&mut self, new_brk: u32) -> Result<u32, MmError> {
        if new_brk < USER_SPACE_START || new_brk >= KERNEL_SPACE_START {
            return Err(MmError::InvalidAddress);
        }
        let aligned = align_up(new_brk);

        if let Some(idx) = self.vmas.iter().position(|v| v.policy == FaultPolicy::ZeroFill && v.start == USER_SPACE_START) {
            let heap_start = self.vmas[idx].start;
            let old_end = self.vmas[idx].end;
            if aligned > old_end && self.vmas.iter().any(|o| o.start != heap_start && o.start < aligned && old_end < o.end) {
                return Err(MmError::Overlap);
            }
            let new_end = aligned.max(heap_start);
            if new_end < old_end {
                // Shrinking: unmap and return every page from the new break
                // up to the old one. Pages that were never demand-faulted
                // in simply aren't mapped yet, which is not an error here.
                let mut addr = new_end;
                while addr < old_end {
                    if let Ok(phys) = self.directory.unmap(addr) {
                        crate::memory::free_frame(phys);
                    }
                    addr += PAGE_SIZE as u32;
                }
            }
            self.vmas[idx].end = new_end;
        } else {
            self.vmas.push(Vma {
                start: USER_SPACE_START,
                end: aligned.max(USER_SPACE_START + PAGE_SIZE as u32),
                flags: VmaFlags::READ | VmaFlags::WRITE | VmaFlags::USER,
                policy: FaultPolicy::ZeroFill,
            });
        }
        self.brk = new_brk;
        Ok(self.brk)
    }

    pub fn brk(&self) -> u32 {
        self.brk
    }

    /// Populate a single faulting page within `vma` according to its
    /// policy, mapping it into the directory. Called from the page-fault
    /// handler once the VMA lookup and permission check have passed.
    ///
    /// `AnonymousPreallocated` pages are mapped by `add_vma` up front, so
    /// reaching this function for one means a page was unmapped out from
    /// under its VMA — treated the same as a fresh zero-fill rather than
    /// failing the fault.
    pub fn populate_page(&mut self, vma_index: usize, page_addr: u32) -> Result<(), MmError> {
        let vma = &self.vmas[vma_index];
        let flags = vma.page_flags();
        let frame = crate::memory::allocate_frame()?;
        crate::memory::zero_frame_external(frame);

        if let FaultPolicy::FileCopy(FileBackingHandle(backing)) = &vma.policy {
            let rel = (page_addr - vma.start) as usize;
            if rel < backing.file_len as usize {
                let copy_len = (backing.file_len as usize - rel).min(PAGE_SIZE);
                let src = &backing.data[rel..rel + copy_len];
                unsafe {
                    core::ptr::copy_nonoverlapping(src.as_ptr(), frame as *mut u8, copy_len);
                }
            }
        }

        self.directory.map(page_addr, frame, flags)
    }

    pub fn vma_index_at(&self, addr: u32) -> Option<usize> {
        self.vmas.iter().position(|v| v.contains(addr))
    }

    pub fn vma_at(&self, index: usize) -> &Vma {
        &self.vmas[index]
    }

    /// Eager copy for `fork`: every present page in the parent is copied
    /// into a freshly allocated frame in the child (this design explicitly
    /// chooses eager copy over copy-on-write).
    pub fn fork_copy(&self) -> Result<AddressSpace, MmError> {
        let mut child = AddressSpace::new()?;
        for vma in &self.vmas {
            child.add_vma(vma.clone())?;
            let mut addr = vma.start;
            while addr < vma.end {
                if let Some((phys, flags)) = self.directory.translate(addr) {
                    let new_frame = crate::memory::allocate_frame()?;
                    unsafe {
                        core::ptr::copy_nonoverlapping(phys as *const u8, new_frame as *mut u8, PAGE_SIZE);
                    }
                    child.directory.map(addr, new_frame, flags)?;
                }
                addr += PAGE_SIZE as u32;
            }
        }
        child.brk = self.brk;
        Ok(child)
    }

    pub fn destroy(&mut self) {
        self.directory.destroy();
        self.vmas.clear();
    }
}

fn align_up(addr: u32) -> u32 {
    (addr + PAGE_SIZE as u32 - 1) & !(PAGE_SIZE as u32 - 1)
}

#[cfg(test)]
impl AddressSpace {
    /// A state-only `AddressSpace` for host-side unit tests that need a
    /// `Process` record (e.g. `process::table`'s priority-inheritance
    /// tests) but never touch a real page table — `PageDirectory::new()`
    /// requires a live frame allocator, unavailable outside the kernel.
    pub fn new_for_test() -> AddressSpace {
        AddressSpace {
            directory: PageDirectory { phys_addr: 0 },
            vmas: Vec::new(),
            brk: USER_SPACE_START,
            heap_vma_end_floor: USER_SPACE_START,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vma(start: u32, end: u32) -> Vma {
        Vma { start, end, flags: VmaFlags::READ | VmaFlags::WRITE | VmaFlags::USER, policy: FaultPolicy::ZeroFill }
    }

    #[test]
    fn non_overlap_is_enforced() {
        // This only exercises the pure overlap check; building a real
        // AddressSpace needs a live frame allocator, out of scope for a
        // unit test over data-structure invariants.
        let a = vma(USER_SPACE_START, USER_SPACE_START + 0x1000);
        let b = vma(USER_SPACE_START + 0x1000, USER_SPACE_START + 0x2000);
        let c = vma(USER_SPACE_START + 0x800, USER_SPACE_START + 0x1800);
        assert!(!(a.start < b.end && b.start < a.end));
        assert!(a.start < c.end && c.start < a.end);
    }
}
