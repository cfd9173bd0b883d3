//! Parser for the Multiboot v1 information structure the bootloader leaves
//! at the physical address in `EBX`. Earlier code depended on
//! the `multiboot2` crate for this; that crate speaks the v2 protocol
//! (`EAX=0x36D76289`) which doesn't match what `boot.rs`'s header and
//! `multiboot_entry` actually negotiate (`EAX=0x2BADB002`), so this is a
//! narrow hand-rolled reader of just the fields the kernel needs: the
//! memory map.

const MEMORY_MAP_FLAG: u32 = 1 << 6;

#[repr(C, packed)]
struct RawInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    boot_device: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
    _syms: [u32; 4],
    mmap_length: u32,
    mmap_addr: u32,
}

#[repr(C, packed)]
struct RawMmapEntry {
    size: u32,
    base_addr: u64,
    length: u64,
    entry_type: u32,
}

/// One entry of the BIOS-reported physical memory map.
#[derive(Debug, Clone, Copy)]
pub struct MemoryArea {
    pub base: u64,
    pub length: u64,
    pub available: bool,
}

/// A minimal view over the Multiboot v1 info struct: just the memory map,
/// which is all `memory::init` needs to seed the frame allocator.
pub struct BootInfo {
    areas_ptr: *const RawMmapEntry,
    areas_bytes: u32,
}

impl BootInfo {
    /// # Safety
    /// `addr` must be the physical `EBX` value handed to `kernel_main`,
    /// pointing at a live Multiboot v1 info structure.
    pub unsafe fn load(addr: u32) -> BootInfo {
        let info = &*(addr as *const RawInfo);
        assert!(info.flags & MEMORY_MAP_FLAG != 0, "Multiboot info has no memory map");
        BootInfo { areas_ptr: info.mmap_addr as *const RawMmapEntry, areas_bytes: info.mmap_length }
    }

    /// Iterate the memory map. Each `RawMmapEntry` is prefixed by its own
    /// `size` field (excluding that field itself), per the Multiboot v1
    /// spec, so the walk is by variable stride, not `size_of::<RawMmapEntry>()`.
    pub fn memory_areas(&self) -> impl Iterator<Item = MemoryArea> + '_ {
        MmapIter { cursor: self.areas_ptr as *const u8, end: unsafe { self.areas_ptr.cast::<u8>().add(self.areas_bytes as usize) } }
    }
}

struct MmapIter {
    cursor: *const u8,
    end: *const u8,
}

impl Iterator for MmapIter {
    type Item = MemoryArea;

    fn next(&mut self) -> Option<MemoryArea> {
        if self.cursor >= self.end {
            return None;
        }
        let entry = unsafe { &*(self.cursor as *const RawMmapEntry) };
        let size = entry.size;
        let area = MemoryArea { base: entry.base_addr, length: entry.length, available: entry.entry_type == 1 };
        self.cursor = unsafe { self.cursor.add(size as usize + core::mem::size_of::<u32>()) };
        Some(area)
    }
}
