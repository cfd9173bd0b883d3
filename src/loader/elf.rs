//! ELF32 loader.
//!
//! Parses a 32-bit, little-endian, `ET_EXEC` ELF image and builds the VMAs
//! an `AddressSpace` needs to run it: one `FileCopy`-backed VMA per
//! `PT_LOAD` segment, plus an `AnonymousPreallocated` user stack pre-loaded
//! with `argv`/`envp` per the System V i386 process-startup layout. Doesn't
//! touch the process table or scheduler — `process::spawn_from_elf` and
//! `execve_replace` are the callers that wire a `LoadedImage` into a PCB.

use crate::config::{PAGE_SIZE, USER_SPACE_START, USER_STACK_SIZE, USER_STACK_TOP};
use crate::errno::Errno;
use crate::memory::vma::{AddressSpace, FaultPolicy, FileBacking, FileBackingHandle, Vma, VmaFlags};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;
const PT_LOAD: u32 = 1;

const PF_X: u32 = 1 << 0;
const PF_W: u32 = 1 << 1;
const PF_R: u32 = 1 << 2;

#[derive(Debug)]
pub enum ExecError {
    FileNotFound,
    ReadError,
    InvalidFormat,
    UnsupportedArch,
    UnsupportedType,
    OutOfRange,
    MemoryError,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ExecError::FileNotFound => "file not found",
            ExecError::ReadError => "file read error",
            ExecError::InvalidFormat => "invalid ELF format",
            ExecError::UnsupportedArch => "unsupported architecture (need 32-bit little-endian x86)",
            ExecError::UnsupportedType => "unsupported ELF type (need ET_EXEC)",
            ExecError::OutOfRange => "segment outside allowed user range, or overlapping",
            ExecError::MemoryError => "out of memory building address space",
        };
        write!(f, "{}", msg)
    }
}

impl From<crate::memory::error::MmError> for ExecError {
    fn from(_: crate::memory::error::MmError) -> ExecError {
        ExecError::MemoryError
    }
}

impl From<ExecError> for Errno {
    fn from(e: ExecError) -> Errno {
        match e {
            ExecError::FileNotFound => Errno::NoEnt,
            ExecError::ReadError => Errno::Io,
            ExecError::InvalidFormat | ExecError::UnsupportedArch | ExecError::UnsupportedType => Errno::Inval,
            ExecError::OutOfRange => Errno::Fault,
            ExecError::MemoryError => Errno::NoMem,
        }
    }
}

struct Elf32Ehdr {
    e_entry: u32,
    e_phoff: u32,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Elf32Ehdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 52 {
            return Err(ExecError::InvalidFormat);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(ExecError::InvalidFormat);
        }
        if data[4] != ELFCLASS32 || data[5] != ELFDATA2LSB {
            return Err(ExecError::UnsupportedArch);
        }
        let e_type = u16::from_le_bytes([data[16], data[17]]);
        let e_machine = u16::from_le_bytes([data[18], data[19]]);
        if e_machine != EM_386 {
            return Err(ExecError::UnsupportedArch);
        }
        if e_type != ET_EXEC {
            return Err(ExecError::UnsupportedType);
        }
        Ok(Elf32Ehdr {
            e_entry: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            e_phoff: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes([data[42], data[43]]),
            e_phnum: u16::from_le_bytes([data[44], data[45]]),
        })
    }
}

struct Elf32Phdr {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
}

impl Elf32Phdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 32 {
            return Err(ExecError::InvalidFormat);
        }
        Ok(Elf32Phdr {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            p_vaddr: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            p_filesz: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            p_memsz: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            p_flags: u32::from_le_bytes(data[24..28].try_into().unwrap()),
        })
    }
}

/// What a successful load produced: the entry point and the already-built
/// user stack pointer (argv/envp already written), ready to hand to
/// `enter_usermode`.
pub struct LoadedImage {
    pub entry: u32,
    pub user_stack_top: u32,
}

fn align_down(addr: u32) -> u32 {
    addr & !(PAGE_SIZE as u32 - 1)
}

fn align_up(addr: u32) -> u32 {
    (addr + PAGE_SIZE as u32 - 1) & !(PAGE_SIZE as u32 - 1)
}

/// Load an ELF32 image from `path` into `aspace`, populating its VMAs, and
/// return the entry point and a ready-to-use user stack carrying `argv`/
/// `envp`. `aspace` must be otherwise empty — the caller builds a fresh one
/// for `execve`/process creation rather than reusing a live one.
pub fn load_image(path: &str, aspace: &mut AddressSpace, argv: &[&str], envp: &[&str]) -> Result<LoadedImage, ExecError> {
    let file_data = crate::fs::read_whole_file(path).map_err(|_| ExecError::FileNotFound)?;
    let ehdr = Elf32Ehdr::parse(&file_data)?;

    let mut max_end = USER_SPACE_START;
    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let data = file_data.get(off..).ok_or(ExecError::InvalidFormat)?;
        let phdr = Elf32Phdr::parse(data)?;
        if phdr.p_type != PT_LOAD {
            continue;
        }
        if phdr.p_vaddr < USER_SPACE_START || phdr.p_vaddr.checked_add(phdr.p_memsz).is_none() {
            return Err(ExecError::OutOfRange);
        }

        let vma_start = align_down(phdr.p_vaddr);
        let vma_end = align_up(phdr.p_vaddr + phdr.p_memsz);
        if vma_end >= crate::config::KERNEL_SPACE_START {
            return Err(ExecError::OutOfRange);
        }

        let mut flags = VmaFlags::USER;
        if phdr.p_flags & PF_R != 0 {
            flags |= VmaFlags::READ;
        }
        if phdr.p_flags & PF_W != 0 {
            flags |= VmaFlags::WRITE;
        }
        if phdr.p_flags & PF_X != 0 {
            flags |= VmaFlags::EXEC;
        }

        // Lay the segment's logical bytes out in a standalone buffer sized
        // to the whole (page-aligned) VMA: file bytes at their in-segment
        // offset, the memsz-filesz tail and any alignment padding left
        // zero. `populate_page` then only needs an offset and a length.
        let seg_len = (vma_end - vma_start) as usize;
        let mut backing_bytes = vec![0u8; seg_len];
        let rel_in_vma = (phdr.p_vaddr - vma_start) as usize;
        let file_start = phdr.p_offset as usize;
        let file_end = file_start.checked_add(phdr.p_filesz as usize).ok_or(ExecError::InvalidFormat)?;
        let src = file_data.get(file_start..file_end).ok_or(ExecError::InvalidFormat)?;
        backing_bytes[rel_in_vma..rel_in_vma + src.len()].copy_from_slice(src);

        let backing = FileBacking { data: Arc::new(backing_bytes), file_len: seg_len as u32 };
        aspace.add_vma(Vma { start: vma_start, end: vma_end, flags, policy: FaultPolicy::FileCopy(FileBackingHandle(backing)) })?;

        max_end = max_end.max(vma_end);
    }

    if max_end == USER_SPACE_START {
        return Err(ExecError::InvalidFormat); // no PT_LOAD segments at all
    }

    aspace.set_brk(max_end)?;

    let stack_start = USER_STACK_TOP - USER_STACK_SIZE as u32;
    aspace.add_vma(Vma {
        start: stack_start,
        end: USER_STACK_TOP,
        flags: VmaFlags::READ | VmaFlags::WRITE | VmaFlags::USER,
        policy: FaultPolicy::AnonymousPreallocated,
    })?;

    let user_stack_top = write_stack(aspace, USER_STACK_TOP, argv, envp);

    Ok(LoadedImage { entry: ehdr.e_entry, user_stack_top })
}

/// Lay out `argc`/`argv`/`envp`/strings at the top of an already-mapped
/// stack VMA, System-V i386 process-startup style:
/// `[strings][envp ptrs][NULL][argv ptrs][NULL][argc]`, growing down from
/// `top`. Returns the resulting stack pointer (pointing at `argc`).
fn write_stack(aspace: &AddressSpace, top: u32, argv: &[&str], envp: &[&str]) -> u32 {
    let mut cursor = top;

    let mut write_strings = |strs: &[&str]| -> Vec<u32> {
        let mut ptrs = Vec::with_capacity(strs.len());
        for s in strs {
            cursor -= (s.len() + 1) as u32;
            for (i, b) in s.bytes().enumerate() {
                write_u8(aspace, cursor + i as u32, b);
            }
            write_u8(aspace, cursor + s.len() as u32, 0);
            ptrs.push(cursor);
        }
        ptrs
    };

    let argv_ptrs = write_strings(argv);
    let envp_ptrs = write_strings(envp);

    cursor &= !0x3; // word-align before the pointer arrays

    cursor -= 4; // envp NULL terminator
    write_u32(aspace, cursor, 0);
    for &p in envp_ptrs.iter().rev() {
        cursor -= 4;
        write_u32(aspace, cursor, p);
    }

    cursor -= 4; // argv NULL terminator
    write_u32(aspace, cursor, 0);
    for &p in argv_ptrs.iter().rev() {
        cursor -= 4;
        write_u32(aspace, cursor, p);
    }

    cursor -= 4;
    write_u32(aspace, cursor, argv_ptrs.len() as u32); // argc

    cursor
}

fn write_u8(aspace: &AddressSpace, vaddr: u32, byte: u8) {
    let page = align_down(vaddr);
    let (phys, _) = aspace.directory.translate(page).expect("stack page not mapped");
    let offset = vaddr - page;
    unsafe { core::ptr::write((phys + offset) as *mut u8, byte) };
}

fn write_u32(aspace: &AddressSpace, vaddr: u32, value: u32) {
    for (i, b) in value.to_le_bytes().iter().enumerate() {
        write_u8(aspace, vaddr + i as u32, *b);
    }
}

/// Naked entry point a freshly `execve`'d or spawned task's `Context`
/// lands at: `switch_context`/`restore_context` leave the user entry point
/// in `ebx` and the user stack top in `esi` (the scratch-register
/// convention `scheduler::context::Context` documents), so this just
/// forwards them into `enter_usermode` as cdecl arguments.
#[unsafe(naked)]
pub extern "C" fn usermode_trampoline() -> ! {
    core::arch::naked_asm!(
        "push esi",
        "push ebx",
        "call {enter}",
        enter = sym enter_usermode,
    );
}

extern "C" fn enter_usermode(entry: u32, user_stack_top: u32) -> ! {
    let user_cs = crate::interrupts::gdt::user_code_selector();
    let user_ss = crate::interrupts::gdt::user_data_selector();
    crate::log_info!("jumping to ring 3: entry={:#x} stack={:#x}", entry, user_stack_top);
    crate::interrupts::usermode::jump_to_usermode(entry, user_stack_top, user_cs, user_ss)
}

/// The name a spawned task is given in the process table when no more
/// descriptive caller-supplied name is available.
pub fn filename_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).into()
}
