//! The runtime GDT and TSS.
//!
//! `boot.rs` installs a minimal flat GDT (two entries) purely to get out of
//! real mode. This module replaces it once Rust is running: kernel/user
//! code+data descriptors plus a 32-bit TSS, so ring 3 tasks can be entered
//! and `esp0` can be retargeted per-task on every context switch. The
//! `x86_64` crate's `GlobalDescriptorTable` has no i386 support, so the
//! descriptors are hand-rolled here following the standard Intel SDM layout.

use core::arch::asm;
use core::mem::size_of;
use lazy_static::lazy_static;
use spin::Mutex;

pub const KERNEL_CODE_SELECTOR: u16 = 1 << 3;
pub const KERNEL_DATA_SELECTOR: u16 = 2 << 3;
pub const USER_CODE_SELECTOR: u16 = (3 << 3) | 3;
pub const USER_DATA_SELECTOR: u16 = (4 << 3) | 3;
const TSS_SELECTOR: u16 = 5 << 3;

const GDT_ENTRIES: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> GdtEntry {
        GdtEntry {
            limit_low: (limit & 0xffff) as u16,
            base_low: (base & 0xffff) as u16,
            base_mid: ((base >> 16) & 0xff) as u8,
            access,
            granularity: (((limit >> 16) & 0x0f) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xff) as u8,
        }
    }

    const fn null() -> GdtEntry {
        GdtEntry { limit_low: 0, base_low: 0, base_mid: 0, access: 0, granularity: 0, base_high: 0 }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// 32-bit TSS (Intel SDM vol. 3 §7.2). Only `esp0`/`ss0` and `iomap_base`
/// matter for this kernel; every other field stays zero because tasks are
/// switched in software, not via the CPU's hardware task-switch mechanism.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
pub struct Tss {
    pub link: u16,
    _r0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _r1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _r2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _r3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _r4: u16,
    pub cs: u16,
    _r5: u16,
    pub ss: u16,
    _r6: u16,
    pub ds: u16,
    _r7: u16,
    pub fs: u16,
    _r8: u16,
    pub gs: u16,
    _r9: u16,
    pub ldt: u16,
    _r10: u16,
    pub trap: u16,
    pub iomap_base: u16,
}

lazy_static! {
    pub static ref TSS: Mutex<Tss> = Mutex::new(Tss {
        iomap_base: size_of::<Tss>() as u16,
        ..Default::default()
    });
}

struct Gdt {
    entries: [GdtEntry; GDT_ENTRIES],
}

static mut GDT: Gdt = Gdt {
    entries: [
        GdtEntry::null(),
        GdtEntry::new(0, 0xfffff, 0x9a, 0xc), // kernel code, ring0
        GdtEntry::new(0, 0xfffff, 0x92, 0xc), // kernel data, ring0
        GdtEntry::new(0, 0xfffff, 0xfa, 0xc), // user code, ring3
        GdtEntry::new(0, 0xfffff, 0xf2, 0xc), // user data, ring3
        GdtEntry::null(),                     // tss, patched in at init()
    ],
};

pub fn init() {
    let tss_addr = {
        let guard = TSS.lock();
        &*guard as *const Tss as u32
    };
    let tss_limit = size_of::<Tss>() as u32 - 1;

    unsafe {
        let gdt_ptr = &raw mut GDT;
        (*gdt_ptr).entries[5] = GdtEntry::new(tss_addr, tss_limit, 0x89, 0x0);

        let pointer = GdtPointer {
            limit: (size_of::<Gdt>() - 1) as u16,
            base: &raw const (*gdt_ptr).entries as u32,
        };
        asm!("lgdt [{0}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));

        asm!(
            "push {code_sel}",
            "lea eax, [2f]",
            "push eax",
            "retf",
            "2:",
            "mov ax, {data_sel:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            code_sel = const KERNEL_CODE_SELECTOR,
            data_sel = in(reg) KERNEL_DATA_SELECTOR,
            out("eax") _,
        );

        asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Update `esp0` in the TSS so ring3→ring0 transitions land on the current
/// task's kernel stack. Called from the scheduler on every context switch.
pub fn set_tss_esp0(kernel_stack_top: u32) {
    TSS.lock().esp0 = kernel_stack_top;
}

pub fn user_code_selector() -> u16 {
    USER_CODE_SELECTOR
}

pub fn user_data_selector() -> u16 {
    USER_DATA_SELECTOR
}
