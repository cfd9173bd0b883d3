//! The IDT and its exception/IRQ handlers.
//!
//! Hand-rolled rather than built on the `x86_64` crate's
//! `InterruptDescriptorTable`: a `lazy_static!`-free static table (it must
//! live at a fixed address for `lidt`), one `set_gate` call per vector, PIC
//! remap via `pic8259` (word-size independent), and handlers that log
//! through `serial` before deciding whether the fault is recoverable.

use crate::arch::regs;
use crate::{log_error, log_info};
use core::arch::asm;
use core::mem::size_of;
use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

/// The register state the CPU pushes (and the x86-interrupt ABI exposes)
/// on entry to an interrupt gate, absent an error code.
#[repr(C)]
#[derive(Debug)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> IdtEntry {
        IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> IdtEntry {
        IdtEntry {
            offset_low: (handler & 0xffff) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xffff) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

const INTERRUPT_GATE: u8 = 0x8e; // present, ring0, 32-bit interrupt gate
const USER_INTERRUPT_GATE: u8 = 0xee; // present, ring3 (DPL=3), 32-bit interrupt gate

static mut IDT: [IdtEntry; 256] = [IdtEntry::missing(); 256];

/// Install a ring-3-reachable gate, for the `int 0x80` syscall vector.
/// Called once from `usermode::install_gate` after `init()` has loaded the
/// rest of the table.
pub fn set_user_gate(vector: usize, handler: u32) {
    use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;
    unsafe {
        let idt_ptr = &raw mut IDT;
        (*idt_ptr)[vector] = IdtEntry::new(handler, KERNEL_CODE_SELECTOR, USER_INTERRUPT_GATE);
    }
}

pub fn init() {
    use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;

    unsafe {
        let idt_ptr = &raw mut IDT;
        (*idt_ptr)[0] = IdtEntry::new(divide_by_zero_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[3] = IdtEntry::new(breakpoint_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[8] = IdtEntry::new(double_fault_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[13] = IdtEntry::new(general_protection_fault_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[14] = IdtEntry::new(page_fault_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[InterruptIndex::Timer.as_usize()] =
            IdtEntry::new(timer_interrupt_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);
        (*idt_ptr)[InterruptIndex::Keyboard.as_usize()] =
            IdtEntry::new(keyboard_interrupt_handler as u32, KERNEL_CODE_SELECTOR, INTERRUPT_GATE);

        let pointer = IdtPointer {
            limit: (size_of::<[IdtEntry; 256]>() - 1) as u16,
            base: &raw const (*idt_ptr) as u32,
        };
        asm!("lidt [{0}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }
}

extern "x86-interrupt" fn divide_by_zero_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: DIVIDE BY ZERO\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log_info!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, _error_code: u32) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(stack_frame: InterruptStackFrame, error_code: u32) {
    let fault_addr = regs::read_cr2();
    if crate::memory::page_fault::handle(fault_addr, error_code) {
        return;
    }
    log_error!("EXCEPTION: PAGE FAULT");
    log_error!("Accessed Address: {:#x}", fault_addr);
    log_error!("Error Code: {:#x}", error_code);
    panic!("EXCEPTION: PAGE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(stack_frame: InterruptStackFrame, error_code: u32) {
    panic!("EXCEPTION: GENERAL PROTECTION FAULT\nError Code: {error_code:#x}\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::scheduler::tick();
    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    use crate::arch::port::Port;
    let mut port: Port<u8> = Port::new(0x60);
    let scancode = unsafe { port.read() };

    crate::drivers::keyboard::push_scancode(scancode);

    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Keyboard.as_u8());
    }
}
