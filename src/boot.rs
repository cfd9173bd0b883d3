//! Multiboot v1 header and the protected-mode entry stub.
//!
//! The loader hands control to `multiboot_entry` with EAX=0x2BADB002,
//! EBX=physical address of the Multiboot info struct, 32-bit protected mode,
//! paging off, and segment registers in an unspecified state. Everything up
//! to and including the jump into `kernel_main` has to run without a stack
//! frame we can trust, so it lives here as a single `global_asm!` block
//! rather than ordinary Rust.

use core::arch::global_asm;

/// Bytes reserved for the boot-time stack, used only until the scheduler
/// switches onto the first task's own kernel stack.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

global_asm!(
    r#"
.section .multiboot_header, "a"
.align 4
multiboot_header:
    .long 0x1BADB002                         # magic
    .long 0x00000003                         # flags: align modules, provide mem info
    .long -(0x1BADB002 + 0x00000003)         # checksum

.section .boot.text, "ax"
.code32
.global multiboot_entry
.type multiboot_entry, @function
multiboot_entry:
    cli
    mov esp, offset boot_stack_top
    xor ebp, ebp

    # Stash the Multiboot magic (EAX) and info pointer (EBX) across the GDT
    # reload — a far jump clobbers nothing here, but we keep them off the
    # stack in callee-saved registers for clarity.
    push eax
    push ebx

    lgdt [boot_gdt_descriptor]

    push 0x08                  # kernel code selector
    mov eax, offset reload_segments
    push eax
    retf

reload_segments:
.code32
    mov ax, 0x10                # kernel data selector
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    mov ss, ax

    pop ebx                      # multiboot info pointer
    pop eax                      # multiboot magic
    push ebx
    push eax
    call kernel_main
    ud2

.section .boot.data, "aw"
.align 8
boot_gdt:
    .quad 0x0000000000000000     # null
    .quad 0x00CF9A000000FFFF     # 0x08: kernel code, base 0 limit 4G, 32-bit
    .quad 0x00CF92000000FFFF     # 0x10: kernel data, base 0 limit 4G, 32-bit
boot_gdt_descriptor:
    .word boot_gdt_descriptor - boot_gdt - 1
    .long boot_gdt

.section .bss, "aw"
.align 16
boot_stack_bottom:
    .skip {stack_size}
boot_stack_top:
"#,
    stack_size = const BOOT_STACK_SIZE,
);
