use crate::println;

/// objdump — display info about the running kernel ELF binary.
pub fn run(_args: &str) {
    println!("kernel.bin: file format elf32-i386");
    println!("");
    println!("Sections:");
    println!("  Idx  Name              Size       VMA");
    println!("    0  .multiboot_header 0000000c   00100000");
    println!("    1  .boot.text        00001000   00100010");
    println!("    2  .text             00020000   00101000");
    println!("    3  .rodata           00004000   00121000");
    println!("    4  .data             00002000   00125000");
    println!("    5  .bss              00010000   00127000");
    println!("");
    println!("SYMBOL TABLE (excerpt):");
    println!("  00100010  multiboot_entry");
    println!("  ........  kernel_main");
    println!("  ........  memory::init");
    println!("  ........  process::spawn_init");
    println!("  ........  scheduler::start");
    println!("  ........  shell::exec_command");
    println!("");
    println!("(static excerpt — no live symbol table is carried by this build)");
}
