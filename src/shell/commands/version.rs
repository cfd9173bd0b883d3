use crate::println;

pub fn run(_args: &str) {
    println!("Coal OS v0.1.0 (i686)");
    println!("Kernel:  Rust no_std + alloc");
    println!("Boot:    Multiboot v1 / GRUB");
    println!("Build:   GNU Toolchain (nasm + ld)");
}
