use crate::println;

/// exec <path> — replace the shell's own image with an ELF binary loaded
/// from the VFS. On success this never returns — there is no shell prompt
/// left to print to.
pub fn run(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        println!("Usage: exec <path>");
        println!("  Example: exec /disk/hello.elf");
        return;
    }

    println!("[exec] loading {}...", path);
    if let Err(e) = crate::process::exec_current(path, &[path], &[]) {
        println!("[exec] failed: {}", e);
    }
}
