use crate::println;

/// spawn <path> — load an ELF binary as a new background process, leaving
/// the shell running. Use `ps` to see it and `yield` to give it a turn.
pub fn run(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        println!("Usage: spawn <path>");
        println!("  Example: spawn /disk/hello.elf");
        return;
    }

    match crate::process::spawn_from_elf(path, crate::config::DEFAULT_PRIORITY) {
        Ok(pid) => println!("Spawned '{}' as pid {}", path, pid.0),
        Err(e) => println!("spawn: failed: {}", e),
    }
}
