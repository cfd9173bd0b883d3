use crate::println;

/// mv <src> <dst> — move/rename a file through the VFS (copy then unlink —
/// the VFS has no atomic rename).
pub fn run(args: &str) {
    let parts: alloc::vec::Vec<&str> = args.trim().split_whitespace().collect();
    if parts.len() < 2 {
        println!("mv: usage: mv <source> <dest>");
        return;
    }

    let src = crate::shell::state::resolve_path(parts[0]);
    let dst = crate::shell::state::resolve_path(parts[1]);

    let content = match crate::fs::read_whole_file(&src) {
        Ok(c) => c,
        Err(e) => {
            println!("mv: '{}': {}", parts[0], e);
            return;
        }
    };

    let mut vfs = crate::fs::VFS.lock();
    if !vfs.exists(&dst) {
        if let Err(e) = vfs.create(&dst) {
            println!("mv: '{}': {}", parts[1], e);
            return;
        }
    }
    if let Err(e) = vfs.write_file(&dst, &content) {
        println!("mv: '{}': {}", parts[1], e);
        return;
    }
    if let Err(e) = vfs.unlink(&src) {
        println!("mv: '{}': {}", parts[0], e);
        return;
    }
    println!("Moved {} -> {}", parts[0], parts[1]);
}
