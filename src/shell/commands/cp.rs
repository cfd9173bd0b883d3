use crate::println;

/// cp <src> <dst> — copy a file through the VFS.
pub fn run(args: &str) {
    let parts: alloc::vec::Vec<&str> = args.trim().split_whitespace().collect();
    if parts.len() < 2 {
        println!("cp: usage: cp <source> <dest>");
        return;
    }

    let src = crate::shell::state::resolve_path(parts[0]);
    let dst = crate::shell::state::resolve_path(parts[1]);

    let content = match crate::fs::read_whole_file(&src) {
        Ok(c) => c,
        Err(e) => {
            println!("cp: '{}': {}", parts[0], e);
            return;
        }
    };

    let mut vfs = crate::fs::VFS.lock();
    if !vfs.exists(&dst) {
        if let Err(e) = vfs.create(&dst) {
            println!("cp: '{}': {}", parts[1], e);
            return;
        }
    }
    match vfs.write_file(&dst, &content) {
        Ok(_) => println!("Copied {} -> {}", parts[0], parts[1]),
        Err(e) => println!("cp: '{}': {}", parts[1], e),
    }
}
