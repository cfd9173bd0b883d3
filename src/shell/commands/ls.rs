use crate::println;

/// ls [dir] — list a directory's entries through the VFS. Defaults to cwd.
pub fn run(args: &str) {
    let target = args.trim();
    let path = if target.is_empty() {
        crate::shell::state::CWD.lock().clone()
    } else {
        crate::shell::state::resolve_path(target)
    };

    let vfs = crate::fs::VFS.lock();
    match vfs.readdir(&path) {
        Ok(entries) => {
            for entry in &entries {
                let suffix = if entry.inode.file_type == crate::fs::inode::FileType::Directory { "/" } else { "" };
                println!("  {}{}", entry.name, suffix);
            }
        }
        Err(e) => println!("ls: {}: {}", path, e),
    }
}
