use crate::{print, println};

/// cat <path> — print a file's contents, read through the VFS.
pub fn run(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        println!("cat: missing filename");
        return;
    }

    let resolved = crate::shell::state::resolve_path(path);
    match crate::fs::read_whole_file(&resolved) {
        Ok(bytes) => match core::str::from_utf8(&bytes) {
            Ok(s) => print!("{}", s),
            Err(_) => println!("cat: {}: binary file (use catbin)", path),
        },
        Err(e) => println!("cat: {}: {}", path, e),
    }
}
