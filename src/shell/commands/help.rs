use crate::println;

pub fn run(_args: &str) {
    println!("Coal OS shell - available commands:");
    println!("");
    println!("  ls [dir]          List directory entries");
    println!("  cat <file>        Show file contents");
    println!("  catbin <addr>     Hex dump memory at address");
    println!("  cd [path]         Change working directory");
    println!("  cp <src> <dst>    Copy a file");
    println!("  mv <src> <dst>    Move/rename a file");
    println!("  mkdir <path>      Create a directory");
    println!("  rm <path>         Remove a file or empty directory");
    println!("  touch <path>      Create an empty file");
    println!("  write <path> <t>  Write text to a file");
    println!("");
    println!("  exec <path>       Replace the shell with an ELF binary");
    println!("  spawn <path>      Load an ELF binary as a background process");
    println!("  kill <pid>        Terminate a process");
    println!("  ps                List live processes");
    println!("  yield             Give up the rest of the current time slice");
    println!("");
    println!("  date              Show current date/time (RTC)");
    println!("  uptime            Show time since boot");
    println!("  version           Show kernel version");
    println!("  neofetch          Show system info with logo");
    println!("  objdump           Inspect kernel ELF info");
    println!("  log [n]           Show last n shell log entries");
    println!("  shellscript <..>  Run commands separated by ;");
    println!("  vfstest           Run VFS integration self-test");
    println!("  atatest           Run ATA PIO disk self-test");
    println!("  help              Show this help message");
}
