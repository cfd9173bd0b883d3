use crate::println;
use crate::process::Pid;

/// kill <pid> — force-terminate a process.
pub fn run(args: &str) {
    let pid_str = args.trim();
    if pid_str.is_empty() {
        println!("kill: usage: kill <pid>");
        return;
    }

    let raw: u32 = match pid_str.parse() {
        Ok(v) => v,
        Err(_) => {
            println!("kill: invalid pid: {}", pid_str);
            return;
        }
    };

    match crate::process::kill(Pid(raw)) {
        Ok(()) => println!("Terminated pid {}", raw),
        Err(e) => println!("kill: {}", e),
    }
}
