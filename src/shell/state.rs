use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

/// Kernel log ring buffer: every command the shell has dispatched, for the
/// `log` command. Distinct from the VGA/serial log macros — this is a
/// shell-local history, not the kernel's own diagnostic stream.
pub struct KernelLog {
    pub entries: Vec<String>,
}

impl KernelLog {
    pub fn new() -> Self {
        KernelLog { entries: Vec::new() }
    }

    pub fn push(&mut self, msg: String) {
        if self.entries.len() >= 64 {
            self.entries.remove(0);
        }
        self.entries.push(msg);
    }
}

lazy_static! {
    pub static ref KLOG: Mutex<KernelLog> = Mutex::new(KernelLog::new());
    pub static ref CWD: Mutex<String> = Mutex::new(String::from("/"));
}

/// Resolve a path relative to the current working directory.
/// Handles absolute paths, relative paths, `.` and `..`.
pub fn resolve_path(input: &str) -> String {
    let cwd = CWD.lock().clone();
    let raw = if input.starts_with('/') {
        String::from(input)
    } else if cwd == "/" {
        format!("/{}", input)
    } else {
        format!("{}/{}", cwd, input)
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        String::from("/")
    } else {
        let mut result = String::new();
        for p in parts {
            result.push('/');
            result.push_str(p);
        }
        result
    }
}

/// Log a command execution to the shell's kernel log buffer.
pub fn log_cmd(msg: &str) {
    let ticks = crate::scheduler::current_tick();
    KLOG.lock().push(format!("[{}] {}", ticks, msg));
}
