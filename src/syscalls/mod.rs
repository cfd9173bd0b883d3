//! The `int 0x80` syscall dispatcher: the numbered Linux-i386 subset this
//! kernel implements, against the register ABI `interrupts::usermode`'s
//! trap gate uses to reach it (`EAX` = number, `EBX,ECX,EDX` = args,
//! return value in `EAX`, negative is `-errno`).

use crate::config::MAX_OPEN_FILES;
use crate::errno::Errno;
use crate::fs::fd::{File, FileType};
use crate::fs::VFS;
use crate::interrupts::usermode::SyscallFrame;
use crate::process::{self, table::PROCESS_TABLE, Pid};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

pub const SYS_EXIT: u32 = 1;
pub const SYS_FORK: u32 = 2;
pub const SYS_READ: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_OPEN: u32 = 5;
pub const SYS_CLOSE: u32 = 6;
pub const SYS_PUTS: u32 = 7;
pub const SYS_EXECVE: u32 = 11;
pub const SYS_CHDIR: u32 = 12;
pub const SYS_WAITPID: u32 = 17;
pub const SYS_LSEEK: u32 = 19;
pub const SYS_GETPID: u32 = 20;
pub const SYS_READ_TERMINAL_LINE: u32 = 21;
pub const SYS_DUP2: u32 = 33;
pub const SYS_KILL: u32 = 37;
pub const SYS_PIPE: u32 = 42;
pub const SYS_SIGNAL: u32 = 48;
pub const SYS_GETPPID: u32 = 64;
pub const SYS_GETCWD: u32 = 183;
/// Not part of the recognized core subset's canonical number list. Heap
/// growth's authoritative path is `AddressSpace::set_brk`, invoked directly
/// by the process/loader code that needs it; this entry stays a stub.
pub const SYS_BRK: u32 = 45;

const O_WRONLY: u32 = 0x1;
const O_RDWR: u32 = 0x2;
const O_CREAT: u32 = 0x40;

/// Central syscall dispatcher, called from the naked-asm trampoline in
/// `interrupts::usermode::syscall_handler_asm`. `frame` is the live
/// register snapshot the trap left on the kernel stack — only `fork`
/// needs it, to give the child a return path back into user code.
pub extern "C" fn dispatch(number: u32, arg1: u32, arg2: u32, arg3: u32, frame: *const SyscallFrame) -> i32 {
    match number {
        SYS_EXIT => process::exit_current(arg1 as i32),
        SYS_FORK => sys_fork(frame),
        SYS_READ => sys_read(arg1 as usize, arg2 as *mut u8, arg3 as usize),
        SYS_WRITE => sys_write(arg1 as usize, arg2 as *const u8, arg3 as usize),
        SYS_OPEN => sys_open(arg1 as *const u8, arg2 as usize, arg3),
        SYS_CLOSE => sys_close(arg1 as usize),
        SYS_PUTS => sys_puts(arg1 as *const u8, arg2 as usize),
        SYS_EXECVE => sys_execve(arg1 as *const u8, arg2 as usize),
        SYS_CHDIR => sys_chdir(arg1 as *const u8, arg2 as usize),
        SYS_WAITPID => sys_waitpid(arg1 as i32),
        SYS_LSEEK => sys_lseek(arg1 as usize, arg2 as i32, arg3),
        SYS_GETPID => process::table::current_pid().0 as i32,
        SYS_READ_TERMINAL_LINE => sys_read_terminal_line(arg1 as *mut u8, arg2 as usize),
        SYS_DUP2 => sys_dup2(arg1 as usize, arg2 as usize),
        SYS_KILL => sys_kill(arg1),
        SYS_PIPE => sys_pipe(arg1 as *mut [u32; 2]),
        SYS_SIGNAL => Errno::NoSys.as_retval(),
        SYS_GETPPID => sys_getppid(),
        SYS_GETCWD => sys_getcwd(arg1 as *mut u8, arg2 as usize),
        SYS_BRK => Errno::NoSys.as_retval(),
        _ => {
            crate::log_warn!("syscall: unknown number {}", number);
            Errno::NoSys.as_retval()
        }
    }
}

/// Copy a user-supplied byte string into a kernel `String`, rejecting
/// pointers that don't fall inside a VMA of the calling process.
fn copy_user_str(ptr: *const u8, len: usize) -> Result<String, Errno> {
    if ptr.is_null() || len == 0 || len > 4096 {
        return Err(Errno::Inval);
    }
    let mapped = process::with_current_address_space_mut(|a| a.find_vma(ptr as u32).is_some()).unwrap_or(false);
    if !mapped {
        return Err(Errno::Fault);
    }
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
    core::str::from_utf8(slice).map(String::from).map_err(|_| Errno::Inval)
}

/// Resolve a (possibly relative) path against the calling process's own
/// `cwd`, not the shell's — each process tracks its own working directory.
fn resolve_against_cwd(path: &str) -> String {
    if path.starts_with('/') {
        return String::from(path);
    }
    let pid = process::table::current_pid();
    let cwd = PROCESS_TABLE.lock().get(pid).map(|p| p.cwd.clone()).unwrap_or_else(|| String::from("/"));
    if cwd == "/" {
        alloc::format!("/{}", path)
    } else {
        alloc::format!("{}/{}", cwd, path)
    }
}

fn current_file(fd: usize) -> Result<Arc<Mutex<File>>, Errno> {
    if fd >= MAX_OPEN_FILES {
        return Err(Errno::Inval);
    }
    let pid = process::table::current_pid();
    let table = PROCESS_TABLE.lock();
    let proc = table.get(pid).ok_or(Errno::Srch)?;
    proc.fd_table.get(fd).cloned().flatten().ok_or(Errno::Inval)
}

fn sys_fork(frame: *const SyscallFrame) -> i32 {
    if frame.is_null() {
        return Errno::Fault.as_retval();
    }
    let parent = process::table::current_pid();
    match process::fork(parent, unsafe { &*frame }) {
        Ok(child) => child.0 as i32,
        Err(e) => e.as_retval(),
    }
}

fn sys_read(fd: usize, ptr: *mut u8, len: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    if ptr.is_null() || len > 1 << 20 {
        return Errno::Inval.as_retval();
    }
    let file_arc = match current_file(fd) {
        Ok(f) => f,
        Err(e) => return e.as_retval(),
    };
    let slice = unsafe { core::slice::from_raw_parts_mut(ptr, len) };

    loop {
        let mut file = file_arc.lock();
        if !file.readable {
            return Errno::Perm.as_retval();
        }
        match &mut file.file_type {
            FileType::Console => {
                use crate::drivers::keyboard::scancodes::KeyCode;
                drop(file);
                return match crate::drivers::keyboard::read_char() {
                    KeyCode::Enter => {
                        slice[0] = b'\n';
                        1
                    }
                    KeyCode::Char(c) => {
                        slice[0] = c as u8;
                        1
                    }
                    KeyCode::Space => {
                        slice[0] = b' ';
                        1
                    }
                    _ => 0,
                };
            }
            FileType::Regular => {
                let path = file.path.clone();
                let offset = file.offset as usize;
                return match VFS.lock().read_file(&path, offset, slice) {
                    Ok(n) => {
                        file.offset += n as u64;
                        n as i32
                    }
                    Err(e) => Errno::from(e).as_retval(),
                };
            }
            FileType::PipeRead(inner) => {
                let mut pipe = inner.lock();
                if !pipe.is_empty() {
                    return pipe.read(slice) as i32;
                }
                if pipe.active_writers() == 0 {
                    return 0; // EOF
                }
                drop(pipe);
                drop(file);
                crate::scheduler::yield_now();
                continue;
            }
            FileType::Directory | FileType::PipeWrite(_) => return Errno::Inval.as_retval(),
        }
    }
}

fn sys_write(fd: usize, ptr: *const u8, len: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    if ptr.is_null() || len > 1 << 20 {
        return Errno::Inval.as_retval();
    }
    let file_arc = match current_file(fd) {
        Ok(f) => f,
        Err(e) => return e.as_retval(),
    };
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };

    loop {
        let mut file = file_arc.lock();
        if !file.writable {
            return Errno::Perm.as_retval();
        }
        match &mut file.file_type {
            FileType::Console => {
                return match core::str::from_utf8(slice) {
                    Ok(s) => {
                        print_no_newline(s);
                        len as i32
                    }
                    Err(_) => Errno::Inval.as_retval(),
                };
            }
            FileType::Regular => {
                let path = file.path.clone();
                let offset = file.offset as usize;
                return match VFS.lock().write_file_at(&path, offset, slice) {
                    Ok(n) => {
                        file.offset += n as u64;
                        n as i32
                    }
                    Err(e) => Errno::from(e).as_retval(),
                };
            }
            FileType::PipeWrite(inner) => {
                let mut pipe = inner.lock();
                if !pipe.is_full() {
                    return pipe.write(slice) as i32;
                }
                if pipe.active_readers() == 0 {
                    return Errno::Io.as_retval(); // broken pipe
                }
                drop(pipe);
                drop(file);
                crate::scheduler::yield_now();
                continue;
            }
            FileType::Directory | FileType::PipeRead(_) => return Errno::Inval.as_retval(),
        }
    }
}

fn sys_open(path_ptr: *const u8, path_len: usize, flags: u32) -> i32 {
    let path = match copy_user_str(path_ptr, path_len) {
        Ok(p) => p,
        Err(e) => return e.as_retval(),
    };
    let resolved = resolve_against_cwd(&path);

    {
        let mut vfs = VFS.lock();
        if !vfs.exists(&resolved) {
            if flags & O_CREAT == 0 {
                return Errno::NoEnt.as_retval();
            }
            if let Err(e) = vfs.create(&resolved) {
                return Errno::from(e).as_retval();
            }
        }
    }

    let writable = flags & (O_WRONLY | O_RDWR) != 0;
    let readable = flags & O_WRONLY == 0;
    let file = Arc::new(Mutex::new(File { file_type: FileType::Regular, path: resolved, offset: 0, readable, writable }));

    let pid = process::table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    let proc = match table.get_mut(pid) {
        Some(p) => p,
        None => return Errno::Srch.as_retval(),
    };
    match proc.fd_table.iter().position(Option::is_none) {
        Some(slot) => {
            proc.fd_table[slot] = Some(file);
            slot as i32
        }
        None => Errno::NoSpc.as_retval(),
    }
}

fn sys_close(fd: usize) -> i32 {
    if fd >= MAX_OPEN_FILES {
        return Errno::Inval.as_retval();
    }
    let pid = process::table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    match table.get_mut(pid) {
        Some(p) => {
            p.fd_table[fd] = None;
            0
        }
        None => Errno::Srch.as_retval(),
    }
}

fn sys_puts(ptr: *const u8, len: usize) -> i32 {
    match copy_user_str(ptr, len) {
        Ok(s) => {
            crate::print!("{}", s);
            len as i32
        }
        Err(e) => e.as_retval(),
    }
}

fn sys_execve(path_ptr: *const u8, path_len: usize) -> i32 {
    let path = match copy_user_str(path_ptr, path_len) {
        Ok(p) => p,
        Err(e) => return e.as_retval(),
    };
    match process::exec_current(&path, &[path.as_str()], &[]) {
        Ok(()) => unreachable!("exec_current never returns on success"),
        Err(e) => e.as_retval(),
    }
}

fn sys_chdir(path_ptr: *const u8, path_len: usize) -> i32 {
    let path = match copy_user_str(path_ptr, path_len) {
        Ok(p) => p,
        Err(e) => return e.as_retval(),
    };
    let resolved = resolve_against_cwd(&path);
    if !VFS.lock().is_dir(&resolved) {
        return Errno::NotDir.as_retval();
    }
    let pid = process::table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    match table.get_mut(pid) {
        Some(p) => {
            p.cwd = resolved;
            0
        }
        None => Errno::Srch.as_retval(),
    }
}

/// Simplified against real `waitpid()`: returns the reaped child's exit
/// code directly in `eax` rather than Linux's packed wait-status plus a
/// separately-returned pid, since this ABI only carries one return value.
fn sys_waitpid(target: i32) -> i32 {
    let target_pid = if target <= 0 { None } else { Some(Pid(target as u32)) };
    match process::wait(target_pid) {
        Ok((_child, code)) => code,
        Err(e) => e.as_retval(),
    }
}

fn sys_lseek(fd: usize, offset: i32, whence: u32) -> i32 {
    let file_arc = match current_file(fd) {
        Ok(f) => f,
        Err(e) => return e.as_retval(),
    };
    let mut file = file_arc.lock();
    let size = VFS.lock().lookup(&file.path).map(|i| i.size as i64).unwrap_or(0);

    let base = match whence {
        0 => 0i64,
        1 => file.offset as i64,
        2 => size,
        _ => return Errno::Inval.as_retval(),
    };
    let new_offset = base + offset as i64;
    if new_offset < 0 {
        return Errno::Inval.as_retval();
    }
    file.offset = new_offset as u64;
    new_offset as i32
}

fn sys_read_terminal_line(buf_ptr: *mut u8, buf_len: usize) -> i32 {
    if buf_ptr.is_null() || buf_len == 0 {
        return Errno::Inval.as_retval();
    }
    let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr, buf_len) };
    let mut n = 0usize;
    loop {
        use crate::drivers::keyboard::scancodes::KeyCode;
        match crate::drivers::keyboard::read_char() {
            KeyCode::Enter => {
                if n < buf_len {
                    buf[n] = b'\n';
                    n += 1;
                }
                break;
            }
            KeyCode::Char(c) => {
                if n < buf_len {
                    buf[n] = c as u8;
                    n += 1;
                }
            }
            KeyCode::Space => {
                if n < buf_len {
                    buf[n] = b' ';
                    n += 1;
                }
            }
            KeyCode::Backspace => {
                if n > 0 {
                    n -= 1;
                }
            }
            _ => {}
        }
        if n >= buf_len {
            break;
        }
    }
    n as i32
}

fn sys_dup2(old_fd: usize, new_fd: usize) -> i32 {
    if old_fd >= MAX_OPEN_FILES || new_fd >= MAX_OPEN_FILES {
        return Errno::Inval.as_retval();
    }
    if old_fd == new_fd {
        return new_fd as i32;
    }
    let pid = process::table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    let proc = match table.get_mut(pid) {
        Some(p) => p,
        None => return Errno::Srch.as_retval(),
    };
    match proc.fd_table[old_fd].clone() {
        Some(f) => {
            proc.fd_table[new_fd] = Some(f);
            new_fd as i32
        }
        None => Errno::Inval.as_retval(),
    }
}

fn sys_kill(pid: u32) -> i32 {
    match process::kill(Pid(pid)) {
        Ok(()) => 0,
        Err(e) => e.as_retval(),
    }
}

fn sys_pipe(fds_ptr: *mut [u32; 2]) -> i32 {
    if fds_ptr.is_null() {
        return Errno::Fault.as_retval();
    }
    let pid = process::table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    let proc = match table.get_mut(pid) {
        Some(p) => p,
        None => return Errno::Srch.as_retval(),
    };

    let free: Vec<usize> = proc.fd_table.iter().enumerate().filter(|(_, f)| f.is_none()).map(|(i, _)| i).take(2).collect();
    if free.len() < 2 {
        return Errno::NoSpc.as_retval();
    }
    let (fd_read, fd_write) = (free[0], free[1]);

    let inner = crate::fs::pipe::PipeInner::new();
    inner.lock().add_reader();
    inner.lock().add_writer();

    proc.fd_table[fd_read] = Some(Arc::new(Mutex::new(File {
        file_type: FileType::PipeRead(inner.clone()),
        path: String::from("pipe"),
        offset: 0,
        readable: true,
        writable: false,
    })));
    proc.fd_table[fd_write] = Some(Arc::new(Mutex::new(File {
        file_type: FileType::PipeWrite(inner),
        path: String::from("pipe"),
        offset: 0,
        readable: false,
        writable: true,
    })));

    unsafe {
        (*fds_ptr)[0] = fd_read as u32;
        (*fds_ptr)[1] = fd_write as u32;
    }
    0
}

fn sys_getppid() -> i32 {
    let pid = process::table::current_pid();
    PROCESS_TABLE.lock().get(pid).and_then(|p| p.parent).map(|p| p.0 as i32).unwrap_or(0)
}

fn sys_getcwd(buf_ptr: *mut u8, buf_len: usize) -> i32 {
    if buf_ptr.is_null() {
        return Errno::Fault.as_retval();
    }
    let pid = process::table::current_pid();
    let cwd = PROCESS_TABLE.lock().get(pid).map(|p| p.cwd.clone()).unwrap_or_else(|| String::from("/"));
    if cwd.len() + 1 > buf_len {
        return Errno::Overflow.as_retval();
    }
    let bytes = cwd.as_bytes();
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), buf_ptr, bytes.len());
        *buf_ptr.add(bytes.len()) = 0;
    }
    bytes.len() as i32
}

/// Print without a trailing newline, to both VGA and serial — the same
/// dual-sink convention `log_info!`/`println!` use elsewhere.
fn print_no_newline(s: &str) {
    use core::fmt::Write;
    let _ = crate::vga::WRITER.lock().write_str(s);
    let _ = crate::serial::SERIAL1.lock().write_str(s);
}

pub fn init() {
    crate::log_info!("Syscall interface initialized ({} syscalls mapped).", 19);
}
