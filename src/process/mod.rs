//! Process lifecycle: creation, `fork`, `execve`, `exit`, `wait`, and the
//! process-group/session bookkeeping the shell's job control needs.

pub mod process;
pub mod reaper;
pub mod table;

use crate::config::{DEFAULT_PRIORITY, USER_SPACE_START, USER_STACK_SIZE, USER_STACK_TOP};
use crate::errno::Errno;
use crate::memory::vma::{AddressSpace, FaultPolicy, Vma, VmaFlags};
use alloc::string::String;
pub use process::{BlockReason, Pid, ProcState, Process};
use spin::Mutex;
use table::PROCESS_TABLE;

pub const SEGFAULT_EXIT_CODE: i32 = 139; // 128 + SIGSEGV(11), matching shell conventions

/// The single console's controlling-terminal state: which session owns it
/// and which process group within that session is currently foreground.
/// There is exactly one TTY in this system, so this is global rather than
/// per-device.
struct CttyState {
    session: Option<Pid>,
    foreground_pgid: Option<Pid>,
}

static CTTY: Mutex<CttyState> = Mutex::new(CttyState { session: None, foreground_pgid: None });

/// Construct the first process (`init`) directly from a
/// kernel entry point rather than an ELF image — there is nothing to load
/// it from yet.
pub fn spawn_init(entry: extern "C" fn() -> !) -> Pid {
    let mut table = PROCESS_TABLE.lock();
    let pid = table.allocate_pid().expect("process table exhausted spawning init");
    let mut aspace = AddressSpace::new().expect("out of memory bringing up init's address space");
    add_default_user_vmas(&mut aspace).expect("init's default VMAs must not overlap");

    let mut proc = Process::new(pid, String::from("init"), aspace, DEFAULT_PRIORITY);
    proc.state = ProcState::Ready;
    proc.ctty = true; // init is the session leader that owns the one console
    proc.context = crate::scheduler::context::Context::new(entry as u32, proc.kernel_stack_top());
    table.insert(proc);
    drop(table);

    *CTTY.lock() = CttyState { session: Some(pid), foreground_pgid: Some(pid) };
    crate::scheduler::enqueue(pid, DEFAULT_PRIORITY);
    pid
}

fn add_default_user_vmas(aspace: &mut AddressSpace) -> Result<(), crate::memory::error::MmError> {
    aspace.add_vma(Vma {
        start: USER_STACK_TOP - USER_STACK_SIZE as u32,
        end: USER_STACK_TOP,
        flags: VmaFlags::READ | VmaFlags::WRITE | VmaFlags::USER,
        policy: FaultPolicy::ZeroFill,
    })?;
    aspace.set_brk(USER_SPACE_START)?;
    Ok(())
}

/// Load an ELF image from `path` as a brand-new child process of the
/// caller (the shell's `spawn` command's fork+exec-in-one convenience).
/// Returns the child's `Pid`; the child starts `Ready` on the scheduler's
/// runqueues and begins in ring 3 the next time it's switched to.
pub fn spawn_from_elf(path: &str, priority: u8) -> Result<Pid, Errno> {
    let mut table = PROCESS_TABLE.lock();
    let pid = table.allocate_pid().ok_or(Errno::NoMem)?;
    let parent_pid = table::current_pid();
    let (cwd, pgid, sid, ctty) = table
        .get(parent_pid)
        .map(|p| (p.cwd.clone(), p.pgid, p.sid, p.ctty))
        .unwrap_or_else(|| (String::from("/"), pid, pid, false));
    drop(table);

    let mut aspace = AddressSpace::new().map_err(Errno::from)?;
    let name = crate::loader::elf::filename_of(path);
    let argv = [name.as_str()];
    let loaded = crate::loader::elf::load_image(path, &mut aspace, &argv, &[]).map_err(Errno::from)?;

    let mut proc = Process::new(pid, name, aspace, priority);
    proc.state = ProcState::Ready;
    proc.parent = Some(parent_pid);
    proc.cwd = cwd;
    proc.pgid = pgid;
    proc.sid = sid;
    proc.ctty = ctty;
    proc.context = crate::scheduler::context::Context::new(crate::loader::elf::usermode_trampoline as u32, proc.kernel_stack_top());
    proc.context.ebx = loaded.entry;
    proc.context.esi = loaded.user_stack_top;

    let mut table = PROCESS_TABLE.lock();
    table.insert(proc);
    if let Some(parent) = table.get_mut(parent_pid) {
        parent.children.push(pid);
    }
    drop(table);

    crate::scheduler::enqueue(pid, priority);
    Ok(pid)
}

/// `execve()` as called directly from kernel context (the shell's `exec`
/// command runs in the caller's own kernel task, not via the `int 0x80`
/// ABI, so there's no trap frame to rewrite): builds the replacement
/// address space, rewires the current PID's saved context to the usermode
/// trampoline, and jumps there immediately. Never returns on success —
/// there is no caller to return to once the old image is gone.
pub fn exec_current(path: &str, argv: &[&str], envp: &[&str]) -> Result<(), Errno> {
    let pid = table::current_pid();
    let mut new_aspace = AddressSpace::new().map_err(Errno::from)?;
    let loaded = crate::loader::elf::load_image(path, &mut new_aspace, argv, envp).map_err(Errno::from)?;
    let name = crate::loader::elf::filename_of(path);
    execve_replace(pid, new_aspace, name, loaded.entry, loaded.user_stack_top)?;

    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(pid).ok_or(Errno::Srch)?;
    crate::interrupts::gdt::set_tss_esp0(proc.kernel_stack_top());
    proc.address_space.directory.activate();
    proc.state = ProcState::Running;
    let ctx_ptr: *const crate::scheduler::context::Context = &proc.context;
    drop(table);

    unsafe { crate::scheduler::context::restore_context(ctx_ptr) };
    unreachable!("exec_current's restore_context never returns");
}

/// `fork()`: eager-copy the calling process's address space into a new PID
/// (eager copy, not copy-on-write). Returns the child's `Pid` to the
/// parent; `frame` is the live register snapshot `int 0x80` left on the
/// parent's kernel stack, copied onto the child's own stack so it resumes
/// straight into user code with a syscall return value of 0.
pub fn fork(parent_pid: Pid, frame: &crate::interrupts::usermode::SyscallFrame) -> Result<Pid, Errno> {
    let mut table = PROCESS_TABLE.lock();
    let child_pid = table.allocate_pid().ok_or(Errno::NoMem)?;

    let (child_aspace, name, cwd, uid, gid, pgid, sid, ctty, priority, fd_table) = {
        let parent = table.get(parent_pid).ok_or(Errno::Srch)?;
        let child_aspace = parent.address_space.fork_copy().map_err(Errno::from)?;
        (
            child_aspace,
            parent.name.clone(),
            parent.cwd.clone(),
            parent.uid,
            parent.gid,
            parent.pgid,
            parent.sid,
            parent.ctty,
            parent.static_priority,
            parent.fd_table.clone(),
        )
    };

    let mut child = Process::new(child_pid, name, child_aspace, priority);
    child.parent = Some(parent_pid);
    child.cwd = cwd;
    child.uid = uid;
    child.gid = gid;
    child.pgid = pgid;
    child.sid = sid;
    child.ctty = ctty;
    child.fd_table = fd_table;
    child.state = ProcState::Ready;
    child.context = crate::interrupts::usermode::build_fork_child_context(frame, &mut child.kernel_stack);

    table.insert(child);
    if let Some(parent) = table.get_mut(parent_pid) {
        parent.children.push(child_pid);
    }
    drop(table);

    crate::scheduler::enqueue(child_pid, priority);
    Ok(child_pid)
}

/// `execve()`: tear down the calling process's user mappings and file
/// descriptors marked close-on-exec, then install a freshly loaded image.
/// Rolled back entirely (process left untouched) if `loaded` construction
/// fails upstream — by the time this is called the new address space
/// already exists, so this step itself cannot fail.
pub fn execve_replace(pid: Pid, new_aspace: AddressSpace, name: String, entry: u32, user_stack_top: u32) -> Result<(), Errno> {
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(pid).ok_or(Errno::Srch)?;
    proc.address_space.destroy();
    proc.address_space = new_aspace;
    proc.name = name;
    proc.context = crate::scheduler::context::Context::new(
        crate::loader::elf::usermode_trampoline as u32,
        proc.kernel_stack_top(),
    );
    proc.context.ebx = entry;
    proc.context.esi = user_stack_top;
    Ok(())
}

/// `exit()`: close file descriptors, mark the process a zombie, notify a
/// waiting parent, then yield for the last time. Address space and kernel
/// stack teardown is left to the reaper.
pub fn exit_current(exit_code: i32) -> ! {
    let pid = table::current_pid();
    let mut table = PROCESS_TABLE.lock();

    if let Some(proc) = table.get_mut(pid) {
        for slot in proc.fd_table.iter_mut() {
            *slot = None;
        }
        proc.state = ProcState::Zombie;
        proc.exit_status = Some(exit_code);

        let parent = proc.parent;
        let children = core::mem::take(&mut proc.children);

        // Orphans are reparented to init; since nothing will explicitly
        // wait() for them, the reaper's idle sweep claims them once they
        // themselves exit.
        for child in children {
            if let Some(c) = table.get_mut(child) {
                c.parent = Some(table::init_pid());
                c.orphaned = true;
            }
        }

        if let Some(parent_pid) = parent {
            if let Some(parent_proc) = table.get_mut(parent_pid) {
                if parent_proc.block_reason == Some(BlockReason::WaitChild) {
                    parent_proc.state = ProcState::Ready;
                    parent_proc.block_reason = None;
                    crate::scheduler::enqueue(parent_pid, parent_proc.effective_priority);
                }
            }
        } else {
            // No parent at all (init itself, or a process table bug):
            // nobody can ever wait() for this one.
            proc.orphaned = true;
        }
    }
    drop(table);

    crate::scheduler::reschedule_after_exit();
}

/// `wait()`: reap a zombie child if one exists, else block until one does.
/// `target` of `None` waits for any child. Returns `(child_pid, exit_code)`.
pub fn wait(target: Option<Pid>) -> Result<(Pid, i32), Errno> {
    loop {
        let waiter = table::current_pid();
        let mut table = PROCESS_TABLE.lock();

        let zombie = {
            let proc = table.get(waiter).ok_or(Errno::Srch)?;
            if proc.children.is_empty() {
                return Err(Errno::Srch);
            }
            proc.children
                .iter()
                .copied()
                .find(|&c| target.map_or(true, |t| t == c) && table.get(c).map(|p| p.state == ProcState::Zombie).unwrap_or(false))
        };

        if let Some(child_pid) = zombie {
            let exit_code = reaper::reap_with_table(&mut table, child_pid).unwrap_or(0);
            if let Some(proc) = table.get_mut(waiter) {
                proc.children.retain(|&c| c != child_pid);
            }
            return Ok((child_pid, exit_code));
        }

        // Register as a waiter on every live child so their effective
        // priority inherits ours while we're blocked.
        let live_children: alloc::vec::Vec<Pid> =
            table.get(waiter).map(|p| p.children.clone()).unwrap_or_default();
        for child in &live_children {
            if let Some(c) = table.get_mut(*child) {
                if !c.waiters.contains(&waiter) {
                    c.waiters.push(waiter);
                }
            }
            table.recompute_effective_priority(*child, 0);
        }

        if let Some(proc) = table.get_mut(waiter) {
            proc.state = ProcState::Blocked;
            proc.block_reason = Some(BlockReason::WaitChild);
        }
        drop(table);

        crate::scheduler::block_current_and_reschedule();

        let mut table = PROCESS_TABLE.lock();
        for child in &live_children {
            if let Some(c) = table.get_mut(*child) {
                c.waiters.retain(|&w| w != waiter);
            }
            table.recompute_effective_priority(*child, 0);
        }
    }
}

/// Force-terminate `target` out of its normal lifecycle (the shell's
/// `kill` command; there is no signal-delivery path, so this acts like an
/// unconditional `SIGKILL`). Killing the calling task itself is just
/// `exit_current` under another name.
pub fn kill(target: Pid) -> Result<(), Errno> {
    if target == table::current_pid() {
        exit_current(SEGFAULT_EXIT_CODE);
    }

    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(target).ok_or(Errno::Srch)?;
    if matches!(proc.state, ProcState::Zombie | ProcState::Dead) {
        return Err(Errno::Srch);
    }

    for slot in proc.fd_table.iter_mut() {
        *slot = None;
    }
    proc.state = ProcState::Zombie;
    proc.exit_status = Some(SEGFAULT_EXIT_CODE);

    let parent = proc.parent;
    let children = core::mem::take(&mut proc.children);
    for child in children {
        if let Some(c) = table.get_mut(child) {
            c.parent = Some(table::init_pid());
            c.orphaned = true;
        }
    }

    if let Some(parent_pid) = parent {
        if let Some(parent_proc) = table.get_mut(parent_pid) {
            if parent_proc.block_reason == Some(BlockReason::WaitChild) {
                parent_proc.state = ProcState::Ready;
                parent_proc.block_reason = None;
                crate::scheduler::enqueue(parent_pid, parent_proc.effective_priority);
            }
        }
    } else {
        if let Some(proc) = table.get_mut(target) {
            proc.orphaned = true;
        }
    }
    drop(table);

    crate::scheduler::remove_from_runqueue(target);
    Ok(())
}

pub fn with_current_address_space_mut<R>(f: impl FnOnce(&mut AddressSpace) -> R) -> Option<R> {
    let pid = table::current_pid();
    let mut table = PROCESS_TABLE.lock();
    table.get_mut(pid).map(|p| f(&mut p.address_space))
}

/// Terminate the current process with the conventional segfault exit code.
/// A user-mode fault the VMA lookup can't resolve kills the offending
/// process; it never brings down the kernel.
pub fn terminate_current_with_fault() -> ! {
    exit_current(SEGFAULT_EXIT_CODE)
}

pub fn setsid(pid: Pid) -> Result<Pid, Errno> {
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(pid).ok_or(Errno::Srch)?;
    proc.sid = pid;
    proc.pgid = pid;
    // A new session starts with no controlling terminal, even if the
    // caller previously had one.
    proc.ctty = false;
    Ok(pid)
}

pub fn setpgid(pid: Pid, pgid: Pid) -> Result<(), Errno> {
    let mut table = PROCESS_TABLE.lock();
    let target_pgid = if pgid.0 == 0 { pid } else { pgid };
    let proc = table.get_mut(pid).ok_or(Errno::Srch)?;
    proc.pgid = target_pgid;
    Ok(())
}

/// Only a session leader that holds the controlling TTY may move the
/// foreground process group, and only to a group within its own session.
pub fn tcsetpgrp(pid: Pid, pgid: Pid) -> Result<(), Errno> {
    let table = PROCESS_TABLE.lock();
    let proc = table.get(pid).ok_or(Errno::Srch)?;
    if !proc.ctty {
        return Err(Errno::NotTy);
    }
    if proc.sid != pid {
        return Err(Errno::Perm);
    }
    let session = proc.sid;
    let target_exists = table.iter().any(|p| p.pgid == pgid && p.sid == session);
    if !target_exists {
        return Err(Errno::Srch);
    }
    drop(table);
    CTTY.lock().foreground_pgid = Some(pgid);
    Ok(())
}

pub fn tcgetpgrp(pid: Pid) -> Result<Pid, Errno> {
    let table = PROCESS_TABLE.lock();
    let proc = table.get(pid).ok_or(Errno::Srch)?;
    if !proc.ctty {
        return Err(Errno::NotTy);
    }
    drop(table);
    CTTY.lock().foreground_pgid.ok_or(Errno::NotTy)
}
