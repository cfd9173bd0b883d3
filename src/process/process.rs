//! The process/task record ("PCB (process)", "TCB (task)").
//!
//! TCBs are bound 1:1 to PCBs in this design (no kernel threads beyond the
//! idle task), so rather than keep two tables in lockstep this merges both
//! into one `Process` record with a `Context` fused directly in.

use crate::config::{KERNEL_STACK_SIZE, MAX_OPEN_FILES};
use crate::fs::fd::File;
use crate::memory::vma::AddressSpace;
use crate::scheduler::context::Context;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    pub const NONE: Pid = Pid(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    New,
    Ready,
    Running,
    Blocked,
    Sleeping,
    Zombie,
    Dead,
}

/// Why a task is `Blocked`. `WaitChild`/`Pipe*` register this task as a
/// waiter on the blocking party's `waiters` list, which is what drives
/// priority inheritance ("priority inheritance soundness").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    WaitChild,
    TerminalRead,
    PipeFull,
    PipeEmpty,
}

pub struct Process {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub pgid: Pid,
    pub sid: Pid,
    pub children: Vec<Pid>,

    pub name: String,
    pub cwd: String,
    pub uid: u32,
    pub gid: u32,

    pub state: ProcState,
    pub exit_status: Option<i32>,

    pub address_space: AddressSpace,
    pub kernel_stack: Box<[u8]>,
    pub context: Context,

    pub fd_table: Vec<Option<Arc<Mutex<File>>>>,

    pub static_priority: u8,
    pub effective_priority: u8,
    pub wake_tick: Option<u64>,
    pub block_reason: Option<BlockReason>,
    /// Other PIDs currently blocked waiting on this task (e.g. parents in
    /// `wait()`), whose effective priority this task's own may need to
    /// inherit.
    pub waiters: Vec<Pid>,
    /// Set when this task was reparented to init after its real parent
    /// exited. A zombie with this set will never have its status collected
    /// by an explicit `wait()`, so the reaper's idle sweep claims it
    /// instead of leaving it to rot.
    pub orphaned: bool,
    /// Whether this task's session has the single console as its
    /// controlling terminal. Inherited across `fork`/`execve`, cleared by
    /// `setsid` (a new session starts with no controlling TTY).
    pub ctty: bool,
}

impl Process {
    pub fn new(pid: Pid, name: String, address_space: AddressSpace, priority: u8) -> Process {
        let kernel_stack = alloc::vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
        let mut fd_table = Vec::with_capacity(MAX_OPEN_FILES);
        fd_table.resize_with(MAX_OPEN_FILES, || None);
        fd_table[0] = Some(File::new_console());
        fd_table[1] = Some(File::new_console());
        fd_table[2] = Some(File::new_console());

        Process {
            pid,
            parent: None,
            pgid: pid,
            sid: pid,
            children: Vec::new(),
            name,
            cwd: String::from("/"),
            uid: 0,
            gid: 0,
            state: ProcState::New,
            exit_status: None,
            address_space,
            kernel_stack,
            context: Context::empty(),
            fd_table,
            static_priority: priority,
            effective_priority: priority,
            wake_tick: None,
            block_reason: None,
            waiters: Vec::new(),
            orphaned: false,
            ctty: false,
        }
    }

    pub fn kernel_stack_top(&self) -> u32 {
        (self.kernel_stack.as_ptr() as u32 + self.kernel_stack.len() as u32) & !0xf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vma::AddressSpace;

    #[test]
    fn new_process_starts_at_static_priority_with_no_waiters() {
        let p = Process::new(Pid(1), String::from("init"), AddressSpace::new_for_test(), 5);
        assert_eq!(p.state, ProcState::New);
        assert_eq!(p.static_priority, 5);
        assert_eq!(p.effective_priority, 5);
        assert!(p.waiters.is_empty());
        assert!(p.parent.is_none());
    }

    #[test]
    fn new_process_gets_stdin_stdout_stderr_wired_to_console() {
        let p = Process::new(Pid(1), String::from("init"), AddressSpace::new_for_test(), 0);
        assert!(p.fd_table[0].is_some());
        assert!(p.fd_table[1].is_some());
        assert!(p.fd_table[2].is_some());
        assert!(p.fd_table[3..].iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn kernel_stack_top_is_16_byte_aligned() {
        let p = Process::new(Pid(1), String::from("init"), AddressSpace::new_for_test(), 0);
        assert_eq!(p.kernel_stack_top() % 16, 0);
    }
}
