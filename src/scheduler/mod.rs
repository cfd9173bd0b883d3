//! The preemptive priority scheduler.
//!
//! 16 priority levels (0 highest), one FIFO runqueue each. A task runs for
//! `TIME_SLICE_TICKS` before `tick()` forces a reschedule; `yield_now()`
//! gives up the remainder voluntarily. The idle task is pinned at the
//! lowest priority and never leaves its runqueue once started.
//!
//! The overall shape (disable
//! interrupts, take the lock, grab raw `Context` pointers, drop the lock,
//! call the naked-asm trampoline) is exactly `scheduler::yield_now`'s
//! structure used previously, just re-targeted at PID-indexed
//! process-table slots instead of a `VecDeque<Process>`.

pub mod context;
pub mod sleep;

use crate::arch::interrupts::without_interrupts;
use crate::config::{IDLE_PRIORITY, NUM_PRIORITIES, TIME_SLICE_TICKS};
use crate::process::table::{current_pid, set_current_pid, PROCESS_TABLE};
use crate::process::{BlockReason, Pid, ProcState};
use alloc::collections::VecDeque;
use context::Context;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::Mutex;

struct Runqueues {
    queues: [VecDeque<Pid>; NUM_PRIORITIES],
}

impl Runqueues {
    const fn new() -> Runqueues {
        Runqueues { queues: [const { VecDeque::new() }; NUM_PRIORITIES] }
    }

    fn push(&mut self, priority: u8, pid: Pid) {
        self.queues[priority as usize].push_back(pid);
    }

    /// Highest-priority non-empty queue first. A READY task sits on
    /// exactly one runqueue at a time.
    fn pop_next(&mut self) -> Option<Pid> {
        for q in self.queues.iter_mut() {
            if let Some(pid) = q.pop_front() {
                return Some(pid);
            }
        }
        None
    }

    fn remove(&mut self, pid: Pid) {
        for q in self.queues.iter_mut() {
            q.retain(|&p| p != pid);
        }
    }
}

static RUNQUEUES: Mutex<Runqueues> = Mutex::new(Runqueues::new());
static TICKS: AtomicU64 = AtomicU64::new(0);
static TICKS_LEFT: AtomicU32 = AtomicU32::new(TIME_SLICE_TICKS);
static IDLE_PID: AtomicU32 = AtomicU32::new(0);
/// Set whenever a task becomes READY (or a running holder's effective
/// priority drops) at a moment a higher-priority task might now be owed
/// the CPU. Consumed — and acted on — the next time `tick()` runs, so a
/// preempting wakeup never waits out the rest of the current slice.
static NEED_RESCHEDULE: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

pub fn enqueue(pid: Pid, priority: u8) {
    RUNQUEUES.lock().push(priority, pid);
}

/// Move an already-queued `Ready` task from its old priority level to its
/// new one. Called by `process::table::recompute_effective_priority` when
/// priority inheritance changes a waiting task's effective priority out
/// from under it — without this a boosted holder stays buried behind
/// lower-priority tasks on its original level until it happens to run.
pub fn migrate_priority(pid: Pid, old_priority: u8, new_priority: u8) {
    if old_priority == new_priority {
        return;
    }
    let mut rq = RUNQUEUES.lock();
    rq.remove(pid);
    rq.push(new_priority, pid);
}

/// Snapshot of every live task for the shell's `ps` command.
pub fn list_tasks() -> alloc::vec::Vec<(Pid, alloc::string::String, ProcState, u8)> {
    let table = PROCESS_TABLE.lock();
    table.iter().map(|p| (p.pid, p.name.clone(), p.state, p.effective_priority)).collect()
}

/// Number of tasks currently sitting on a runqueue, across all priority
/// levels. Used by the shell's `yield` command to report whether yielding
/// actually handed off to anyone.
pub fn ready_count() -> usize {
    RUNQUEUES.lock().queues.iter().map(|q| q.len()).sum()
}

/// Strike a task from both the runqueues and the sleep queue — used when a
/// task is force-killed out from under its normal block/wake lifecycle.
pub fn remove_from_runqueue(pid: Pid) {
    RUNQUEUES.lock().remove(pid);
    sleep::SLEEP_QUEUE.lock().remove(pid);
}

/// If any ready task now outranks `current_priority`, set the reschedule
/// flag so the next `tick()` forces a switch instead of waiting out the
/// rest of the current slice. Covers both a newly-woken higher-priority
/// task (`wake`) and a priority-inheritance holder dropping back to a
/// lower effective priority while a higher-priority waiter is already
/// queued (§4.7: the reschedule flag is set "whenever a higher-priority
/// task became READY"). Only touches `RUNQUEUES` and an atomic, never
/// `PROCESS_TABLE` — safe to call from `process::table::ProcessTable`
/// methods that the caller may already hold the process-table lock inside.
pub fn preempt_if_outranked(current_priority: u8) {
    let outranked = {
        let rq = RUNQUEUES.lock();
        rq.queues.iter().take(current_priority as usize).any(|q| !q.is_empty())
    };
    if outranked {
        NEED_RESCHEDULE.store(true, Ordering::Relaxed);
    }
}

pub fn current_tick() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Set up the idle task. Called once from `lib.rs` before any other
/// process exists; the boot stack becomes the idle task's kernel stack.
pub fn init() {
    let idle_pid = {
        let mut table = PROCESS_TABLE.lock();
        let pid = table.allocate_pid().expect("process table exhausted allocating idle task");
        let aspace = crate::memory::vma::AddressSpace::new().expect("out of memory bringing up idle task");
        let mut idle = crate::process::Process::new(pid, alloc::string::String::from("idle"), aspace, IDLE_PRIORITY);
        idle.state = ProcState::Running;
        table.insert(idle);
        pid
    };
    IDLE_PID.store(idle_pid.0, Ordering::Relaxed);
    set_current_pid(idle_pid);
}

fn idle_pid() -> Pid {
    Pid(IDLE_PID.load(Ordering::Relaxed))
}

/// Timer-interrupt entry point: advances the tick counter, wakes anyone
/// whose sleep deadline has arrived, and forces a reschedule once the
/// current task's slice is spent.
pub fn tick() {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    for pid in sleep::SLEEP_QUEUE.lock().drain_due(now) {
        wake(pid);
    }

    let slice_expired = TICKS_LEFT.fetch_sub(1, Ordering::Relaxed) <= 1;
    if slice_expired {
        TICKS_LEFT.store(TIME_SLICE_TICKS, Ordering::Relaxed);
    }
    // Either the slice ran out, or something (a wakeup, a priority-
    // inheritance release) flagged a higher-priority task as owed the CPU.
    if slice_expired || NEED_RESCHEDULE.swap(false, Ordering::Relaxed) {
        reschedule();
    }
}

/// Voluntary yield: give up the rest of the current slice right now.
pub fn yield_now() {
    TICKS_LEFT.store(TIME_SLICE_TICKS, Ordering::Relaxed);
    reschedule();
}

fn reschedule() {
    without_interrupts(|| {
        let current = current_pid();
        let next_pid = {
            let mut rq = RUNQUEUES.lock();
            match rq.pop_next() {
                Some(p) => p,
                None => return, // nothing else ready, keep running `current`
            }
        };
        if next_pid == current {
            return;
        }

        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(current) {
            if p.state == ProcState::Running {
                p.state = ProcState::Ready;
                RUNQUEUES.lock().push(p.effective_priority, current);
            }
        }
        if let Some(p) = table.get_mut(next_pid) {
            p.state = ProcState::Running;
            crate::interrupts::gdt::set_tss_esp0(p.kernel_stack_top());
            p.address_space.directory.activate();
        }
        set_current_pid(next_pid);

        let table_ptr = &mut *table as *mut crate::process::table::ProcessTable;
        drop(table);

        let old_ctx: *mut Context = unsafe { &mut (*table_ptr).get_mut(current).expect("current task vanished").context };
        let new_ctx: *const Context = unsafe { &(*table_ptr).get(next_pid).expect("next task vanished").context };

        unsafe { context::switch_context(old_ctx, new_ctx) };
    });
}

/// Block the current task (already marked `Blocked`/`Sleeping` and removed
/// from any runqueue by the caller) and switch away. Never returns to the
/// caller through the normal call stack — it returns here once this task
/// is rescheduled back in, at which point the blocking call's loop
/// re-checks its condition.
pub fn block_current_and_reschedule() {
    without_interrupts(|| {
        let current = current_pid();
        let next_pid = {
            let mut rq = RUNQUEUES.lock();
            rq.pop_next().unwrap_or_else(idle_pid)
        };

        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(next_pid) {
            p.state = ProcState::Running;
            crate::interrupts::gdt::set_tss_esp0(p.kernel_stack_top());
            p.address_space.directory.activate();
        }
        set_current_pid(next_pid);

        let table_ptr = &mut *table as *mut crate::process::table::ProcessTable;
        drop(table);

        let old_ctx: *mut Context = unsafe { &mut (*table_ptr).get_mut(current).expect("current task vanished").context };
        let new_ctx: *const Context = unsafe { &(*table_ptr).get(next_pid).expect("next task vanished").context };

        unsafe { context::switch_context(old_ctx, new_ctx) };
    });
}

/// Used from `exit()`: the current task is already a zombie and must never
/// run again, so there's no context to save into.
pub fn reschedule_after_exit() -> ! {
    without_interrupts(|| {
        let next_pid = {
            let mut rq = RUNQUEUES.lock();
            rq.pop_next().unwrap_or_else(idle_pid)
        };
        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(next_pid) {
            p.state = ProcState::Running;
            crate::interrupts::gdt::set_tss_esp0(p.kernel_stack_top());
            p.address_space.directory.activate();
        }
        set_current_pid(next_pid);

        let new_ctx: *const Context = &table.get(next_pid).expect("next task vanished").context;
        drop(table);

        unsafe { context::restore_context(new_ctx) };
    });
    unreachable!("reschedule_after_exit should never return");
}

/// Wake a sleeping or blocked task: move it back onto its runqueue.
pub fn wake(pid: Pid) {
    let mut table = PROCESS_TABLE.lock();
    if let Some(p) = table.get_mut(pid) {
        if p.state == ProcState::Sleeping || p.state == ProcState::Blocked {
            p.state = ProcState::Ready;
            p.block_reason = None;
            let priority = p.effective_priority;
            drop(table);
            RUNQUEUES.lock().push(priority, pid);
            let current_priority = PROCESS_TABLE.lock().get(current_pid()).map(|p| p.effective_priority).unwrap_or(u8::MAX);
            preempt_if_outranked(current_priority);
            return;
        }
    }
}

/// Put the current task to sleep until `current_tick() + ticks`.
pub fn sleep_current(ticks: u64) {
    let pid = current_pid();
    let wake_at = current_tick() + ticks;
    {
        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(pid) {
            p.state = ProcState::Sleeping;
        }
    }
    sleep::SLEEP_QUEUE.lock().insert(pid, wake_at);
    block_current_and_reschedule();
}

/// Block the current task with the given reason, expected to be woken
/// explicitly (e.g. `process::wait` on child exit) rather than by a timer.
pub fn block_current(reason: BlockReason) {
    let pid = current_pid();
    let mut table = PROCESS_TABLE.lock();
    if let Some(p) = table.get_mut(pid) {
        p.state = ProcState::Blocked;
        p.block_reason = Some(reason);
    }
}

/// Start multitasking: switch from the boot stack (now the idle task's
/// context) into whatever is ready. Never returns.
pub fn start() -> ! {
    reschedule();
    idle_loop()
}

fn idle_loop() -> ! {
    loop {
        crate::arch::interrupts::enable_and_hlt();
        crate::process::reaper::sweep_orphans();
        reschedule();
    }
}
