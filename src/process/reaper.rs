//! Zombie cleanup.
//!
//! `exit_current` only closes file descriptors and marks a task a zombie;
//! the address space, kernel stack, and PCB slot survive until reaped here,
//! per the "a zombie's memory is not yet reclaimed" invariant. Reaping
//! happens two ways: eagerly, the instant a parent's `wait()` collects a
//! zombie's status, and lazily, from idle context, for zombies whose
//! parent was reparented to init and will never call `wait()` for them.

use super::process::ProcState;
use super::table::ProcessTable;
use super::Pid;
use alloc::vec::Vec;
use spin::Mutex;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReaperStats {
    pub total_reaped: u64,
    pub last_reap_tick: u64,
    pub failure_count: u64,
}

static REAPER_STATS: Mutex<ReaperStats> = Mutex::new(ReaperStats { total_reaped: 0, last_reap_tick: 0, failure_count: 0 });

pub fn stats() -> ReaperStats {
    *REAPER_STATS.lock()
}

/// Reap `pid` using an already-locked table. Returns the exit status if
/// `pid` was in fact a zombie; bumps `failure_count` and returns `None`
/// otherwise (asked to reap something that wasn't one — a caller bug, not
/// a fatal condition, so this reports rather than panics).
pub fn reap_with_table(table: &mut ProcessTable, pid: Pid) -> Option<i32> {
    let proc = table.get_mut(pid)?;
    if proc.state != ProcState::Zombie {
        REAPER_STATS.lock().failure_count += 1;
        return None;
    }
    let exit_status = proc.exit_status;
    proc.address_space.destroy();
    table.remove(pid);

    let mut stats = REAPER_STATS.lock();
    stats.total_reaped += 1;
    stats.last_reap_tick = crate::scheduler::current_tick();
    exit_status
}

/// Same as `reap_with_table` but takes the process-table lock itself, for
/// callers that don't already hold it (the idle sweep).
pub fn reap(pid: Pid) -> Option<i32> {
    let mut table = super::table::PROCESS_TABLE.lock();
    reap_with_table(&mut table, pid)
}

/// Called once per idle-loop iteration: reap every orphaned zombie, since
/// no living parent will ever `wait()` for one. Single-CPU, so there's no
/// risk of racing a concurrent reap of the same PID.
pub fn sweep_orphans() {
    let mut table = super::table::PROCESS_TABLE.lock();
    let targets: Vec<Pid> = table
        .iter()
        .filter(|p| p.state == ProcState::Zombie && p.orphaned)
        .map(|p| p.pid)
        .collect();
    for pid in targets {
        reap_with_table(&mut table, pid);
    }
}
