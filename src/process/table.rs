//! The global process table: a slab of `Process` records indexed by PID —
//! an arena of task records indexed by handle, `Pid` being that handle.

use crate::config::{INIT_PID, MAX_PROCESSES};
use crate::process::process::{Pid, Process};
use alloc::boxed::Box;
use core::sync::atomic::{AtomicU32, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

pub struct ProcessTable {
    slots: Box<[Option<Process>; MAX_PROCESSES]>,
    next_pid_cursor: usize,
}

impl ProcessTable {
    fn new() -> ProcessTable {
        ProcessTable { slots: Box::new(core::array::from_fn(|_| None)), next_pid_cursor: 0 }
    }

    fn index_of(pid: Pid) -> Option<usize> {
        if pid.0 == 0 {
            return None;
        }
        let idx = (pid.0 - 1) as usize;
        (idx < MAX_PROCESSES).then_some(idx)
    }

    /// Allocate the lowest-numbered free PID.
    pub fn allocate_pid(&mut self) -> Option<Pid> {
        for offset in 0..MAX_PROCESSES {
            let idx = (self.next_pid_cursor + offset) % MAX_PROCESSES;
            if self.slots[idx].is_none() {
                self.next_pid_cursor = (idx + 1) % MAX_PROCESSES;
                return Some(Pid((idx + 1) as u32));
            }
        }
        None
    }

    pub fn insert(&mut self, process: Process) {
        let idx = Self::index_of(process.pid).expect("inserting process with out-of-range pid");
        assert!(self.slots[idx].is_none(), "pid {} already has a live process", process.pid.0);
        self.slots[idx] = Some(process);
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        Self::index_of(pid).and_then(|idx| self.slots[idx].as_ref())
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        Self::index_of(pid).and_then(|idx| self.slots[idx].as_mut())
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        Self::index_of(pid).and_then(|idx| self.slots[idx].take())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    /// Effective priority is the minimum of a task's static priority and
    /// every waiter's effective priority, computed transitively.
    /// Recursion is bounded by `MAX_PROCESSES` since no task may wait
    /// on itself through a cycle without that cycle being a bug elsewhere.
    ///
    /// If the recomputed value differs from what `pid` carried before and
    /// it's currently sitting on a runqueue (state `Ready`), it migrates to
    /// the new priority level so a boosted holder is actually found first.
    pub fn recompute_effective_priority(&mut self, pid: Pid, depth: usize) -> u8 {
        if depth > MAX_PROCESSES {
            return self.get(pid).map(|p| p.static_priority).unwrap_or(u8::MAX);
        }
        let (static_priority, waiters, old_eff, ready, running) = match self.get(pid) {
            Some(p) => (
                p.static_priority,
                p.waiters.clone(),
                p.effective_priority,
                p.state == crate::process::ProcState::Ready,
                p.state == crate::process::ProcState::Running,
            ),
            None => return u8::MAX,
        };
        let mut eff = static_priority;
        for waiter in waiters {
            eff = eff.min(self.recompute_effective_priority(waiter, depth + 1));
        }
        if let Some(p) = self.get_mut(pid) {
            p.effective_priority = eff;
        }
        if ready && eff != old_eff {
            crate::scheduler::migrate_priority(pid, old_eff, eff);
        } else if running && eff != old_eff {
            // A running holder just dropped back to (or rose to) a
            // different effective priority — e.g. releasing an inherited
            // boost. If a higher-priority task is already queued, flag an
            // immediate reschedule rather than waiting out this slice.
            crate::scheduler::preempt_if_outranked(eff);
        }
        eff
    }
}

lazy_static! {
    pub static ref PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());
}

static CURRENT_PID: AtomicU32 = AtomicU32::new(0);

pub fn current_pid() -> Pid {
    Pid(CURRENT_PID.load(Ordering::Relaxed))
}

pub fn set_current_pid(pid: Pid) {
    CURRENT_PID.store(pid.0, Ordering::Relaxed);
}

pub fn init_pid() -> Pid {
    Pid(INIT_PID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vma::AddressSpace;
    use crate::process::ProcState;

    fn process(pid: u32, priority: u8) -> Process {
        let mut p = Process::new(Pid(pid), alloc::string::String::from("t"), AddressSpace::new_for_test(), priority);
        p.state = ProcState::Blocked;
        p
    }

    #[test]
    fn donation_raises_holders_effective_priority() {
        let mut table = ProcessTable::new();
        let mut holder = process(1, 10);
        holder.waiters.push(Pid(2));
        table.insert(holder);
        table.insert(process(2, 2));

        let eff = table.recompute_effective_priority(Pid(1), 0);
        assert_eq!(eff, 2, "holder should inherit its highest-priority waiter's priority");
        assert_eq!(table.get(Pid(1)).unwrap().effective_priority, 2);
    }

    #[test]
    fn effective_priority_is_min_of_static_and_all_waiters() {
        let mut table = ProcessTable::new();
        let mut holder = process(1, 10);
        holder.waiters.push(Pid(2));
        holder.waiters.push(Pid(3));
        table.insert(holder);
        table.insert(process(2, 7));
        table.insert(process(3, 2));

        let eff = table.recompute_effective_priority(Pid(1), 0);
        assert_eq!(eff, 2, "must take the minimum (highest-priority) across every waiter, not just one");
    }

    #[test]
    fn donation_is_transitive_through_a_chain() {
        // H waits on M, M waits on L: L should end up inheriting H's
        // priority through M, not just M's static priority.
        let mut table = ProcessTable::new();
        let mut low = process(1, 10);
        low.waiters.push(Pid(2));
        let mut mid = process(2, 5);
        mid.waiters.push(Pid(3));
        table.insert(low);
        table.insert(mid);
        table.insert(process(3, 1));

        let eff = table.recompute_effective_priority(Pid(1), 0);
        assert_eq!(eff, 1, "priority should donate transitively across the whole wait chain");
    }

    #[test]
    fn releasing_the_last_waiter_restores_static_priority() {
        let mut table = ProcessTable::new();
        let mut holder = process(1, 10);
        holder.waiters.push(Pid(2));
        table.insert(holder);
        table.insert(process(2, 1));

        assert_eq!(table.recompute_effective_priority(Pid(1), 0), 1);

        table.get_mut(Pid(1)).unwrap().waiters.clear();
        let eff = table.recompute_effective_priority(Pid(1), 0);
        assert_eq!(eff, 10, "with no waiters left, effective priority must fall back to the static one");
    }

    #[test]
    fn unrelated_task_priority_is_unaffected() {
        let mut table = ProcessTable::new();
        let mut holder = process(1, 10);
        holder.waiters.push(Pid(2));
        table.insert(holder);
        table.insert(process(2, 1));
        table.insert(process(3, 6));

        table.recompute_effective_priority(Pid(1), 0);
        assert_eq!(table.get(Pid(3)).unwrap().effective_priority, 6, "recomputing one task must not disturb another's priority");
    }
}
