//! The sleep queue: tasks waiting for a tick deadline. Ordered by wake
//! tick; FIFO among equal deadlines so `sleep(n)` calls that land on the
//! same tick wake in call order.

use crate::process::Pid;
use alloc::vec::Vec;
use spin::Mutex;

struct Entry {
    wake_tick: u64,
    pid: Pid,
    seq: u64,
}

pub struct SleepQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl SleepQueue {
    const fn new() -> SleepQueue {
        SleepQueue { entries: Vec::new(), next_seq: 0 }
    }

    pub fn insert(&mut self, pid: Pid, wake_tick: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let pos = self
            .entries
            .iter()
            .position(|e| (e.wake_tick, e.seq) > (wake_tick, seq))
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry { wake_tick, pid, seq });
    }

    /// Pop every task whose wake tick has arrived, in wake order.
    pub fn drain_due(&mut self, now: u64) -> Vec<Pid> {
        let split = self.entries.partition_point(|e| e.wake_tick <= now);
        self.entries.drain(..split).map(|e| e.pid).collect()
    }

    pub fn remove(&mut self, pid: Pid) {
        self.entries.retain(|e| e.pid != pid);
    }
}

pub static SLEEP_QUEUE: Mutex<SleepQueue> = Mutex::new(SleepQueue::new());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakes_in_tick_then_fifo_order() {
        let mut q = SleepQueue::new();
        q.insert(Pid(3), 10);
        q.insert(Pid(1), 5);
        q.insert(Pid(2), 5);

        let due = q.drain_due(7);
        assert_eq!(due, alloc::vec![Pid(1), Pid(2)]);
        assert_eq!(q.drain_due(10), alloc::vec![Pid(3)]);
    }

    #[test]
    fn monotonicity_after_partial_drain() {
        let mut q = SleepQueue::new();
        q.insert(Pid(1), 4);
        q.insert(Pid(2), 9);
        let _ = q.drain_due(4);
        // Everything left must wake strictly after the tick we just drained.
        assert!(q.entries.iter().all(|e| e.wake_tick > 4));
    }
}
