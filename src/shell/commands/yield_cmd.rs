use crate::println;

/// yield — voluntarily give up the rest of the current time slice.
pub fn run(_args: &str) {
    let count = crate::scheduler::ready_count();
    if count == 0 {
        println!("yield: no other tasks to switch to");
    } else {
        println!("yield: switching to next task...");
        crate::scheduler::yield_now();
    }
}
