use crate::println;

/// uptime — wall-clock time since boot, derived from the scheduler's tick
/// counter and the PIT's configured frequency.
pub fn run(_args: &str) {
    let ticks = crate::scheduler::current_tick();
    let total_secs = ticks / crate::config::TIMER_HZ as u64;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    println!("up {:02}:{:02}:{:02} ({} ticks @ {} Hz)", hours, mins, secs, ticks, crate::config::TIMER_HZ);
}
