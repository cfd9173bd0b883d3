use crate::println;

/// ps — list every live process from the real process table.
pub fn run(_args: &str) {
    let tasks = crate::scheduler::list_tasks();
    println!("  PID  PRI  STATE      NAME");
    println!("  ---  ---  ---------  ----");
    for (pid, name, state, priority) in &tasks {
        println!("  {:>3}  {:>3}  {:9?}  {}", pid.0, priority, state, name);
    }
}
