use crate::println;

const LOGO: &str = r#"
            .
           / \
          /   \
    .----' .+. '----.
    |  _.-' | '-._  |
    '-'  ___+___  '-'
      .-'  (*)  '-.
   .-' .---/ \---. '-.
  /  .-'   | |   '-. \
 | .'   .--+-+--.   '.|
 |/  .-'   | |   '-. \|
  '-'  '---+-+---'  '-'
       '---/ \---'
          \ /
           '
"#;

pub fn run(_args: &str) {
    println!("        Coal OS i686");
    println!("  ========================");
    println!("{}", LOGO);
    println!("  OS:       Coal OS 0.1.0");
    println!("  Arch:     i686");
    println!("  Kernel:   Rust (no_std)");
    println!("  Scheduler: Priority preemptive, {} levels", crate::config::NUM_PRIORITIES);
    println!("  Memory:   Buddy heap + bitmap frames");
    println!("  Drivers:  PS/2 KB + Mouse");
    println!("  Display:  VGA Text 80x25");
}
