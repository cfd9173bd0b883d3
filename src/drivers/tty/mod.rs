use crate::drivers::keyboard;
use crate::drivers::keyboard::scancodes::KeyCode;
use crate::{print, println};
use alloc::string::String;

pub fn init() {
    crate::log_info!("Virtual TTY System initialized.");
    print_prompt();
}

pub fn print_prompt() {
    print!("root@coal_os:~$ ");
}

/// Read scancodes forever, echoing to the VGA console and dispatching
/// complete lines to the shell. Runs as `init`'s own kernel-mode loop — the
/// one process that never gets ELF-loaded, since there is nothing to read
/// it from until a filesystem exists.
pub fn process_input_loop() -> ! {
    let mut line = String::new();
    loop {
        let key = keyboard::read_char();

        match key {
            KeyCode::Char(c) => {
                line.push(c);
                print!("{}", c);
            }
            KeyCode::Space => {
                line.push(' ');
                print!(" ");
            }
            KeyCode::Enter => {
                println!();
                crate::shell::exec_command(&line);
                line.clear();
                print_prompt();
            }
            KeyCode::Backspace => {
                if line.pop().is_some() {
                    crate::vga::WRITER.lock().backspace();
                }
            }
            KeyCode::ArrowUp => print!("[Up]"),
            KeyCode::ArrowDown => print!("[Down]"),
            KeyCode::ArrowLeft => print!("[Left]"),
            KeyCode::ArrowRight => print!("[Right]"),
            KeyCode::F(num) => print!("[F{}]", num),
            KeyCode::Unknown => {}
        }

        // Non-blocking mouse drain; clicks are logged, not acted on.
        if let Some(mouse_event) = crate::drivers::mouse::try_read_event() {
            if mouse_event.left_button {
                crate::log_info!("mouse left click at x={}, y={}", mouse_event.x_movement, mouse_event.y_movement);
            }
        }
    }
}
