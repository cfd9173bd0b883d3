pub mod keyboard;
pub mod mouse;
pub mod pit;
pub mod tty;

pub fn init() {
    keyboard::init();
    mouse::init();
    pit::init();
    tty::init();
    crate::log_info!("Drivers subsystem initialized.");
}
