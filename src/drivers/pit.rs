//! 8254 Programmable Interval Timer: programs channel 0 to fire IRQ 0 at
//! `config::TIMER_HZ`, which `interrupts::idt::timer_interrupt_handler`
//! turns into `scheduler::tick()` calls.

use crate::arch::port::Port;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_CMD: u16 = 0x43;
const PIT_FREQUENCY: u32 = 1_193_182;

/// Program channel 0, mode 3 (square wave), lobyte/hibyte access.
pub fn init() {
    let divisor = PIT_FREQUENCY / crate::config::TIMER_HZ;

    let mut cmd: Port<u8> = Port::new(PIT_CMD);
    let mut chan0: Port<u8> = Port::new(PIT_CHANNEL0);
    unsafe {
        cmd.write(0x36);
        chan0.write((divisor & 0xff) as u8);
        chan0.write(((divisor >> 8) & 0xff) as u8);
    }
}
