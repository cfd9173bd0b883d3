pub mod gdt;
pub mod idt;
pub mod usermode;

pub fn init() {
    gdt::init();
    idt::init();
    usermode::install_gate();
    unsafe { idt::PICS.lock().initialize() };
}
