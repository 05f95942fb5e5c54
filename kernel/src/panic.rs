//! Kernel panic handler

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    crate::arch::disable_interrupts();

    if let Some(location) = info.location() {
        log::error!(
            "KERNEL PANIC at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }

    log::error!("  {}", info.message());

    crate::arch::halt()
}
