//! Panic handler. Logs at `error` level through the serial logger (the
//! only sink this kernel has) and halts — consistent with the
//! `panic = "abort"` profile in `Cargo.toml`, there is nowhere to unwind to.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("{}", info);
    loop {
        x86_64::instructions::hlt();
    }
}
