#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

use limine::BaseRevision;
use nucleus::{interrupts, kernel, logging, timer};

/// Tells the Limine bootloader which boot protocol revision this kernel
/// expects. Must live in the `.requests` section for the bootloader to
/// find it before handing off control.
#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

/// Kernel entry point called by the Limine bootloader. Bring-up order
/// follows §4.8: serial first (it's the only output path), then the
/// `Kernel` singleton (whose stack pool is a static per-slot array, not a
/// heap), then the IDT/PIC, then the PIT, then `sti` into the halt loop —
/// from here on the dispatcher runs entirely off interrupts and syscalls
/// re-entering it.
#[no_mangle]
pub extern "C" fn _start() -> ! {
    logging::init_serial();
    logging::init_logger();
    log::info!("nucleus: booting");

    kernel::init_global();

    interrupts::init();
    timer::init();

    log::info!("nucleus: boot complete, enabling interrupts");
    unsafe {
        core::arch::asm!("sti");
    }

    loop {
        x86_64::instructions::hlt();
    }
}
