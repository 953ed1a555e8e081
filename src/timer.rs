//! PIT programming, grounded in the pack's `drivers/system/pic.rs::init_pit`
//! (the teacher's own stub `sched/timer.rs` carried no PIT code — see
//! `DESIGN.md`). Programs channel 0 for the 100 Hz tick that
//! [`crate::sleep::TIME_SLICE_MS`] assumes.

use x86_64::instructions::port::Port;

const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;
const TICK_HZ: u32 = 1000 / crate::sleep::TIME_SLICE_MS;

/// Programs PIT channel 0, mode 3 (square wave), for [`TICK_HZ`] interrupts
/// per second (§4.8, step 5).
pub fn init() {
    let divisor: u16 = (PIT_BASE_FREQUENCY_HZ / TICK_HZ) as u16;
    let mut command: Port<u8> = Port::new(0x43);
    let mut channel0: Port<u8> = Port::new(0x40);

    // SAFETY: ports 0x40/0x43 are the PIT's fixed I/O addresses; this runs
    // once during boot before interrupts are enabled.
    unsafe {
        command.write(0x36);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
    log::info!("timer: PIT programmed for {} Hz (divisor {})", TICK_HZ, divisor);
}
