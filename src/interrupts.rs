//! IDT install and PIC wiring, grounded in the wider pack's
//! `arch/x86_64/idt.rs`/`drivers/system/pic.rs` pattern (the teacher's own
//! copy of these files was not present in the retrieval pack — see
//! `DESIGN.md`), rendered here over the `pic8259` crate instead of raw port
//! I/O for PIC remap/EOI.

use lazy_static_like::Lazy;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub const TIMER_VECTOR: u8 = PIC_1_OFFSET;
pub const KEYBOARD_VECTOR: u8 = PIC_1_OFFSET + 1;
pub const SYSCALL_VECTOR: u8 = 0x80;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(build_idt);

fn build_idt() -> InterruptDescriptorTable {
    let mut idt = InterruptDescriptorTable::new();
    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);
    unsafe {
        idt.double_fault.set_handler_fn(double_fault_handler);
    }

    // SAFETY: `crate::syscall::syscall_entry` is a valid naked interrupt
    // entry point with its own full register save/restore and `iretq`.
    unsafe {
        idt[SYSCALL_VECTOR as usize]
            .set_handler_addr(x86_64::VirtAddr::new(crate::syscall::syscall_entry as u64));
    }
    idt[TIMER_VECTOR as usize].set_handler_fn(timer_interrupt_handler);
    idt[KEYBOARD_VECTOR as usize].set_handler_fn(keyboard_interrupt_handler);
    idt
}

/// Installs the IDT and remaps the 8259 PICs off their BIOS default
/// (conflicting with CPU exception vectors) to [`PIC_1_OFFSET`]. Interrupts
/// remain masked until the caller executes `sti` (§4.8, step 6).
pub fn init() {
    IDT.load();
    // SAFETY: called once during boot, before `sti`.
    unsafe { PICS.lock().initialize() };
    log::info!("interrupts: IDT loaded, PICs remapped to {}..{}", PIC_1_OFFSET, PIC_2_OFFSET + 8);
}

extern "x86-interrupt" fn divide_error_handler(frame: InterruptStackFrame) {
    log::error!("divide error at {:#x}", frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn breakpoint_handler(frame: InterruptStackFrame) {
    log::warn!("breakpoint at {:#x}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn general_protection_fault_handler(frame: InterruptStackFrame, code: u64) {
    log::error!("general protection fault (code {:#x}) at {:#x}", code, frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn page_fault_handler(frame: InterruptStackFrame, code: x86_64::structures::idt::PageFaultErrorCode) {
    log::error!("page fault ({:?}) at {:#x}", code, frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, _code: u64) -> ! {
    log::error!("double fault at {:#x}", frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn timer_interrupt_handler(_frame: InterruptStackFrame) {
    crate::kernel::KERNEL
        .lock()
        .as_mut()
        .expect("kernel not initialized")
        .dispatch(crate::dispatch::RequestKind::TimerInterrupt);
    // SAFETY: this IRQ came through the PIC; acknowledging it is required
    // before further IRQs of equal or lower priority can be delivered.
    unsafe { PICS.lock().notify_end_of_interrupt(TIMER_VECTOR) };
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_frame: InterruptStackFrame) {
    use x86_64::instructions::port::Port;
    let scancode: u8 = unsafe { Port::new(0x60).read() };
    crate::kernel::KERNEL
        .lock()
        .as_mut()
        .expect("kernel not initialized")
        .dispatch(crate::dispatch::RequestKind::KeyboardInterrupt { scancode });
    unsafe { PICS.lock().notify_end_of_interrupt(KEYBOARD_VECTOR) };
}

/// Minimal `lazy_static`-equivalent built on `spin::Once`, used here so the
/// IDT (which must live at a fixed address for the whole kernel lifetime)
/// doesn't need an extra dependency purely for one-time static init.
mod lazy_static_like {
    use spin::Once;

    pub struct Lazy<T> {
        once: Once<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy { once: Once::new(), init }
        }
    }

    impl<T> core::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.once.call_once(self.init)
        }
    }
}
