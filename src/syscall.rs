//! Syscall ABI boundary: the `int 0x80` entry trampoline, the raw
//! `(id, a1, a2, a3)` dispatcher, and user-pointer validation.
//!
//! The entry trampoline and register save/restore sequence are carried
//! over from the teacher's `sys/syscall.rs` `syscall_entry` almost
//! unchanged — same register order, same naked-asm shape. Only the
//! `SYS_*` numbering and the dispatcher's handler table are new: the
//! teacher's own `SYS_WRITE`/`SYS_IPC_*` set covered an earlier, partial
//! phase and is superseded here by the full surface this kernel exposes
//! (§6).

use crate::error::{
    BLOCK_PENDING, E_ADDR_IN_HOLE, E_ADDR_PAST_MAX, E_BAD_FROM_PTR, E_BAD_HANDLER_PTR,
    E_BAD_NUM_PTR, E_BAD_OLD_HANDLER_PTR,
};
use crate::kernel::KERNEL;

pub const SYS_CREATE: usize = 0;
pub const SYS_YIELD: usize = 1;
pub const SYS_STOP: usize = 2;
pub const SYS_GETPID: usize = 3;
pub const SYS_PUTS: usize = 4;
pub const SYS_KILL: usize = 5;
pub const SYS_SETPRIO: usize = 6;
pub const SYS_SEND: usize = 7;
pub const SYS_RECV: usize = 8;
pub const SYS_SLEEP: usize = 9;
pub const SYS_GETCPUTIMES: usize = 10;
pub const SYS_SIGHANDLER: usize = 11;
pub const SYS_SIGRETURN: usize = 12;
pub const SYS_WAIT: usize = 13;
pub const SYS_OPEN: usize = 14;
pub const SYS_CLOSE: usize = 15;
pub const SYS_WRITE: usize = 16;
pub const SYS_READ: usize = 17;
pub const SYS_IOCTL: usize = 18;

/// Start of the classic ISA memory hole (0xA0000..0x100000), never a valid
/// destination for a user buffer.
const HOLE_START: usize = 0xA0000;
const HOLE_END: usize = 0x100000;

/// Higher-half boundary: anything at or above this is kernel memory, per
/// the standard x86_64 canonical-address split this kernel follows even
/// though it runs everything at ring 0 (§1, Non-goals: no paging).
const KERNEL_BASE: usize = 0xFFFF_8000_0000_0000;

/// Rejects a null pointer (when `allow_null` is false), a range overlapping
/// the hardware hole, or a range reaching into kernel memory or past the
/// top of the address space.
fn validate_user_ptr(ptr: usize, len: usize, allow_null: bool) -> Result<(), i32> {
    if ptr == 0 {
        return if allow_null { Ok(()) } else { Err(E_ADDR_IN_HOLE) };
    }
    let end = match ptr.checked_add(len) {
        Some(e) => e,
        None => return Err(E_ADDR_PAST_MAX),
    };
    if end > KERNEL_BASE {
        return Err(E_ADDR_PAST_MAX);
    }
    if ptr < HOLE_END && end > HOLE_START {
        return Err(E_ADDR_IN_HOLE);
    }
    Ok(())
}

/// Syscall entry point (naked function), invoked by the `int 0x80` IDT
/// gate. Saves every register the System V ABI doesn't guarantee the
/// dispatcher preserves, decodes `(rax, rdi, rsi, rdx)` into the
/// dispatcher's argument registers, and restores them before `iretq`.
#[unsafe(naked)]
#[no_mangle]
pub extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "cld",
        "mov rdi, rax",
        "mov rsi, [rsp + 120]",
        "mov rdx, [rsp + 112]",
        "mov rcx, [rsp + 104]",
        "call {dispatcher}",
        "mov r15, rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "add rsp, 8",
        "mov rax, r15",
        "iretq",
        dispatcher = sym syscall_dispatcher_wrapper,
    )
}

#[no_mangle]
extern "C" fn syscall_dispatcher_wrapper(id: usize, a1: usize, a2: usize, a3: usize) -> isize {
    syscall_dispatcher(id, a1, a2, a3) as isize
}

/// Issues `int 0x80` directly, for kernel-resident code (the return-trap
/// landing pad, kernel self-tests run as tasks) that needs the same ABI a
/// real user task would use.
///
/// # Safety
/// Must only be called from a context where entering the kernel via the
/// syscall gate is valid (i.e. not already inside the dispatcher).
pub unsafe fn raw_syscall(id: usize, a1: usize, a2: usize, a3: usize) -> i32 {
    let ret: i64;
    unsafe {
        core::arch::asm!(
            "int 0x80",
            inout("rax") id => ret,
            in("rdi") a1,
            in("rsi") a2,
            in("rdx") a3,
        );
    }
    ret as i32
}

/// Decodes one `(id, a1, a2, a3)` tuple, validates user pointers, and
/// forwards to the matching typed `Kernel::sys_*` method. Runs with the
/// global kernel lock held for the duration of the call — sound because
/// interrupts are masked for the whole trip through `int 0x80`.
pub fn syscall_dispatcher(id: usize, a1: usize, a2: usize, a3: usize) -> i32 {
    let mut guard = KERNEL.lock();
    let kernel = guard.as_mut().expect("kernel not initialized");
    let caller = kernel.current;

    let result = match id {
        SYS_CREATE => kernel.sys_create(a1, a2),
        SYS_YIELD => {
            kernel.ready(caller);
            kernel.pcbs[caller].result_code = 0;
            kernel.current = kernel.next();
            return 0;
        }
        SYS_STOP => {
            kernel.sys_stop(caller);
            return 0;
        }
        SYS_GETPID => kernel.sys_getpid(caller),
        SYS_PUTS => match validate_user_ptr(a1, a2, false) {
            Ok(()) => kernel.sys_puts(caller, a1, a2),
            Err(code) => code,
        },
        SYS_KILL => kernel.sys_kill(a1 as crate::pcb::Pid, a2 as i32),
        SYS_SETPRIO => kernel.sys_setprio(caller, a1 as i32),
        SYS_SEND => kernel.sys_send(caller, a1 as crate::pcb::Pid, a2 as u32),
        SYS_RECV => {
            match validate_user_ptr(a2, 4, true) {
                Ok(()) => match validate_user_ptr(a3, core::mem::size_of::<crate::pcb::Pid>(), true) {
                    Ok(()) => kernel.sys_recv(caller, a1 as crate::pcb::Pid, a2, a3),
                    Err(_) => E_BAD_FROM_PTR,
                },
                Err(_) => E_BAD_NUM_PTR,
            }
        }
        SYS_SLEEP => kernel.sys_sleep(caller, a1 as u32),
        SYS_GETCPUTIMES => {
            let cap = a2;
            match validate_user_ptr(a1, cap * core::mem::size_of::<(crate::pcb::Pid, u64)>(), false) {
                Ok(()) => kernel.sys_getcputimes(a1, cap),
                Err(code) => code,
            }
        }
        SYS_SIGHANDLER => {
            match validate_user_ptr(a2, 1, true) {
                Ok(()) => match validate_user_ptr(a3, core::mem::size_of::<usize>(), true) {
                    Ok(()) => kernel.sys_sighandler(caller, a1 as i32, a2, a3),
                    Err(_) => E_BAD_OLD_HANDLER_PTR,
                },
                Err(_) => E_BAD_HANDLER_PTR,
            }
        }
        SYS_SIGRETURN => {
            // SAFETY: `a1` is the stack pointer a prior signal dispatch
            // spliced for this very process; the syscall ABI guarantees
            // the caller can only be the process that received the splice.
            unsafe { kernel.sys_sigreturn(caller, a1) };
            0
        }
        SYS_WAIT => kernel.sys_wait(caller, a1 as crate::pcb::Pid),
        SYS_OPEN => kernel.sys_open(caller, a1),
        SYS_CLOSE => kernel.sys_close(caller, a1),
        SYS_WRITE => match validate_user_ptr(a2, a3, false) {
            Ok(()) => kernel.sys_write(caller, a1, a2, a3),
            Err(code) => code,
        },
        SYS_READ => match validate_user_ptr(a2, a3, false) {
            Ok(()) => kernel.sys_read(caller, a1, a2, a3),
            Err(code) => code,
        },
        SYS_IOCTL => kernel.sys_ioctl(caller, a1, a2, a3),
        _ => {
            log::warn!("syscall: unknown id {}", id);
            -1
        }
    };

    if result == BLOCK_PENDING {
        kernel.dispatch(crate::dispatch::RequestKind::Syscall { slot: caller });
        0
    } else {
        kernel.pcbs[caller].result_code = result;
        kernel.dispatch(crate::dispatch::RequestKind::Syscall { slot: caller });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_rejected_unless_allowed() {
        assert_eq!(validate_user_ptr(0, 10, false), Err(E_ADDR_IN_HOLE));
        assert_eq!(validate_user_ptr(0, 10, true), Ok(()));
    }

    #[test]
    fn range_inside_hole_rejected() {
        assert_eq!(validate_user_ptr(0xA0010, 16, false), Err(E_ADDR_IN_HOLE));
        assert_eq!(validate_user_ptr(0x90000, 0x20000, false), Err(E_ADDR_IN_HOLE));
    }

    #[test]
    fn kernel_range_rejected() {
        assert_eq!(validate_user_ptr(KERNEL_BASE, 8, false), Err(E_ADDR_PAST_MAX));
    }

    #[test]
    fn ordinary_user_range_accepted() {
        assert_eq!(validate_user_ptr(0x400000, 256, false), Ok(()));
    }
}
