//! Main dispatcher loop, §4.1, and the glue that's genuinely cross-cutting:
//! `kill`'s queue-agnostic unblock, and the `sighandler`/`sigreturn` pair.
//!
//! Grounded in the teacher's `sched/mod.rs` request loop shape (fetch one
//! event, act on it, pick `next()`, resume) generalized from "only timer
//! preemption" to the full interrupt/syscall surface named in §4.1/§6.

use crate::error::{SignalError, BLOCK_PENDING};
use crate::kernel::Kernel;
use crate::pcb::BlockKind;
use crate::signal::{self, SignalDelivery, SignalUnblock};
use crate::sleep::TIME_SLICE_MS;

/// What woke the dispatcher this iteration (§4.1: "a single request loop
/// fed by either a completed syscall or a hardware interrupt").
pub enum RequestKind {
    Syscall { slot: usize },
    TimerInterrupt,
    KeyboardInterrupt { scancode: u8 },
}

impl Kernel {
    /// Removes `slot` from whatever queue its `blocked_kind` says it's
    /// linked on and readies it with `result_code`. `BlockKind::Sleep` is
    /// deliberately not handled here — the delta list requires its own
    /// `remove` call, made by [`Kernel::sys_kill`] before this runs.
    fn force_unblock(&mut self, slot: usize, result_code: i32) {
        match self.pcbs[slot].blocked_kind {
            BlockKind::Sender { dest } => {
                if let Some(d) = self.find_slot(dest) {
                    let mut q = self.pcbs[d].blocked_sender;
                    q.remove(&mut self.pcbs, slot);
                    self.pcbs[d].blocked_sender = q;
                }
            }
            BlockKind::Receiver { from } => {
                if let Some(s) = self.find_slot(from) {
                    let mut q = self.pcbs[s].blocked_receiver;
                    q.remove(&mut self.pcbs, slot);
                    self.pcbs[s].blocked_receiver = q;
                }
            }
            BlockKind::ReceiveAny => {
                self.recv_any.remove(&mut self.pcbs, slot);
            }
            BlockKind::Waiter { target } => {
                if let Some(t) = self.find_slot(target) {
                    let mut q = self.pcbs[t].blocked_waiter;
                    q.remove(&mut self.pcbs, slot);
                    self.pcbs[t].blocked_waiter = q;
                }
            }
            BlockKind::Read => {
                self.keyboard.blocked_reader = None;
            }
            BlockKind::Sleep | BlockKind::None => {}
        }
        self.pcbs[slot].result_code = result_code;
        self.ready(slot);
    }

    /// `kill(pid, sig)`.
    pub fn sys_kill(&mut self, target_pid: crate::pcb::Pid, sig: i32) -> i32 {
        let sig = match signal::validate_kill_signal_number(sig) {
            Ok(s) => s,
            Err(e) => return e.to_code(),
        };
        let Some(target) = self.find_slot(target_pid) else {
            return SignalError::KillNoSuchTarget.to_code();
        };

        match signal::raise(&mut self.pcbs[target], sig) {
            SignalUnblock::HardKill => {
                self.cleanup(target);
                if target == self.current {
                    self.current = self.next();
                }
            }
            SignalUnblock::UnblockSleep => {
                let ticks_left = self.delta.remove(&mut self.pcbs, target);
                let code = (ticks_left * TIME_SLICE_MS as i64) as i32;
                self.force_unblock(target, code);
            }
            SignalUnblock::Unblock(code) => self.force_unblock(target, code),
            SignalUnblock::NotBlocked | SignalUnblock::Ignored => {}
        }
        0
    }

    /// `sighandler(sig, new, old)`. Pointer validation for `old` happens in
    /// the syscall layer; this installs `new` and writes the previous
    /// handler through `old_ptr` (0 = don't write).
    pub fn sys_sighandler(&mut self, caller: usize, sig: i32, new: usize, old_ptr: usize) -> i32 {
        let sig = match signal::validate_signal_number(sig) {
            Ok(s) => s,
            Err(e) => return e.to_code(),
        };
        let prev = self.pcbs[caller].signal_table[sig as usize];
        if old_ptr != 0 {
            // SAFETY: validated by the syscall layer.
            unsafe { (old_ptr as *mut usize).write(prev.unwrap_or(0)) };
        }
        self.pcbs[caller].signal_table[sig as usize] = if new == 0 { None } else { Some(new) };
        0
    }

    /// `sigreturn(old_sp)`.
    ///
    /// # Safety
    /// `old_sp` must be the stack pointer a trampoline dispatched via
    /// [`signal::handle_pending_signals`] was entered with.
    pub unsafe fn sys_sigreturn(&mut self, caller: usize, old_sp: usize) {
        unsafe { signal::sigreturn(&mut self.pcbs[caller], old_sp) };
    }

    /// One iteration of the main request loop (§4.1). `kind` identifies
    /// what woke the dispatcher; the caller (assembly entry points, not
    /// modeled here) is responsible for acknowledging the interrupt
    /// controller and for the actual context switch into `self.current`
    /// once this returns.
    pub fn dispatch(&mut self, kind: RequestKind) {
        match kind {
            RequestKind::Syscall { slot } => {
                // The syscall handler has already run and set `result_code`
                // (or parked the caller on a blocked queue, in which case
                // `slot` is no longer `current` material). Only a process
                // still runnable gets its pending signals considered before
                // resumption.
                if self.pcbs[slot].state == crate::pcb::ProcState::Blocked {
                    self.current = self.next();
                    return;
                }
                debug_assert_ne!(self.pcbs[slot].result_code, BLOCK_PENDING);
                self.consider_signals(slot);
                self.current = slot;
            }
            RequestKind::TimerInterrupt => {
                self.pcbs[self.current].cpu_time += TIME_SLICE_MS as u64;
                self.tick();
                let prev = self.current;
                self.current = self.next();
                if prev != crate::kernel::IDLE_SLOT && prev != self.current {
                    self.ready(prev);
                }
                self.consider_signals(self.current);
            }
            RequestKind::KeyboardInterrupt { scancode } => {
                self.keyboard_isr(scancode);
            }
        }
    }

    fn consider_signals(&mut self, slot: usize) {
        if slot == crate::kernel::IDLE_SLOT {
            return;
        }
        match signal::handle_pending_signals(&mut self.pcbs[slot]) {
            SignalDelivery::HardKill => {
                self.cleanup(slot);
                self.current = self.next();
            }
            SignalDelivery::Dispatched(_) | SignalDelivery::None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::pcb::ProcState;

    fn spawn(k: &mut Kernel) -> usize {
        let slot = k.stopped.dequeue_head(&mut k.pcbs).expect("free slot");
        k.pcbs[slot].state = ProcState::Ready;
        k.user_proc_count += 1;
        slot
    }

    #[test]
    fn kill_with_bad_signal_number_is_rejected() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let pid = k.pcbs[a].pid;
        assert_eq!(k.sys_kill(pid, 32), SignalError::KillBadSignalNumber.to_code());
        assert_eq!(k.sys_kill(pid, -1), SignalError::KillBadSignalNumber.to_code());
    }

    #[test]
    fn kill_with_signal_31_hard_kills_the_target() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let pid = k.pcbs[a].pid;
        assert_eq!(k.sys_kill(pid, 31), 0);
        assert_eq!(k.pcbs[a].state, ProcState::Stopped);
    }

    #[test]
    fn kill_unknown_target_is_rejected() {
        let mut k = Kernel::new();
        assert_eq!(k.sys_kill(999, 5), SignalError::KillNoSuchTarget.to_code());
    }

    #[test]
    fn kill_unblocks_sleeping_process_with_remaining_time() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let pid = k.pcbs[a].pid;
        k.sys_sighandler(a, 5, 0x1000, 0);
        k.sys_sleep(a, 100);
        assert_eq!(k.pcbs[a].state, ProcState::Blocked);

        k.tick();
        assert_eq!(k.sys_kill(pid, 5), 0);
        assert_eq!(k.pcbs[a].state, ProcState::Ready);
        assert!(k.pcbs[a].result_code > 0);
    }

    #[test]
    fn sighandler_roundtrip_reports_previous_handler() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        assert_eq!(k.sys_sighandler(a, 3, 0x1000, 0), 0);
        let mut old = 0usize;
        k.sys_sighandler(a, 3, 0x2000, &mut old as *mut usize as usize);
        assert_eq!(old, 0x1000);
    }
}
