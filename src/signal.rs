//! Signal subsystem: 32 priority levels, the interrupt-of-blocked-call
//! table, and the user-space trampoline splice.
//!
//! Grounded in the teacher's naked-`asm!` approach to the syscall ABI
//! (`sys/syscall.rs`): the trampoline splice is the same kind of boundary —
//! a place where the kernel must reproduce a specific machine-level frame
//! bit-for-bit so that control can transfer into user code without a
//! dedicated thread (Design Note 9).

use crate::error::SignalError;
use crate::pcb::{BlockKind, Pcb, ProcState};

/// Address of a user-space handler function. `None` in the table means
/// "ignore".
pub type SignalHandler = usize;

pub const NUM_SIGNALS: u32 = 32;
/// Signal 31 is the hard-kill signal; its handler is fixed to the
/// process-exit path and cannot be overridden (§4.5).
pub const SIGKILL: u32 = 31;

pub const TIME_SLICE_MS: i64 = 10;

/// Frame the trampoline expects on entry, spliced just above the
/// register-save area the (external) context-switch primitive already
/// maintains. `context` is the stack pointer the interrupted process had
/// before the splice; `syssigreturn` uses it to unwind back.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrampolineFrame {
    pub handler: usize,
    pub context: usize,
    pub saved_last_signal_delivered: i64,
    pub saved_result_code: i64,
}

/// Outcome of scanning a PCB's pending signals before resuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// Nothing pending (or nothing above `last_signal_delivered`) to dispatch.
    None,
    /// A trampoline frame was spliced for this signal number.
    Dispatched(u32),
    /// Signal 31 was pending: the caller must run the process-exit path.
    HardKill,
}

/// Splices a [`TrampolineFrame`] onto `sp`, growing the stack downward as
/// the teacher's `CpuContext`/context-switch convention does, and returns
/// the new stack pointer.
///
/// # Safety
/// `sp` must point into a valid, writable stack region at least
/// `size_of::<TrampolineFrame>()` bytes below `sp`; this is the same
/// external contract the context-switch primitive itself relies on.
unsafe fn splice_frame(sp: usize, frame: TrampolineFrame) -> usize {
    let new_sp = sp - core::mem::size_of::<TrampolineFrame>();
    let dst = new_sp as *mut TrampolineFrame;
    dst.write_volatile(frame);
    new_sp
}

/// Before each resumption of `pcb`: scan its pending bitmask from 31 down.
/// Signal 31 always wins and is reported as [`SignalDelivery::HardKill`]
/// regardless of `last_signal_delivered` (it cannot be blocked or ignored).
/// Among 0..30, a signal with a null handler is silently dropped (cleared,
/// no splice) without affecting priority bookkeeping; the first signal with
/// a handler *and* a number greater than `last_signal_delivered` gets a
/// spliced trampoline frame. A pending signal at or below
/// `last_signal_delivered` is left untouched ("must-wait-higher") — it will
/// be reconsidered once the running handler returns via `sigreturn`.
pub fn handle_pending_signals(pcb: &mut Pcb) -> SignalDelivery {
    if pcb.pending_signals & (1 << SIGKILL) != 0 {
        pcb.pending_signals &= !(1 << SIGKILL);
        return SignalDelivery::HardKill;
    }

    loop {
        let s = match highest_set_bit(pcb.pending_signals) {
            Some(s) if s < SIGKILL => s,
            _ => return SignalDelivery::None,
        };

        match pcb.signal_table[s as usize] {
            None => {
                // Ignored: drop and keep scanning lower bits.
                pcb.pending_signals &= !(1 << s);
                continue;
            }
            Some(handler) => {
                if (s as i16) <= pcb.last_signal_delivered as i16 {
                    return SignalDelivery::None;
                }
                pcb.pending_signals &= !(1 << s);
                let frame = TrampolineFrame {
                    handler,
                    context: pcb.sp,
                    saved_last_signal_delivered: pcb.last_signal_delivered as i64,
                    saved_result_code: pcb.result_code as i64,
                };
                // SAFETY: `pcb.sp` is the process's own saved kernel-entry
                // stack pointer, maintained by the (external) context-switch
                // primitive and never read by any other subsystem concurrently
                // (single-threaded kernel).
                pcb.sp = unsafe { splice_frame(pcb.sp, frame) };
                pcb.last_signal_delivered = s as i8;
                return SignalDelivery::Dispatched(s);
            }
        }
    }
}

fn highest_set_bit(bits: u32) -> Option<u32> {
    if bits == 0 {
        None
    } else {
        Some(31 - bits.leading_zeros())
    }
}

/// `syssigreturn(old_sp)`: unwinds the spliced frame. Reads the frame that
/// was written just below `old_sp`'s caller (i.e. at the stack pointer the
/// trampoline was entered with), restores `sp`/`last_signal_delivered`/
/// `result_code`, and never returns to the trampoline itself — control goes
/// back to wherever the interrupted syscall/request left off.
///
/// # Safety
/// `frame_sp` must be a stack pointer previously produced by
/// [`splice_frame`] for this PCB.
pub unsafe fn sigreturn(pcb: &mut Pcb, frame_sp: usize) {
    let frame = (frame_sp as *const TrampolineFrame).read_volatile();
    pcb.sp = frame.context;
    pcb.last_signal_delivered = frame.saved_last_signal_delivered as i8;
    pcb.result_code = frame.saved_result_code as i32;
}

/// `sighandler(sig, new, old)` (§4.5 errors; value install happens in
/// `syscall.rs` after the user pointers are validated — this just encodes
/// the signal-number/fixed-signal rules).
pub fn validate_signal_number(sig: i32) -> Result<u32, SignalError> {
    if sig < 0 || sig as u32 >= SIGKILL {
        return Err(SignalError::BadSignalNumber);
    }
    Ok(sig as u32)
}

/// `syskill`'s own range check (§4.5: "signal number <0 or ≥32 → −583"),
/// distinct from [`validate_signal_number`] because `kill` — unlike
/// `sighandler` — accepts signal 31 (the hard-kill trigger) as valid.
pub fn validate_kill_signal_number(sig: i32) -> Result<u32, SignalError> {
    if sig < 0 || sig as u32 >= NUM_SIGNALS {
        return Err(SignalError::KillBadSignalNumber);
    }
    Ok(sig as u32)
}

/// `syskill(target, n)`: marks `n` pending on `target`. If `target` is
/// currently blocked on a syscall *and* has a non-null handler installed
/// for `n`, it is unblocked immediately with the domain-specific
/// `result_code` from §4.5's table; the pending bit is left set so the next
/// resumption still dispatches the handler via [`handle_pending_signals`].
/// A signal with a null handler is marked pending but never unblocks
/// anything (it will be silently dropped the next time signals are
/// scanned).
pub fn raise(pcb: &mut Pcb, sig: u32) -> SignalUnblock {
    pcb.pending_signals |= 1 << sig;

    if sig == SIGKILL {
        return SignalUnblock::HardKill;
    }

    if pcb.state != ProcState::Blocked {
        return SignalUnblock::NotBlocked;
    }
    if pcb.signal_table[sig as usize].is_none() {
        return SignalUnblock::Ignored;
    }

    match pcb.blocked_kind {
        // The delta list isn't reachable from here; the caller (the only
        // place that also owns the `Kernel`'s `DeltaList`) must remove the
        // node itself and report `ticks_left * TIME_SLICE`.
        BlockKind::Sleep => SignalUnblock::UnblockSleep,
        BlockKind::Read => {
            if pcb.read_progress > 0 {
                SignalUnblock::Unblock(pcb.read_progress as i32)
            } else {
                SignalUnblock::Unblock(crate::error::E_SIGNAL_INTERRUPTED)
            }
        }
        BlockKind::Sender { .. }
        | BlockKind::Receiver { .. }
        | BlockKind::ReceiveAny
        | BlockKind::Waiter { .. } => SignalUnblock::Unblock(crate::error::E_SIGNAL_INTERRUPTED),
        BlockKind::None => SignalUnblock::NotBlocked,
    }
}

/// Outcome of [`raise`], telling the dispatcher what else it must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalUnblock {
    /// Target wasn't blocked; the bit is just pending for its next resumption.
    NotBlocked,
    /// Target was blocked but the signal is ignored (null handler); nothing
    /// further to do.
    Ignored,
    /// Signal 31: the caller must run the process-exit path immediately.
    HardKill,
    /// Target must be dequeued from its blocked queue and readied with this
    /// `result_code`.
    Unblock(i32),
    /// Target was sleeping; the caller must remove it from the delta list,
    /// ready it with `result_code = ticks_left * TIME_SLICE`.
    UnblockSleep,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcb() -> Pcb {
        Pcb::empty(0)
    }

    #[test]
    fn hard_kill_wins_regardless_of_last_delivered() {
        let mut p = pcb();
        p.last_signal_delivered = 30;
        p.pending_signals = 1 << SIGKILL;
        assert_eq!(handle_pending_signals(&mut p), SignalDelivery::HardKill);
    }

    #[test]
    fn null_handler_is_dropped_silently() {
        let mut p = pcb();
        p.pending_signals = 1 << 5;
        p.signal_table[5] = None;
        assert_eq!(handle_pending_signals(&mut p), SignalDelivery::None);
        assert_eq!(p.pending_signals, 0);
    }

    #[test]
    fn higher_priority_pending_is_dispatched_over_lower() {
        let mut p = pcb();
        p.stack_base = 0x2000;
        p.stack_size = 0x1000;
        p.sp = 0x2f00;
        p.pending_signals = (1 << 3) | (1 << 20);
        p.signal_table[3] = Some(0x1000);
        p.signal_table[20] = Some(0x1100);

        let d = handle_pending_signals(&mut p);
        assert_eq!(d, SignalDelivery::Dispatched(20));
        assert_eq!(p.last_signal_delivered, 20);
        // signal 3 is still pending, waiting for a lower bar next time.
        assert_eq!(p.pending_signals & (1 << 3), 1 << 3);
    }

    #[test]
    fn must_wait_higher_blocks_lower_signal_until_return() {
        let mut p = pcb();
        p.last_signal_delivered = 10;
        p.pending_signals = 1 << 4;
        p.signal_table[4] = Some(0x1000);
        assert_eq!(handle_pending_signals(&mut p), SignalDelivery::None);
        assert_eq!(p.pending_signals & (1 << 4), 1 << 4);
    }

    #[test]
    fn validate_signal_number_rejects_kill_and_out_of_range() {
        assert!(validate_signal_number(-1).is_err());
        assert!(validate_signal_number(31).is_err());
        assert!(validate_signal_number(32).is_err());
        assert_eq!(validate_signal_number(30), Ok(30));
        assert_eq!(validate_signal_number(0), Ok(0));
    }

    #[test]
    fn validate_kill_signal_number_accepts_hard_kill_but_not_past_it() {
        assert_eq!(validate_kill_signal_number(31), Ok(31));
        assert_eq!(validate_kill_signal_number(0), Ok(0));
        assert_eq!(validate_kill_signal_number(-1), Err(SignalError::KillBadSignalNumber));
        assert_eq!(validate_kill_signal_number(32), Err(SignalError::KillBadSignalNumber));
    }

    #[test]
    fn raise_with_null_handler_on_blocked_process_is_ignored() {
        let mut p = pcb();
        p.state = ProcState::Blocked;
        p.blocked_kind = BlockKind::Sleep;
        assert_eq!(raise(&mut p, 2), SignalUnblock::Ignored);
        assert_eq!(p.pending_signals & (1 << 2), 1 << 2);
    }

    #[test]
    fn raise_unblocks_sender_with_signal_interrupted_code() {
        let mut p = pcb();
        p.state = ProcState::Blocked;
        p.blocked_kind = BlockKind::Sender { dest: 5 };
        p.signal_table[2] = Some(0x1000);
        assert_eq!(raise(&mut p, 2), SignalUnblock::Unblock(crate::error::E_SIGNAL_INTERRUPTED));
    }

    #[test]
    fn raise_unblocks_read_with_partial_progress() {
        let mut p = pcb();
        p.state = ProcState::Blocked;
        p.blocked_kind = BlockKind::Read;
        p.read_progress = 3;
        p.signal_table[2] = Some(0x1000);
        assert_eq!(raise(&mut p, 2), SignalUnblock::Unblock(3));
    }
}
