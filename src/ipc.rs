//! `send`/`recv`/`recv-any` rendezvous, §4.3.
//!
//! The unit of transfer is one machine word. A blocked party's destination
//! (for `recv`) or payload (for `send`) lives in its own `ipc_arg`; the
//! queue a blocked process sits on is always keyed by the *peer* it names,
//! which is why `send`'s immediate-match check walks the caller's own
//! `blocked_receiver`/`recv_any` links rather than the destination's.

use crate::error::{IpcError, BLOCK_PENDING};
use crate::kernel::Kernel;
use crate::pcb::{BlockKind, IpcArg, Pid};

impl Kernel {
    fn complete_recv(&mut self, recv_slot: usize, from_pid: Pid, word: u32) {
        let arg = self.pcbs[recv_slot].ipc_arg;
        if arg.recv_word_ptr != 0 {
            unsafe { (arg.recv_word_ptr as *mut u32).write(word) };
        }
        if arg.from_ptr != 0 {
            unsafe { (arg.from_ptr as *mut Pid).write(from_pid) };
        }
    }

    /// `send(dest, word)`. Returns a user-visible code immediately on
    /// failure or immediate rendezvous, or [`BLOCK_PENDING`] once the
    /// caller has been installed on `dest`'s sender queue.
    pub fn sys_send(&mut self, caller: usize, dest_pid: Pid, word: u32) -> i32 {
        let caller_pid = self.pcbs[caller].pid;
        if dest_pid == caller_pid {
            return IpcError::SelfTarget.to_code();
        }
        let Some(dest) = self.find_slot(dest_pid) else {
            return IpcError::NoSuchTarget.to_code();
        };

        let is_receiver_match = matches!(
            self.pcbs[dest].blocked_kind,
            BlockKind::Receiver { from } if from == caller_pid
        );
        let is_any_match = matches!(self.pcbs[dest].blocked_kind, BlockKind::ReceiveAny);

        if self.pcbs[dest].state == crate::pcb::ProcState::Blocked && (is_receiver_match || is_any_match) {
            if is_receiver_match {
                let mut q = self.pcbs[caller].blocked_receiver;
                q.remove(&mut self.pcbs, dest);
                self.pcbs[caller].blocked_receiver = q;
            } else {
                self.recv_any.remove(&mut self.pcbs, dest);
            }
            self.complete_recv(dest, caller_pid, word);
            self.pcbs[dest].result_code = 0;
            self.ready(dest);
            log::debug!("send: {} -> {} delivered immediately", caller_pid, dest_pid);
            return 0;
        }

        self.pcbs[caller].ipc_arg.word = word;
        self.block(caller, BlockKind::Sender { dest: dest_pid });
        let mut q = self.pcbs[dest].blocked_sender;
        q.enqueue_tail(&mut self.pcbs, caller);
        self.pcbs[dest].blocked_sender = q;
        BLOCK_PENDING
    }

    /// `recv(from, &word_out, &from_out)`. `from_pid == 0` means
    /// receive-any.
    pub fn sys_recv(&mut self, caller: usize, from_pid: Pid, word_ptr: usize, from_ptr: usize) -> i32 {
        if from_pid == 0 {
            return self.recv_any(caller, word_ptr, from_ptr);
        }

        let caller_pid = self.pcbs[caller].pid;
        if from_pid == caller_pid {
            return IpcError::SelfTarget.to_code();
        }
        let Some(src) = self.find_slot(from_pid) else {
            return IpcError::NoSuchTarget.to_code();
        };

        let is_sender_match = matches!(
            self.pcbs[src].blocked_kind,
            BlockKind::Sender { dest } if dest == caller_pid
        );
        if self.pcbs[src].state == crate::pcb::ProcState::Blocked && is_sender_match {
            let mut q = self.pcbs[caller].blocked_sender;
            q.remove(&mut self.pcbs, src);
            self.pcbs[caller].blocked_sender = q;

            let word = self.pcbs[src].ipc_arg.word;
            if word_ptr != 0 {
                unsafe { (word_ptr as *mut u32).write(word) };
            }
            if from_ptr != 0 {
                unsafe { (from_ptr as *mut Pid).write(from_pid) };
            }
            self.pcbs[src].result_code = 0;
            self.ready(src);
            return 0;
        }

        self.pcbs[caller].ipc_arg = IpcArg { word: 0, recv_word_ptr: word_ptr, from_ptr };
        self.block(caller, BlockKind::Receiver { from: from_pid });
        let mut q = self.pcbs[src].blocked_receiver;
        q.enqueue_tail(&mut self.pcbs, caller);
        self.pcbs[src].blocked_receiver = q;
        BLOCK_PENDING
    }

    fn recv_any(&mut self, caller: usize, word_ptr: usize, from_ptr: usize) -> i32 {
        if self.user_proc_count <= 1 {
            return IpcError::OnlyProcess.to_code();
        }

        let mut q = self.pcbs[caller].blocked_sender;
        let head = q.dequeue_head(&mut self.pcbs);
        self.pcbs[caller].blocked_sender = q;

        if let Some(src) = head {
            let from_pid = self.pcbs[src].pid;
            let word = self.pcbs[src].ipc_arg.word;
            if word_ptr != 0 {
                unsafe { (word_ptr as *mut u32).write(word) };
            }
            if from_ptr != 0 {
                unsafe { (from_ptr as *mut Pid).write(from_pid) };
            }
            self.pcbs[src].result_code = 0;
            self.ready(src);
            return 0;
        }

        self.pcbs[caller].ipc_arg = IpcArg { word: 0, recv_word_ptr: word_ptr, from_ptr };
        self.block(caller, BlockKind::ReceiveAny);
        let mut any = self.recv_any;
        any.enqueue_tail(&mut self.pcbs, caller);
        self.recv_any = any;
        BLOCK_PENDING
    }

    /// Drains `slot`'s `Sender`/`Receiver`/`Waiter` sub-queues, waking every
    /// resident with `-1` (§4.3: "every `Sender`... queue drained... woken
    /// with -1" on termination). Called from `cleanup`.
    pub fn drain_terminated_queues(&mut self, slot: usize) {
        let mut senders = self.pcbs[slot].blocked_sender;
        while let Some(s) = senders.dequeue_head(&mut self.pcbs) {
            self.pcbs[s].result_code = IpcError::ReceiverDied.to_code();
            self.ready(s);
        }
        self.pcbs[slot].blocked_sender = senders;

        let mut receivers = self.pcbs[slot].blocked_receiver;
        while let Some(r) = receivers.dequeue_head(&mut self.pcbs) {
            self.pcbs[r].result_code = IpcError::ReceiverDied.to_code();
            self.ready(r);
        }
        self.pcbs[slot].blocked_receiver = receivers;

        let mut waiters = self.pcbs[slot].blocked_waiter;
        while let Some(w) = waiters.dequeue_head(&mut self.pcbs) {
            self.pcbs[w].result_code = IpcError::ReceiverDied.to_code();
            self.ready(w);
        }
        self.pcbs[slot].blocked_waiter = waiters;
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
    fn send_before_recv_blocks_then_recv_completes_rendezvous() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let b = spawn(&mut k);
        let a_pid = k.pcbs[a].pid;
        let b_pid = k.pcbs[b].pid;

        let r = k.sys_send(a, b_pid, 0xAA);
        assert_eq!(r, BLOCK_PENDING);
        assert_eq!(k.pcbs[a].state, ProcState::Blocked);

        let mut word = 0u32;
        let mut from = 0 as Pid;
        let r2 = k.sys_recv(b, a_pid, &mut word as *mut u32 as usize, &mut from as *mut Pid as usize);
        assert_eq!(r2, 0);
        assert_eq!(word, 0xAA);
        assert_eq!(from, a_pid);
        assert_eq!(k.pcbs[a].state, ProcState::Ready);
        assert_eq!(k.pcbs[a].result_code, 0);
    }

    #[test]
    fn recv_any_matches_queued_sender_fifo() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let b = spawn(&mut k);
        let c = spawn(&mut k);
        let a_pid = k.pcbs[a].pid;
        let b_pid = k.pcbs[b].pid;
        let c_pid = k.pcbs[c].pid;

        assert_eq!(k.sys_send(a, c_pid, 1), BLOCK_PENDING);
        assert_eq!(k.sys_send(b, c_pid, 2), BLOCK_PENDING);

        let mut word = 0u32;
        let mut from = 0 as Pid;
        let r = k.sys_recv(c, 0, &mut word as *mut u32 as usize, &mut from as *mut Pid as usize);
        assert_eq!(r, 0);
        assert_eq!(from, a_pid);
        assert_eq!(word, 1);

        let r2 = k.sys_recv(c, 0, &mut word as *mut u32 as usize, &mut from as *mut Pid as usize);
        assert_eq!(r2, 0);
        assert_eq!(from, b_pid);
        assert_eq!(word, 2);
    }

    #[test]
    fn self_send_is_rejected() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let a_pid = k.pcbs[a].pid;
        assert_eq!(k.sys_send(a, a_pid, 0), IpcError::SelfTarget.to_code());
    }

    #[test]
    fn recv_any_with_only_process_fails() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let mut word = 0u32;
        let mut from = 0 as Pid;
        let r = k.sys_recv(a, 0, &mut word as *mut u32 as usize, &mut from as *mut Pid as usize);
        assert_eq!(r, IpcError::OnlyProcess.to_code());
    }
}
