//! Process life-cycle: `create`/`cleanup`, stack layout, the initial
//! register frame a freshly created process resumes into, and the
//! syscalls that report on or act on process identity (`getpid`, `puts`,
//! `setprio`, `getcputimes`, `wait`).
//!
//! Grounded in the teacher's `CpuContext` (`sched/context.rs`): the same
//! callee-saved register set, in the same order, forms the initial frame
//! here — just constructed once at creation time instead of saved by a
//! running context switch.

use crate::error::BLOCK_PENDING;
use crate::kernel::Kernel;
use crate::mm::StackAllocator;
use crate::pcb::{BlockKind, Pid, Priority, ProcState};

/// Frame laid out at the top of a fresh stack so that the (external)
/// context-switch primitive's final `pop`s and `ret` land the CPU inside
/// `entry`, with `return_trap`'s address sitting where `entry`'s own `ret`
/// (if it ever returns instead of looping forever) will find it — the
/// "return-to-sysstop trap".
#[repr(C)]
struct InitialFrame {
    r15: usize,
    r14: usize,
    r13: usize,
    r12: usize,
    rbp: usize,
    rbx: usize,
    entry: usize,
    return_trap: usize,
}

/// Landing pad for a process whose `entry` function returned normally
/// instead of looping forever. Issues the same software interrupt a task
/// calling `stop()` explicitly would.
extern "C" fn process_return_trap() -> ! {
    unsafe { crate::syscall::raw_syscall(crate::syscall::SYS_STOP, 0, 0, 0) };
    unreachable!("sys_stop never returns control to its caller")
}

impl Kernel {
    /// `create(entry, stack)`: returns the new pid, or -1 if `entry` is
    /// null or the PCB table is full.
    pub fn sys_create(&mut self, entry: usize, requested_stack: usize) -> i32 {
        if entry == 0 {
            return -1;
        }
        let Some(slot) = self.stopped.dequeue_head(&mut self.pcbs) else {
            return -1;
        };

        let (base, size) = self.stacks.alloc_stack(slot, requested_stack);
        let frame_addr = base + size - core::mem::size_of::<InitialFrame>();
        // SAFETY: `frame_addr` is within the region `alloc_stack` just
        // handed us exclusively for this slot.
        unsafe {
            (frame_addr as *mut InitialFrame).write(InitialFrame {
                r15: 0,
                r14: 0,
                r13: 0,
                r12: 0,
                rbp: 0,
                rbx: 0,
                entry,
                return_trap: process_return_trap as usize,
            });
        }

        let pid = self.pcbs[slot].pid;
        {
            let pcb = &mut self.pcbs[slot];
            pcb.sp = frame_addr;
            pcb.stack_base = base;
            pcb.stack_size = size;
            pcb.result_code = 0;
            pcb.priority = Priority::default();
            pcb.signal_table = [None; 32];
            pcb.pending_signals = 0;
            pcb.last_signal_delivered = -1;
            pcb.fd_table = [None, None, None, None];
            pcb.cpu_time = 0;
            pcb.blocked_kind = BlockKind::None;
        }

        self.user_proc_count += 1;
        self.ready(slot);
        log::info!("create: pid {} at slot {}, entry=0x{:x}", pid, slot, entry);
        pid
    }

    /// Returns `slot` to the stopped pool, waking everyone blocked on it.
    pub fn cleanup(&mut self, slot: usize) {
        let pid = self.pcbs[slot].pid;
        self.drain_terminated_queues(slot);

        for fd in 0..self.pcbs[slot].fd_table.len() {
            if self.pcbs[slot].fd_table[fd].is_some() {
                self.keyboard.close();
                self.pcbs[slot].fd_table[fd] = None;
            }
        }
        if self.keyboard.blocked_reader == Some(slot) {
            self.keyboard.blocked_reader = None;
        }

        self.pcbs[slot].state = ProcState::Stopped;
        self.pcbs[slot].pid = crate::pcb::next_generation(pid, slot);
        self.stopped.enqueue_tail(&mut self.pcbs, slot);
        self.user_proc_count = self.user_proc_count.saturating_sub(1);
        log::info!("cleanup: pid {} (slot {}) stopped", pid, slot);
    }

    /// `stop()`. The dispatcher must not attempt to resume `caller` after
    /// this call returns — it re-selects `current` itself.
    pub fn sys_stop(&mut self, caller: usize) {
        self.cleanup(caller);
        self.current = self.next();
    }

    pub fn sys_getpid(&self, caller: usize) -> i32 {
        self.pcbs[caller].pid
    }

    /// `puts(str)`: writes a NUL-free, length-prefixed-by-validation user
    /// string to the kernel log. Pointer/length validation happens in the
    /// syscall layer.
    pub fn sys_puts(&mut self, _caller: usize, buf: usize, len: usize) -> i32 {
        // SAFETY: `buf`/`len` validated by the syscall layer.
        let bytes = unsafe { core::slice::from_raw_parts(buf as *const u8, len) };
        let s = core::str::from_utf8(bytes).unwrap_or("<invalid utf8>");
        log::info!("{}", s);
        0
    }

    /// `setprio(p)`: `p == -1` queries; `p` in `0..=3` sets. Either way
    /// returns the previous priority.
    pub fn sys_setprio(&mut self, caller: usize, p: i32) -> i32 {
        let prev = self.pcbs[caller].priority.get() as i32;
        if p == -1 {
            return prev;
        }
        match Priority::new(p as u8) {
            Some(prio) if (0..=3).contains(&p) => {
                self.pcbs[caller].priority = prio;
                prev
            }
            _ => -1,
        }
    }

    /// `wait(pid)`: blocks the caller until `target` terminates (woken
    /// with `-1` per the uniform termination-drain rule, §4.3), or fails
    /// immediately for a self-target or nonexistent target.
    pub fn sys_wait(&mut self, caller: usize, target_pid: Pid) -> i32 {
        let caller_pid = self.pcbs[caller].pid;
        if target_pid == caller_pid {
            return -1;
        }
        let Some(target) = self.find_slot(target_pid) else {
            return -1;
        };

        self.block(caller, BlockKind::Waiter { target: target_pid });
        let mut q = self.pcbs[target].blocked_waiter;
        q.enqueue_tail(&mut self.pcbs, caller);
        self.pcbs[target].blocked_waiter = q;
        BLOCK_PENDING
    }

    /// `getcputimes(&table)`: one entry per non-stopped slot plus idle,
    /// `(pid, cpu_time)` pairs, written through the user pointer. Returns
    /// the index past the last slot used, or a negative address-validation
    /// code (checked by the syscall layer before this runs).
    pub fn sys_getcputimes(&self, table_ptr: usize, capacity: usize) -> i32 {
        let mut entries: heapless::Vec<(Pid, u64), { crate::pcb::N }> = heapless::Vec::new();
        for (slot, pcb) in self.pcbs.iter().enumerate() {
            if slot == crate::kernel::IDLE_SLOT || pcb.state != ProcState::Stopped {
                let _ = entries.push((pcb.pid, pcb.cpu_time));
            }
        }

        let n = entries.len().min(capacity);
        // SAFETY: `table_ptr` validated by the syscall layer as pointing to
        // at least `capacity` `(Pid, u64)` slots.
        let dst = unsafe { core::slice::from_raw_parts_mut(table_ptr as *mut (Pid, u64), n) };
        dst.copy_from_slice(&entries[..n]);
        n as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;

    #[test]
    fn create_promotes_undersized_stack_and_assigns_pid() {
        let mut k = Kernel::new();
        let entry = 0x1000usize;
        let pid = k.sys_create(entry, 16);
        assert!(pid >= 1);
        let slot = k.find_slot(pid).unwrap();
        assert_eq!(k.pcbs[slot].stack_size, crate::pcb::DEFAULT_STACK_SIZE);
        assert_eq!(k.pcbs[slot].state, ProcState::Ready);
    }

    #[test]
    fn create_with_null_entry_fails() {
        let mut k = Kernel::new();
        assert_eq!(k.sys_create(0, 4096), -1);
    }

    #[test]
    fn cleanup_bumps_generation_and_frees_slot() {
        let mut k = Kernel::new();
        let pid = k.sys_create(0x2000, 4096);
        let slot = k.find_slot(pid).unwrap();
        k.cleanup(slot);
        assert_eq!(k.pcbs[slot].state, ProcState::Stopped);
        assert_eq!(k.pcbs[slot].pid, pid + crate::pcb::N as i32);
        assert_eq!(k.find_slot(pid), None);
    }

    #[test]
    fn setprio_query_does_not_change_priority() {
        let mut k = Kernel::new();
        let pid = k.sys_create(0x3000, 4096);
        let slot = k.find_slot(pid).unwrap();
        k.current = slot;
        let before = k.sys_setprio(slot, -1);
        assert_eq!(before, Priority::default().get() as i32);
        assert_eq!(k.sys_setprio(slot, -1), before);
    }

    #[test]
    fn wait_on_self_fails_immediately() {
        let mut k = Kernel::new();
        let pid = k.sys_create(0x4000, 4096);
        let slot = k.find_slot(pid).unwrap();
        assert_eq!(k.sys_wait(slot, pid), -1);
    }
}
