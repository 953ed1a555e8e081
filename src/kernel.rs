//! The `Kernel` singleton: every process-wide table named in §3/§9 as
//! "global kernel state" collapsed into one value owned by boot code and
//! passed by exclusive reference into each request handler.
//!
//! Grounded in Design Note "Global kernel state": memory → queues →
//! dispatcher state → sleep → context vectors → devices is the init order
//! this type's constructor follows.

use crate::delta::DeltaList;
use crate::kbd::Keyboard;
use crate::mm::SlotStackPool;
use crate::pcb::{Pcb, Pid, Priority, ProcState, N};
use crate::queue::Queue;

/// Slot 0 is permanently reserved for the idle process (pid 0); it is
/// never linked into the stopped queue or any ready queue.
pub const IDLE_SLOT: usize = 0;

pub struct Kernel {
    pub pcbs: [Pcb; N],
    pub ready: [Queue; Priority::LEVELS],
    pub stopped: Queue,
    pub recv_any: Queue,
    pub delta: DeltaList,
    pub keyboard: Keyboard,
    pub stacks: SlotStackPool,
    pub current: usize,
    /// Live (non-idle, non-stopped) process count, touched only by
    /// `create`/`cleanup`. Kept apart from boot-time slot initialization so
    /// it starts at exactly 0 (Design Note: a shared counter there produced
    /// a negative count at boot in the source).
    pub user_proc_count: usize,
}

/// The single kernel instance, constructed once during boot (§4.8) and
/// reached by every interrupt/syscall shim thereafter. A `spin::Mutex`
/// rather than a bare `static mut` so the borrow is checked even though the
/// kernel never actually contends it (interrupts are off for the duration
/// of any one request).
pub static KERNEL: spin::Mutex<Option<Kernel>> = spin::Mutex::new(None);

/// Builds the one [`Kernel`] instance and installs it as [`KERNEL`]. Must
/// run exactly once, during boot, before interrupts are enabled.
pub fn init_global() {
    *KERNEL.lock() = Some(Kernel::new());
}

impl Kernel {
    pub fn new() -> Self {
        let mut pcbs: [Pcb; N] = core::array::from_fn(Pcb::empty);
        pcbs[IDLE_SLOT].pid = crate::pcb::IDLE_PID;
        pcbs[IDLE_SLOT].state = ProcState::Running;

        let mut k = Kernel {
            pcbs,
            ready: [Queue::new(); Priority::LEVELS],
            stopped: Queue::new(),
            recv_any: Queue::new(),
            delta: DeltaList::new(),
            keyboard: Keyboard::new(),
            stacks: SlotStackPool::new(),
            current: IDLE_SLOT,
            user_proc_count: 0,
        };

        for slot in 1..N {
            k.stopped.enqueue_tail(&mut k.pcbs, slot);
        }

        log::info!("kernel: {} process slots, idle at slot {}", N, IDLE_SLOT);
        k
    }

    pub fn current_pcb(&mut self) -> &mut Pcb {
        &mut self.pcbs[self.current]
    }

    /// Finds the live slot holding `pid`, if any (§3: "valid iff the slot's
    /// stored pid matches and its state != Stopped").
    pub fn find_slot(&self, pid: Pid) -> Option<usize> {
        if pid == crate::pcb::IDLE_PID {
            return Some(IDLE_SLOT);
        }
        let slot = crate::pcb::slot_of(pid);
        if slot != IDLE_SLOT
            && self.pcbs[slot].pid == pid
            && self.pcbs[slot].state != ProcState::Stopped
        {
            Some(slot)
        } else {
            None
        }
    }

    /// `next()`: highest-priority non-empty ready queue, head dequeued;
    /// round-robin within a priority falls out of FIFO dequeue order. Idle
    /// is returned when every ready queue is empty.
    pub fn next(&mut self) -> usize {
        for level in 0..Priority::LEVELS {
            if let Some(slot) = self.ready[level].dequeue_head(&mut self.pcbs) {
                return slot;
            }
        }
        IDLE_SLOT
    }

    /// `ready(p)`: clears blocked state, enqueues on its priority's ready
    /// queue. Never called with the idle slot.
    pub fn ready(&mut self, slot: usize) {
        debug_assert!(slot != IDLE_SLOT, "idle process must never be readied");
        let pcb = &mut self.pcbs[slot];
        pcb.state = ProcState::Ready;
        pcb.blocked_kind = crate::pcb::BlockKind::None;
        let level = pcb.priority.as_index();
        self.ready[level].enqueue_tail(&mut self.pcbs, slot);
        log::trace!("ready: slot {} pid {} prio {}", slot, pcb.pid, level);
    }

    pub fn block(&mut self, slot: usize, kind: crate::pcb::BlockKind) {
        self.pcbs[slot].state = ProcState::Blocked;
        self.pcbs[slot].blocked_kind = kind;
        log::trace!("block: slot {} pid {} as {:?}", slot, self.pcbs[slot].pid, kind);
    }
}
