//! Sleep device, §4.4: `sleep(ms)` converts a millisecond duration to
//! scheduler ticks and parks the caller on the delta list; `tick()` (driven
//! by the timer ISR) wakes everyone whose delay has elapsed.

use crate::error::BLOCK_PENDING;
use crate::kernel::Kernel;
use crate::pcb::BlockKind;

/// Scheduler tick period, also the PIT's programmed interval (§4.8).
pub const TIME_SLICE_MS: u32 = 10;

impl Kernel {
    /// `sleep(ms)`. `ms == 0` is a no-op that returns immediately rather
    /// than parking for zero ticks.
    pub fn sys_sleep(&mut self, caller: usize, ms: u32) -> i32 {
        if ms == 0 {
            return 0;
        }
        let ticks = ms.div_ceil(TIME_SLICE_MS).max(1) as i64;
        self.block(caller, BlockKind::Sleep);
        self.delta.insert(&mut self.pcbs, caller, ticks);
        BLOCK_PENDING
    }

    /// Advances the delta list by one tick and readies every process whose
    /// sleep has elapsed, with `result_code = 0` (a sleep that runs to
    /// completion, as opposed to one cut short by a signal, always
    /// succeeds).
    pub fn tick(&mut self) {
        let mut drain = self.delta.tick(&mut self.pcbs);
        let mut woken = heapless::Vec::<usize, { crate::pcb::N }>::new();
        while let Some(slot) = drain.next_expired() {
            let _ = woken.push(slot);
        }
        for slot in woken {
            self.pcbs[slot].result_code = 0;
            self.ready(slot);
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
    fn sleep_zero_is_immediate() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        assert_eq!(k.sys_sleep(a, 0), 0);
        assert_eq!(k.pcbs[a].state, ProcState::Ready);
    }

    #[test]
    fn sleep_rounds_up_to_whole_ticks_and_wakes_on_schedule() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        assert_eq!(k.sys_sleep(a, 25), BLOCK_PENDING);
        assert_eq!(k.pcbs[a].state, ProcState::Blocked);

        k.tick();
        k.tick();
        assert_eq!(k.pcbs[a].state, ProcState::Blocked);
        k.tick();
        assert_eq!(k.pcbs[a].state, ProcState::Ready);
        assert_eq!(k.pcbs[a].result_code, 0);
    }

    #[test]
    fn two_sleepers_wake_in_order() {
        let mut k = Kernel::new();
        let a = spawn(&mut k);
        let b = spawn(&mut k);
        k.sys_sleep(a, 10);
        k.sys_sleep(b, 20);

        k.tick();
        assert_eq!(k.pcbs[a].state, ProcState::Ready);
        assert_eq!(k.pcbs[b].state, ProcState::Blocked);
        k.tick();
        assert_eq!(k.pcbs[b].state, ProcState::Ready);
    }
}
