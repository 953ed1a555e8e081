//! Sleep delta list.
//!
//! A singly-linked sequence of sleeping PCBs ordered by absolute wake time,
//! where each node's `key` stores the *difference* in ticks from its
//! predecessor (§3, §4.4). Walking from the head and summing `key`s up to
//! and including node `i` yields node `i`'s absolute remaining delay.
//!
//! Design Note 9 flags a likely source bug: the original `poll` dereferences
//! `proc->next` before checking it against null, which breaks on a
//! single-element list. This implementation guards the head's successor
//! before touching it.

use crate::pcb::Pcb;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaList {
    head: Option<usize>,
}

impl DeltaList {
    pub const fn new() -> Self {
        DeltaList { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Inserts `idx` with relative delay `delay` (ticks from now). Walks the
    /// list subtracting each successor's `key` from the remaining delay,
    /// inserting before the first node whose `key > delay` (ties broken by
    /// insertion order: a later insert with an equal remaining delay lands
    /// strictly after any existing node with that same remaining delay,
    /// since the loop only steps past nodes with `key <= delay`).
    pub fn insert(&mut self, pcbs: &mut [Pcb; crate::pcb::N], idx: usize, delay: i64) {
        let mut remaining = delay;
        let mut prev: Option<usize> = None;
        let mut cur = self.head;

        while let Some(c) = cur {
            let k = pcbs[c].key;
            if k > remaining {
                break;
            }
            remaining -= k;
            prev = Some(c);
            cur = pcbs[c].delta_next;
        }

        pcbs[idx].key = remaining;
        pcbs[idx].delta_next = cur;
        if let Some(c) = cur {
            pcbs[c].key -= remaining;
        }

        match prev {
            Some(p) => pcbs[p].delta_next = Some(idx),
            None => self.head = Some(idx),
        }
    }

    /// Removes `idx` (a signal interrupted the sleep). Returns the absolute
    /// remaining ticks it had left, folding its `key` into its successor so
    /// the list stays monotone.
    pub fn remove(&mut self, pcbs: &mut [Pcb; crate::pcb::N], idx: usize) -> i64 {
        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        let mut absolute = 0i64;

        while let Some(c) = cur {
            absolute += pcbs[c].key;
            if c == idx {
                break;
            }
            prev = Some(c);
            cur = pcbs[c].delta_next;
        }

        let next = pcbs[idx].delta_next;
        if let Some(n) = next {
            pcbs[n].key += pcbs[idx].key;
        }
        match prev {
            Some(p) => pcbs[p].delta_next = next,
            None => self.head = next,
        }
        pcbs[idx].delta_next = None;
        pcbs[idx].key = 0;

        absolute
    }

    /// Advances time by one tick. Decrements the head's `key`, then wakes
    /// (removes + returns) every node whose absolute remaining delay has
    /// reached zero, in order. Correctly handles a single-element list by
    /// checking `delta_next` for `None` before dereferencing it, unlike the
    /// documented source bug.
    pub fn tick(&mut self, pcbs: &mut [Pcb; crate::pcb::N]) -> TickDrain<'_> {
        if let Some(h) = self.head {
            pcbs[h].key -= 1;
        }
        TickDrain { list: self, pcbs }
    }
}

/// Iterator-like drain of every delta-list node whose delay has elapsed on
/// this tick. Not a real `Iterator` impl because it needs `&mut` access to
/// both the list header and the arena on each step.
pub struct TickDrain<'a> {
    list: &'a mut DeltaList,
    pcbs: &'a mut [Pcb; crate::pcb::N],
}

impl<'a> TickDrain<'a> {
    pub fn next_expired(&mut self) -> Option<usize> {
        let h = self.list.head?;
        if self.pcbs[h].key > 0 {
            return None;
        }
        let next = self.pcbs[h].delta_next;
        self.list.head = next;
        self.pcbs[h].delta_next = None;
        self.pcbs[h].key = 0;
        Some(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::N;

    fn arena() -> [Pcb; N] {
        core::array::from_fn(Pcb::empty)
    }

    fn abs_delays(list: &DeltaList, pcbs: &[Pcb; N]) -> alloc_free_vec::Vec8 {
        let mut out = alloc_free_vec::Vec8::new();
        let mut sum = 0i64;
        let mut cur = list.head();
        while let Some(c) = cur {
            sum += pcbs[c].key;
            out.push(sum);
            cur = pcbs[c].delta_next;
        }
        out
    }

    // A tiny fixed-capacity vec so these tests don't need `alloc`.
    mod alloc_free_vec {
        pub struct Vec8 {
            buf: [i64; 8],
            len: usize,
        }
        impl Vec8 {
            pub fn new() -> Self {
                Vec8 { buf: [0; 8], len: 0 }
            }
            pub fn push(&mut self, v: i64) {
                self.buf[self.len] = v;
                self.len += 1;
            }
            pub fn as_slice(&self) -> &[i64] {
                &self.buf[..self.len]
            }
        }
    }

    #[test]
    fn insert_keeps_monotone_absolute_delays() {
        let mut pcbs = arena();
        let mut list = DeltaList::new();
        list.insert(&mut pcbs, 0, 50);
        list.insert(&mut pcbs, 1, 10);
        list.insert(&mut pcbs, 2, 30);
        list.insert(&mut pcbs, 3, 10);

        let delays = abs_delays(&list, &pcbs);
        let s = delays.as_slice();
        assert_eq!(s, &[10, 10, 30, 50]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut pcbs = arena();
        let mut list = DeltaList::new();
        list.insert(&mut pcbs, 0, 10);
        list.insert(&mut pcbs, 1, 10);
        // node 0 was inserted first, so it must wake first.
        assert_eq!(list.head(), Some(0));
        assert_eq!(pcbs[0].delta_next, Some(1));
    }

    #[test]
    fn tick_wakes_single_element_list_without_panicking() {
        let mut pcbs = arena();
        let mut list = DeltaList::new();
        list.insert(&mut pcbs, 0, 1);

        let mut drain = list.tick(&mut pcbs);
        assert_eq!(drain.next_expired(), Some(0));
        assert_eq!(drain.next_expired(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn tick_wakes_all_expired_nodes_in_order() {
        let mut pcbs = arena();
        let mut list = DeltaList::new();
        list.insert(&mut pcbs, 0, 1);
        list.insert(&mut pcbs, 1, 1);
        list.insert(&mut pcbs, 2, 2);

        let mut drain = list.tick(&mut pcbs);
        assert_eq!(drain.next_expired(), Some(0));
        assert_eq!(drain.next_expired(), Some(1));
        assert_eq!(drain.next_expired(), None);
        assert!(!list.is_empty());

        let mut drain = list.tick(&mut pcbs);
        assert_eq!(drain.next_expired(), Some(2));
        assert_eq!(drain.next_expired(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn remove_returns_absolute_remaining_and_preserves_successor_delay() {
        let mut pcbs = arena();
        let mut list = DeltaList::new();
        list.insert(&mut pcbs, 0, 10);
        list.insert(&mut pcbs, 1, 20);

        let remaining = list.remove(&mut pcbs, 0);
        assert_eq!(remaining, 10);

        // node 1's absolute delay must be unchanged by removing node 0.
        let delays = abs_delays(&list, &pcbs);
        assert_eq!(delays.as_slice(), &[20]);
    }
}
