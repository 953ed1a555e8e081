//! Keyboard driver: lower half (ISR, scan-code translation, ring buffer)
//! and upper half (`read` with blocking + EOF/line/ioctl semantics), §4.7.
//!
//! Two devsw entries share this one hardware instance (minor 0, no echo;
//! minor 1, echo) — see [`crate::dii`]. Only one of the two may be open at
//! any time, enforced by [`crate::dii::DeviceTable`].

/// Ring buffer capacity, implemented with the classic "one empty slot"
/// convention (a backing array of `CAPACITY + 1` so head==tail
/// unambiguously means empty).
pub const CAPACITY: usize = 4;
const SLOTS: usize = CAPACITY + 1;

const DEFAULT_EOF: u8 = 0x04; // Ctrl-D / EOT, matches common tty convention.

pub const IOCTL_CHANGE_EOF: usize = 53;
pub const IOCTL_ECHO_OFF: usize = 55;
pub const IOCTL_ECHO_ON: usize = 56;

#[derive(Debug, Clone, Copy, Default)]
struct RingBuffer {
    buf: [u8; SLOTS],
    head: usize,
    tail: usize,
}

impl RingBuffer {
    const fn new() -> Self {
        RingBuffer { buf: [0; SLOTS], head: 0, tail: 0 }
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        (self.tail + 1) % SLOTS == self.head
    }

    /// Returns `false` (char dropped) if the buffer was already full.
    fn push(&mut self, c: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf[self.tail] = c;
        self.tail = (self.tail + 1) % SLOTS;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let c = self.buf[self.head];
        self.head = (self.head + 1) % SLOTS;
        Some(c)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    shift: bool,
    ctrl: bool,
    caps: bool,
    meta: bool,
}

/// Outcome of draining ring-buffer (or directly-arriving) characters into a
/// caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub transferred: usize,
    pub satisfied: bool,
}

pub struct Keyboard {
    ring: RingBuffer,
    mods: Modifiers,
    eof_char: u8,
    eof_seen: bool,
    hw_enabled: bool,
    echo: bool,
    /// Which minor is currently open, if any (enforces single-open policy
    /// alongside `DeviceTable`).
    open_minor: Option<u8>,
    /// Slot index of the PCB blocked on `read`, if any — at most one, since
    /// at most one fd can reference this device system-wide.
    pub blocked_reader: Option<usize>,
}

impl Keyboard {
    pub const fn new() -> Self {
        Keyboard {
            ring: RingBuffer::new(),
            mods: Modifiers { shift: false, ctrl: false, caps: false, meta: false },
            eof_char: DEFAULT_EOF,
            eof_seen: false,
            hw_enabled: true,
            echo: false,
            open_minor: None,
            blocked_reader: None,
        }
    }

    pub fn open_minor(&self) -> Option<u8> {
        self.open_minor
    }

    pub fn open(&mut self, minor: u8, echo: bool) {
        self.open_minor = Some(minor);
        self.echo = echo;
        self.eof_seen = false;
        self.hw_enabled = true;
        self.ring = RingBuffer::new();
        self.blocked_reader = None;
    }

    pub fn close(&mut self) {
        self.open_minor = None;
        self.blocked_reader = None;
    }

    pub fn set_echo(&mut self, on: bool) {
        self.echo = on;
    }

    pub fn set_eof_char(&mut self, c: u8) -> bool {
        if c == 0 || c > 127 {
            return false;
        }
        self.eof_char = c;
        true
    }

    pub fn eof_seen(&self) -> bool {
        self.eof_seen
    }

    /// Lower half: called once per scan code byte off the hardware (or, in
    /// tests, directly with a synthetic byte). Returns the translated
    /// printable character, if the scan code produced one in `1..127` and
    /// there was room in the ring buffer.
    ///
    /// Mirrors `1..127`: scan code 0 translation and pure modifier keys
    /// never produce a pushed character.
    pub fn on_scancode(&mut self, code: u8) -> Option<u8> {
        if !self.hw_enabled {
            return None;
        }

        let released = code & 0x80 != 0;
        let make = code & 0x7F;

        match make {
            0x2A | 0x36 => {
                self.mods.shift = !released;
                return None;
            }
            0x1D => {
                self.mods.ctrl = !released;
                return None;
            }
            0x38 => {
                self.mods.meta = !released;
                return None;
            }
            0x3A => {
                if !released {
                    self.mods.caps = !self.mods.caps;
                }
                return None;
            }
            _ => {}
        }

        if released {
            return None;
        }

        let ascii = translate(make, &self.mods)?;
        if ascii == 0 || ascii >= 127 {
            return None;
        }

        if !self.ring.push(ascii) {
            // Ring buffer full: the spec discards both ordinary chars and
            // EOF when this happens.
            return None;
        }

        if self.echo {
            crate::logging::serial_write_byte(ascii);
        }

        Some(ascii)
    }

    /// Drains up to `dst.len()` bytes starting at `dst[progress_already]..`
    /// Stops at the first of: `dst` full, the EOF char (consumed, not
    /// copied; disables the hardware and sets the EOF flag), or `\n`
    /// (copied, counted, then stop). Used identically by the initial
    /// `sysread` attempt and by the ISR continuing a blocked read.
    pub fn drain_into(&mut self, dst: &mut [u8], progress_already: usize) -> DrainResult {
        let mut progress = progress_already;
        loop {
            if progress >= dst.len() {
                return DrainResult { transferred: progress - progress_already, satisfied: true };
            }
            let Some(c) = self.ring.pop() else {
                return DrainResult { transferred: progress - progress_already, satisfied: false };
            };
            if c == self.eof_char {
                self.eof_seen = true;
                self.hw_enabled = false;
                return DrainResult { transferred: progress - progress_already, satisfied: true };
            }
            dst[progress] = c;
            progress += 1;
            if c == b'\n' {
                return DrainResult { transferred: progress - progress_already, satisfied: true };
            }
        }
    }
}

/// Pure scan-code → ASCII translation (Scan Code Set 1, US QWERTY), kept
/// free of any ring-buffer/state-machine side effects so it's trivially
/// host-testable.
fn translate(make: u8, m: &Modifiers) -> Option<u8> {
    // (scan code, unshifted, shifted, is_letter)
    const ROWS: &[(u8, u8, u8, bool)] = &[
        (0x02, b'1', b'!', false),
        (0x03, b'2', b'@', false),
        (0x04, b'3', b'#', false),
        (0x05, b'4', b'$', false),
        (0x06, b'5', b'%', false),
        (0x07, b'6', b'^', false),
        (0x08, b'7', b'&', false),
        (0x09, b'8', b'*', false),
        (0x0A, b'9', b'(', false),
        (0x0B, b'0', b')', false),
        (0x0C, b'-', b'_', false),
        (0x0D, b'=', b'+', false),
        (0x10, b'q', b'Q', true),
        (0x11, b'w', b'W', true),
        (0x12, b'e', b'E', true),
        (0x13, b'r', b'R', true),
        (0x14, b't', b'T', true),
        (0x15, b'y', b'Y', true),
        (0x16, b'u', b'U', true),
        (0x17, b'i', b'I', true),
        (0x18, b'o', b'O', true),
        (0x19, b'p', b'P', true),
        (0x1A, b'[', b'{', false),
        (0x1B, b']', b'}', false),
        (0x1E, b'a', b'A', true),
        (0x1F, b's', b'S', true),
        (0x20, b'd', b'D', true),
        (0x21, b'f', b'F', true),
        (0x22, b'g', b'G', true),
        (0x23, b'h', b'H', true),
        (0x24, b'j', b'J', true),
        (0x25, b'k', b'K', true),
        (0x26, b'l', b'L', true),
        (0x27, b';', b':', false),
        (0x28, b'\'', b'"', false),
        (0x2C, b'z', b'Z', true),
        (0x2D, b'x', b'X', true),
        (0x2E, b'c', b'C', true),
        (0x2F, b'v', b'V', true),
        (0x30, b'b', b'B', true),
        (0x31, b'n', b'N', true),
        (0x32, b'm', b'M', true),
        (0x33, b',', b'<', false),
        (0x34, b'.', b'>', false),
        (0x35, b'/', b'?', false),
    ];

    if make == 0x39 {
        return Some(b' ');
    }
    if make == 0x1C {
        return Some(b'\n');
    }
    if make == 0x0F {
        return Some(b'\t');
    }
    if make == 0x0E {
        return Some(0x08); // backspace
    }

    for &(code, lower, upper, letter) in ROWS {
        if code == make {
            let shifted = if letter { m.shift != m.caps } else { m.shift };
            let base = if shifted { upper } else { lower };
            return Some(if m.ctrl && letter {
                base.to_ascii_uppercase() & 0x1F
            } else {
                base
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_drops_when_full() {
        let mut kbd = Keyboard::new();
        for _ in 0..CAPACITY {
            assert!(kbd.ring.push(b'x'));
        }
        assert!(kbd.ring.is_full());
        assert!(!kbd.ring.push(b'y'));
    }

    #[test]
    fn translate_lowercase_and_shifted() {
        let no_mods = Modifiers::default();
        assert_eq!(translate(0x1E, &no_mods), Some(b'a'));
        let shifted = Modifiers { shift: true, ..Default::default() };
        assert_eq!(translate(0x1E, &shifted), Some(b'A'));
        assert_eq!(translate(0x02, &no_mods), Some(b'1'));
        assert_eq!(translate(0x02, &shifted), Some(b'!'));
    }

    #[test]
    fn caps_lock_inverts_only_letters() {
        let caps = Modifiers { caps: true, ..Default::default() };
        assert_eq!(translate(0x1E, &caps), Some(b'A'));
        assert_eq!(translate(0x02, &caps), Some(b'1'));
    }

    #[test]
    fn drain_stops_at_requested_length() {
        let mut kbd = Keyboard::new();
        for c in b"abcd" {
            kbd.on_scancode_for_test_push(*c);
        }
        let mut buf = [0u8; 2];
        let r = kbd.drain_into(&mut buf, 0);
        assert_eq!(r, DrainResult { transferred: 2, satisfied: true });
        assert_eq!(&buf, b"ab");

        let mut buf2 = [0u8; 4];
        let r2 = kbd.drain_into(&mut buf2, 0);
        assert_eq!(r2, DrainResult { transferred: 2, satisfied: true });
        assert_eq!(&buf2[..2], b"cd");
    }

    #[test]
    fn drain_stops_at_eof_without_copying_it() {
        let mut kbd = Keyboard::new();
        kbd.on_scancode_for_test_push(b'a');
        kbd.on_scancode_for_test_push(kbd.eof_char);
        let mut buf = [0u8; 10];
        let r = kbd.drain_into(&mut buf, 0);
        assert_eq!(r.transferred, 1);
        assert!(r.satisfied);
        assert_eq!(buf[0], b'a');
        assert!(kbd.eof_seen());
        assert!(!kbd.hw_enabled);
    }

    #[test]
    fn drain_stops_at_newline_inclusive() {
        let mut kbd = Keyboard::new();
        for c in b"ab\n" {
            kbd.on_scancode_for_test_push(*c);
        }
        let mut buf = [0u8; 10];
        let r = kbd.drain_into(&mut buf, 0);
        assert_eq!(r.transferred, 3);
        assert_eq!(&buf[..3], b"ab\n");
    }

    #[test]
    fn drain_returns_unsatisfied_when_ring_empty() {
        let mut kbd = Keyboard::new();
        kbd.on_scancode_for_test_push(b'a');
        let mut buf = [0u8; 10];
        let r = kbd.drain_into(&mut buf, 0);
        assert_eq!(r, DrainResult { transferred: 1, satisfied: false });
    }

    impl Keyboard {
        /// Test helper: push a raw byte straight into the ring buffer,
        /// bypassing scan-code translation.
        fn on_scancode_for_test_push(&mut self, c: u8) {
            self.ring.push(c);
        }
    }
}
