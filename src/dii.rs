//! Device-independent interface, §4.6, and the one concrete device it
//! drives (the keyboard, §4.7).
//!
//! The spec's `{init, open, close, read, write, ioctl}` function-pointer
//! devsw is rendered as concrete dispatch into the single `Keyboard`
//! instance rather than a trait object table: there is exactly one kind of
//! device in this kernel, and the teacher's own style favors concrete
//! dispatch over heap-allocated trait objects in a `no_std`, alloc-free
//! core (Design Note, §4.6 rendering).

use crate::error::{DeviceError, BLOCK_PENDING};
use crate::kernel::Kernel;

pub const MAJOR_KEYBOARD: u8 = 0;

pub struct DeviceEntry {
    pub major: u8,
    pub minor: u8,
    pub name: &'static str,
}

/// Fixed 2-slot device table: both entries are the same hardware keyboard,
/// one per minor (no echo / echo).
pub const DEVICE_TABLE: [DeviceEntry; 2] = [
    DeviceEntry { major: MAJOR_KEYBOARD, minor: 0, name: "kbd0" },
    DeviceEntry { major: MAJOR_KEYBOARD, minor: 1, name: "kbd1" },
];

impl Kernel {
    /// `open(dev)`: `dev` indexes [`DEVICE_TABLE`]. Returns the new fd
    /// (0..3) or a negative code.
    pub fn sys_open(&mut self, caller: usize, dev: usize) -> i32 {
        let Some(entry) = DEVICE_TABLE.get(dev) else {
            return DeviceError::NoSuchDevice.to_code();
        };
        let fd = match self.pcbs[caller].fd_table.iter().position(Option::is_none) {
            Some(fd) => fd,
            None => return DeviceError::NoFreeFd.to_code(),
        };
        if self.keyboard.open_minor().is_some() {
            return DeviceError::AlreadyOpen.to_code();
        }

        self.keyboard.open(entry.minor, entry.minor == 1);
        self.pcbs[caller].fd_table[fd] = Some(dev);
        log::info!("open: pid {} opened {} as fd {}", self.pcbs[caller].pid, entry.name, fd);
        fd as i32
    }

    pub fn sys_close(&mut self, caller: usize, fd: usize) -> i32 {
        if fd >= 4 || self.pcbs[caller].fd_table[fd].is_none() {
            return DeviceError::BadFd.to_code();
        }
        self.pcbs[caller].fd_table[fd] = None;
        self.keyboard.close();
        log::info!("close: pid {} closed fd {}", self.pcbs[caller].pid, fd);
        0
    }

    /// `write(fd, buf, n)`: the keyboard has no write path, always -1.
    pub fn sys_write(&mut self, caller: usize, fd: usize, _buf: usize, _n: usize) -> i32 {
        if fd >= 4 || self.pcbs[caller].fd_table[fd].is_none() {
            return DeviceError::BadFd.to_code();
        }
        -1
    }

    /// `read(fd, buf, n)`. Returns bytes transferred, 0 on EOF, or
    /// [`BLOCK_PENDING`] once the caller has been installed as the
    /// keyboard's blocked reader.
    pub fn sys_read(&mut self, caller: usize, fd: usize, buf: usize, n: usize) -> i32 {
        if fd >= 4 || self.pcbs[caller].fd_table[fd].is_none() {
            return DeviceError::BadFd.to_code();
        }
        if self.keyboard.eof_seen() {
            return 0;
        }

        // SAFETY: `buf`/`n` were validated by the syscall layer against the
        // hole/kernel-memory/max-address rules before this handler runs.
        let dst = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, n) };
        let r = self.keyboard.drain_into(dst, 0);
        if r.satisfied {
            return r.transferred as i32;
        }

        let pcb = &mut self.pcbs[caller];
        pcb.read_user_buf = buf;
        pcb.read_user_len = n;
        pcb.read_progress = r.transferred;
        pcb.read_fd = fd;
        self.keyboard.blocked_reader = Some(caller);
        self.block(caller, crate::pcb::BlockKind::Read);
        BLOCK_PENDING
    }

    pub fn sys_ioctl(&mut self, caller: usize, fd: usize, cmd: usize, arg: usize) -> i32 {
        if fd >= 4 || self.pcbs[caller].fd_table[fd].is_none() {
            return DeviceError::BadFd.to_code();
        }
        match cmd {
            crate::kbd::IOCTL_CHANGE_EOF => {
                if self.keyboard.set_eof_char(arg as u8) {
                    0
                } else {
                    -1
                }
            }
            crate::kbd::IOCTL_ECHO_OFF => {
                self.keyboard.set_echo(false);
                0
            }
            crate::kbd::IOCTL_ECHO_ON => {
                self.keyboard.set_echo(true);
                0
            }
            _ => -1,
        }
    }

    /// Keyboard hardware ISR (lower half): translate one scan code and, if
    /// it produced a buffered char, continue any blocked reader.
    pub fn keyboard_isr(&mut self, scancode: u8) {
        if self.keyboard.on_scancode(scancode).is_some() {
            if let Some(reader) = self.keyboard.blocked_reader {
                self.continue_blocked_read(reader);
            }
        }
    }

    fn continue_blocked_read(&mut self, slot: usize) {
        let pcb = &self.pcbs[slot];
        let (buf, len, progress) = (pcb.read_user_buf, pcb.read_user_len, pcb.read_progress);

        // SAFETY: same user buffer validated when the read was first issued.
        let dst = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, len) };
        let r = self.keyboard.drain_into(dst, progress);
        let total = progress + r.transferred;
        self.pcbs[slot].read_progress = total;

        if r.satisfied {
            self.keyboard.blocked_reader = None;
            self.pcbs[slot].result_code = total as i32;
            self.ready(slot);
            log::debug!("read: pid {} satisfied with {} bytes", self.pcbs[slot].pid, total);
        }
    }
}
