//! Stable syscall error codes.
//!
//! These are the negative `isize`/`i32` values documented in the syscall
//! surface. Internal kernel routines never return these directly; they
//! return a typed error ([`IpcError`], [`SignalError`], [`DeviceError`])
//! which is converted to one of these codes only at the syscall boundary.

pub const E_OK: i32 = 0;

/// Internal sentinel a blocking syscall handler returns to the dispatcher
/// to mean "caller was installed on a blocked queue, do not set
/// `result_code` yet" — never visible to user code, which instead observes
/// whatever `result_code` holds at the caller's next resumption. Deliberately
/// outside the real error-code range (§6 codes never go below -666) so a
/// bare integer compare against it can never collide with a documented
/// syscall return value.
pub const BLOCK_PENDING: i32 = i32::MIN;

pub const E_GENERIC: i32 = -1;
pub const E_NO_SUCH_TARGET: i32 = -2;
pub const E_SELF_TARGET: i32 = -3;
pub const E_BAD_NUM_PTR: i32 = -4;
pub const E_BAD_FROM_PTR: i32 = -5;
pub const E_ONLY_PROCESS: i32 = -10;
pub const E_OTHER: i32 = -100;
pub const E_SIGNAL_INTERRUPTED: i32 = -666;

pub const E_BAD_SIGNAL_NUM: i32 = -1;
pub const E_BAD_HANDLER_PTR: i32 = -2;
pub const E_BAD_OLD_HANDLER_PTR: i32 = -3;

pub const E_KILL_NO_SUCH_TARGET: i32 = -514;
pub const E_KILL_BAD_SIGNAL_NUM: i32 = -583;

pub const E_ADDR_IN_HOLE: i32 = -1;
pub const E_ADDR_PAST_MAX: i32 = -2;

/// Failures from the IPC rendezvous (`send`/`recv`/`recv-any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    SelfTarget,
    NoSuchTarget,
    ReceiverDied,
    OnlyProcess,
    SignalInterrupted,
    Other,
}

impl IpcError {
    pub const fn to_code(self) -> i32 {
        match self {
            IpcError::ReceiverDied => E_GENERIC,
            IpcError::NoSuchTarget => E_NO_SUCH_TARGET,
            IpcError::SelfTarget => E_SELF_TARGET,
            IpcError::OnlyProcess => E_ONLY_PROCESS,
            IpcError::Other => E_OTHER,
            IpcError::SignalInterrupted => E_SIGNAL_INTERRUPTED,
        }
    }
}

/// Failures from `sighandler`/`kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    BadSignalNumber,
    BadHandlerPtr,
    BadOldHandlerPtr,
    KillNoSuchTarget,
    KillBadSignalNumber,
}

impl SignalError {
    pub const fn to_code(self) -> i32 {
        match self {
            SignalError::BadSignalNumber => E_BAD_SIGNAL_NUM,
            SignalError::BadHandlerPtr => E_BAD_HANDLER_PTR,
            SignalError::BadOldHandlerPtr => E_BAD_OLD_HANDLER_PTR,
            SignalError::KillNoSuchTarget => E_KILL_NO_SUCH_TARGET,
            SignalError::KillBadSignalNumber => E_KILL_BAD_SIGNAL_NUM,
        }
    }
}

/// Failures from the device-independent interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    NoFreeFd,
    BadFd,
    NoSuchDevice,
    AlreadyOpen,
    Unsupported,
}

impl DeviceError {
    pub const fn to_code(self) -> i32 {
        match self {
            DeviceError::NoFreeFd => E_GENERIC,
            DeviceError::BadFd => E_GENERIC,
            DeviceError::NoSuchDevice => E_GENERIC,
            DeviceError::AlreadyOpen => E_GENERIC,
            DeviceError::Unsupported => E_GENERIC,
        }
    }
}
