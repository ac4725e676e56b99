//! Error taxonomy.
//!
//! Errors are plain negative integer codes at the kernel's external
//! boundary (see the API surface in the top-level docs), but internally
//! we keep them as a typed enum so call sites match exhaustively instead of
//! comparing magic numbers. `From`/`as i32` convert back to the raw code a
//! C caller would see.

/// Kernel entry-point error codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum KernelError {
    ThreadLimitReached = -1,
    NoThreadsScheduled = -2,
    ThreadsIncorrectlyAlive = -3,
    ThreadDoesNotExist = -4,
    CannotKillLastThread = -5,
    IrqnInvalid = -6,
    HwiPriorityInvalid = -7,
}

impl KernelError {
    pub const NO_ERROR: i32 = 0;

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<KernelError> for i32 {
    fn from(e: KernelError) -> i32 {
        e.code()
    }
}

/// IPC FIFO error codes. Distinct from `KernelError` because the FIFO's
/// error taxonomy (`SUCCESS`/`FIFO_EMPTY`/`FIFO_FULL`) predates, and is
/// numbered independently of, the thread/scheduler taxonomy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum FifoError {
    IndexOutOfBounds = -1,
    Empty = -2,
    Full = -3,
}

impl FifoError {
    pub const SUCCESS: i32 = 0;

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<FifoError> for i32 {
    fn from(e: FifoError) -> i32 {
        e.code()
    }
}
