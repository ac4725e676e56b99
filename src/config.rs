//! Fixed capacities and tuning constants.
//!
//! The kernel never allocates; every bound below sizes a `static` array.
//! There is no runtime-parsed configuration format — on a microcontroller
//! with no filesystem, "configuration" means compile-time constants.

/// Maximum number of threads alive at once.
pub const MAX_THREADS: usize = 16;

/// Maximum number of periodic handlers.
pub const MAX_PTHREADS: usize = 6;

/// Number of IPC FIFO instances.
pub const MAX_NUMBER_OF_FIFOS: usize = 5;

/// Capacity, in 32-bit values, of a single IPC FIFO.
pub const FIFO_SIZE: usize = 16;

/// Cap on a thread's bounded name field, in bytes.
pub const MAX_NAME_LEN: usize = 16;

/// Kernel's own interrupt priority band. Aperiodic handlers must be
/// registered strictly above this (numerically lower, i.e. `<= 6`) so user
/// IRQs preempt the scheduler and tick handlers.
pub const OSINT_PRIORITY: u8 = 7;

/// Inclusive upper bound on a registrable hardware IRQ number.
pub const MAX_APERIODIC_IRQN: i32 = 155;

/// Inclusive upper bound on a registrable aperiodic handler's priority.
pub const MAX_APERIODIC_PRIORITY: u8 = 6;

/// System tick period, in milliseconds. The tick service runs at 1 kHz.
pub const TICK_PERIOD_MS: u32 = 1;

/// Per-thread stack size, in 32-bit words.
pub const STACK_WORDS: usize = 128;
