//! RTOS kernel core.
//!
//! A preemptive, priority-scheduled kernel for a single ARMv7-M core. One
//! tick interrupt drives the timebase, sleep wake-up and periodic dispatch;
//! one pendable interrupt drives context switches; everything else
//! (semaphores, IPC FIFOs, aperiodic event registration) is built on top.
//!
//! # Algorithm naivety
//!
//! This kernel uses deliberately naive algorithms: linear ring walks instead
//! of heaps or bitmaps, a fixed small thread count (tens, not thousands).
//! The assumption is that a scheduler invoked thousands of times a second on
//! a handful of threads doesn't need to be clever, just correct and easy to
//! read under a debugger.
//!
//! This crate is `no_std` except when built for a non-ARM (i.e. host)
//! target, where `arch::sim` stands in for real hardware so the scheduler,
//! semaphore, FIFO and tick logic can be exercised under `cargo test` --
//! and under a plain host `cargo check`/`cargo build`, which compiles the
//! same `sim` backend without running any tests. `sim`'s logging needs
//! `std`, so `std` is linked back in for exactly that target family.

#![cfg_attr(not(test), no_std)]

#[cfg(not(target_arch = "arm"))]
extern crate std;

#[macro_use]
pub mod arch;

pub mod config;
pub mod critical;
pub mod err;
pub mod fifo;
pub mod irq;
pub mod kernel;
pub mod periodic;
pub mod sched;
pub mod sem;
pub mod time;

pub use err::KernelError;
pub use kernel::Kernel;
