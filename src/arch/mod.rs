//! Architecture abstraction.
//!
//! `arm_m` is the real backend, compiled only for `target_arch = "arm"`.
//! `sim` is a host stand-in used everywhere else (i.e. under `cargo test`)
//! so the scheduler, semaphore, FIFO and tick logic can be exercised
//! without any embedded hardware.

#[cfg(target_arch = "arm")]
#[macro_use]
pub mod arm_m;
#[cfg(target_arch = "arm")]
pub use arm_m::*;

#[cfg(not(target_arch = "arm"))]
#[macro_use]
pub mod sim;
#[cfg(not(target_arch = "arm"))]
pub use sim::*;
