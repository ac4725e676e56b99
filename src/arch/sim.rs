//! Host stand-in for architecture support.
//!
//! No real hardware registers, no asm, no interrupts. `PendSV`/`SysTick`
//! aren't separate entry points here; tests instead call
//! `crate::kernel::Kernel::tick()` and the scheduler directly, and use
//! this module's `pend_context_switch`/`take_pending_context_switch` pair
//! to observe whether a reschedule was requested, which on real hardware
//! would be the `PendSV`-pending bit.

use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(any(feature = "klog-semihosting", feature = "klog-itm")))]
macro_rules! klog {
    ($s:expr) => { };
    ($s:expr, $($tt:tt)*) => { };
}

#[cfg(any(feature = "klog-semihosting", feature = "klog-itm"))]
macro_rules! klog {
    ($s:expr) => { std::eprintln!($s); };
    ($s:expr, $($tt:tt)*) => { std::eprintln!($s, $($tt)*); };
}

macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("kernel assertion failed: {}", stringify!($cond));
        }
    };
}

macro_rules! uassert_eq {
    ($a:expr, $b:expr) => {
        if !($a == $b) {
            panic!("kernel assertion failed: {} == {}", stringify!($a), stringify!($b));
        }
    };
}

static PENDING_CONTEXT_SWITCH: AtomicBool = AtomicBool::new(false);

/// Stand-in for setting the `PendSV`-pending bit.
pub fn pend_context_switch() {
    PENDING_CONTEXT_SWITCH.store(true, Ordering::SeqCst);
}

/// Consumes the pending-context-switch flag, returning whether one was
/// requested since the last call. Tests use this where real firmware
/// would simply let `PendSV` fire.
pub fn take_pending_context_switch() -> bool {
    PENDING_CONTEXT_SWITCH.swap(false, Ordering::SeqCst)
}

/// Forges an initial "stack pointer" for a never-run thread. There's no
/// real stack or register frame on the host, so this just packs the entry
/// function pointer into the returned token; `Scheduler` never dereferences
/// it outside the real arm_m backend.
pub fn init_stack(_stack_top: *mut u32, entry: extern "C" fn()) -> u32 {
    entry as usize as u32
}

pub fn disable_irq(_n: u32) {}
pub fn enable_irq(_n: u32) {}
pub fn set_irq_priority(_n: u32, _priority: u8) {}

/// No real tick timer on the host; tests drive `Kernel::tick()` directly.
pub unsafe fn configure_and_start_tick(_cycles_per_tick: u32) {}
