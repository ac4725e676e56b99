//! Architecture support for ARMv7-M.
//!
//! # Interrupt structure
//!
//! This kernel uses exactly three interrupt handlers of its own:
//!
//! - `SysTick` maintains the 1 kHz timebase: it wakes sleeping threads,
//!   dispatches periodic handlers, and pends a context switch if anything
//!   became eligible.
//! - `PendSV` performs the actual context switch. It's a separate,
//!   lowest-priority interrupt rather than doing the switch inline in
//!   `SysTick` (or any other ISR) so that a context switch never happens
//!   mid-ISR: `PendSV` only runs once every higher-priority handler,
//!   including nested hardware IRQs, has finished and returned.
//! - `SVCall` resumes the very first thread. It exists only because the
//!   processor itself has to be the one popping a forged stack frame back
//!   into `r0-r3, r12, lr, pc, xpsr` -- and the only way to ask the
//!   processor to do that outside of a real interrupt is to take one. A
//!   `bx` from ordinary code can't reload `pc`/`xpsr` from the stack the
//!   way an exception return does.
//!
//! All three run at the same, lowest hardware priority, so that
//! user-registered aperiodic handlers (see `crate::irq`) always preempt the
//! scheduler itself, per the aperiodic-event contract.
//!
//! # Forged stack frames
//!
//! A thread that has never run has no real register state to restore. Its
//! initial stack is instead forged to *look like* the state a real context
//! switch would have saved: the hardware-stacked portion (`r0-r3`, `r12`,
//! `lr`, `pc`, `xpsr`) sits above a manually "pushed" portion (`r4-r11`,
//! `lr`), exactly where `PendSV`'s epilogue expects to find it. Popping that
//! forged frame -- the software half by `ldmia`, the hardware half by the
//! processor's own exception return -- is indistinguishable, to the
//! processor, from resuming a thread that was legitimately context-switched
//! out.

use core::ptr::NonNull;

/// Log things from kernel context. Implementation is architecture- and
/// feature-specific: ITM by default, semihosting if selected, or nothing at
/// all in a build with neither klog feature (e.g. host tests).
#[cfg(not(any(feature = "klog-semihosting", feature = "klog-itm")))]
macro_rules! klog {
    ($s:expr) => { };
    ($s:expr, $($tt:tt)*) => { };
}

#[cfg(feature = "klog-itm")]
macro_rules! klog {
    ($s:expr) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::ptr()).stim[0];
            cortex_m::iprintln!(stim, $s);
        }
    };
    ($s:expr, $($tt:tt)*) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::ptr()).stim[0];
            cortex_m::iprintln!(stim, $s, $($tt)*);
        }
    };
}

#[cfg(feature = "klog-semihosting")]
macro_rules! klog {
    ($s:expr) => { let _ = cortex_m_semihosting::hprintln!($s); };
    ($s:expr, $($tt:tt)*) => { let _ = cortex_m_semihosting::hprintln!($s, $($tt)*); };
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

use crate::sched::Tcb;

/// The currently-running thread, as seen by the naked asm handlers below.
/// We need a global here because the handlers have no spare register to
/// carry it in, and it must be updated between "save old" and "restore
/// new" inside `pendsv_entry`.
#[no_mangle]
static mut CURRENT_TCB_PTR: Option<NonNull<Tcb>> = None;

/// Records `tcb` as the thread `PendSV` should resume into.
///
/// # Safety
/// `tcb` must remain valid (i.e. point into the live TCB array) until the
/// next call to this function.
pub unsafe fn set_current_tcb(tcb: &mut Tcb) {
    CURRENT_TCB_PTR = Some(NonNull::from(tcb));
}

/// Hardware-stacked exception frame: what the processor itself pushes (and
/// later pops) on exception entry/exit. Floating-point context is a
/// non-goal, so unlike a full FPU-aware port there's no extended frame.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct HardwareFrame {
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Software-saved portion: what `PendSV`'s prologue pushes by hand before
/// the hardware frame (lower address, since the stack grows down and this
/// gets pushed *after* the hardware already stacked its half). `lr` here is
/// the *exception's* link register -- the `EXC_RETURN` value in effect for
/// this thread -- not the thread's own `lr`, which lives in the hardware
/// frame below. `PendSV` must save and restore it alongside `r4-r11`: it's
/// clobbered by the `bl` to `pendsv_entry`, and the wrong value there means
/// `bx lr` returns into the wrong mode/stack instead of thread mode on PSP.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct SoftwareFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    lr: u32,
}

/// Debug-pattern register values a forged frame is seeded with, purely so
/// a debugger stopped mid-switch can tell at a glance which registers have
/// been restored from a thread that has never actually run. Any value
/// would do; these specific ones (`r0=0x00000000` is the entry argument,
/// `rN=0x0N0N0N0N` otherwise) just make each register's origin obvious in
/// a register dump.
const INITIAL_THUMB_BIT: u32 = 1 << 24;
const INITIAL_LR_TRAP: u32 = 0xFFFF_FFFD;
/// `EXC_RETURN`: thread mode, PSP, no floating-point extended frame.
pub const EXC_RETURN: u32 = 0xFFFF_FFFD;

/// Forges an initial stack frame for a thread that has never run, so that
/// restoring it -- via `SVCall` the first time, the normal `PendSV`
/// epilogue every time after -- resumes execution at `entry` with the
/// Thumb bit set and harmless argument registers.
///
/// `stack_top` must point one-past-the-end of the thread's stack (its
/// highest address plus one) and must be 8-byte aligned, per the
/// AAPCS/EABI stack alignment requirement at a public interface boundary
/// such as an exception entry.
///
/// Returns the stack pointer value to store in the new `Tcb`.
pub fn init_stack(stack_top: *mut u32, entry: extern "C" fn()) -> u32 {
    uassert!((stack_top as u32) & 0x7 == 0);

    let frame_words =
        core::mem::size_of::<HardwareFrame>() + core::mem::size_of::<SoftwareFrame>();
    let base = (stack_top as usize - frame_words) as *mut u8;
    uassert!((base as u32) & 0x7 == 0);

    let sw = base as *mut SoftwareFrame;
    let hw = unsafe { base.add(core::mem::size_of::<SoftwareFrame>()) } as *mut HardwareFrame;

    unsafe {
        *sw = SoftwareFrame {
            r4: 0x0404_0404,
            r5: 0x0505_0505,
            r6: 0x0606_0606,
            r7: 0x0707_0707,
            r8: 0x0808_0808,
            r9: 0x0909_0909,
            r10: 0x0a0a_0a0a,
            r11: 0x0b0b_0b0b,
            lr: EXC_RETURN,
        };
        *hw = HardwareFrame {
            r0: 0x0000_0000,
            r1: 0x0101_0101,
            r2: 0x0202_0202,
            r3: 0x0303_0303,
            r12: 0x0c0c_0c0c,
            lr: INITIAL_LR_TRAP,
            pc: (entry as usize as u32) | 1, // Thumb bit
            xpsr: INITIAL_THUMB_BIT,
        };
    }

    base as u32
}

/// Sets up `SVCall`/`PendSV`/`SysTick` NVIC priority (all at the lowest
/// possible level, so user IRQs always preempt them) and starts the tick
/// timer. Called once from `launch()` before the first thread is resumed.
///
/// # Safety
/// Must be called exactly once, before interrupts are enabled, from
/// `launch()`.
pub unsafe fn configure_and_start_tick(cycles_per_tick: u32) {
    let scb = &*cortex_m::peripheral::SCB::ptr();
    // SVCall, PendSV and SysTick all at the lowest configurable priority.
    scb.shpr[7].write(0xFF);
    scb.shpr[10].write(0xFF);
    scb.shpr[11].write(0xFF);

    let syst = &*cortex_m::peripheral::SYST::ptr();
    syst.rvr.write(cycles_per_tick - 1);
    syst.cvr.write(0);
    syst.csr.modify(|v| v | 0b111); // enable counter + interrupt, core clock
}

/// Resumes the first thread. Never returns.
///
/// There's no real register state to "resume" for a thread that has never
/// run -- only the frame `init_stack` forged onto its stack. The only way
/// to get the processor to pop a forged hardware frame into `pc`/`xpsr` is
/// a genuine exception return, so this just points `CURRENT_TCB_PTR` at the
/// target thread and takes an `SVC`; `SVCall` below does the rest.
///
/// # Safety
/// Must be called exactly once, after `configure_and_start_tick` and after
/// `set_current_tcb` has recorded the first thread to run.
pub unsafe fn start_first_task(tcb: &mut Tcb) -> ! {
    set_current_tcb(tcb);

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            core::arch::asm!("svc 0", options(noreturn));
        } else {
            unreachable!("start_first_task is only callable on target_arch = \"arm\"");
        }
    }
}

/// Resumes `CURRENT_TCB_PTR` for the very first time. Pops the forged
/// software frame by hand, points `PSP` at the forged hardware frame below
/// it, and forces a real exception return: the processor pops
/// `r0-r3, r12, lr, pc, xpsr` off `PSP` itself, landing in thread mode at
/// the thread's entry point with the Thumb bit set. Never runs again after
/// the first call -- every later switch goes through `PendSV`.
#[allow(non_snake_case)]
#[naked]
#[no_mangle]
#[cfg(target_arch = "arm")]
pub unsafe extern "C" fn SVCall() {
    core::arch::asm!(
        "ldr r0, =CURRENT_TCB_PTR",
        "ldr r0, [r0]",        // r0 = CURRENT_TCB_PTR (a *mut Tcb)
        "ldr r0, [r0]",        // r0 = (*tcb).stack_pointer, offset 0

        "ldmia r0!, {{r4-r11, lr}}", // pop the forged software frame

        "msr PSP, r0",         // PSP now points at the forged hardware frame
        "isb",
        "ldr lr, =0xFFFFFFFD", // EXC_RETURN: thread mode, PSP, no FP frame
        "bx lr",               // hardware pops {{r0-r3, r12, lr, pc, xpsr}} off PSP
        options(noreturn),
    );
}

#[allow(non_snake_case)]
#[naked]
#[no_mangle]
#[cfg(target_arch = "arm")]
pub unsafe extern "C" fn PendSV() {
    core::arch::asm!(
        "mrs r0, PSP",
        "stmdb r0!, {{r4-r11, lr}}",
        "ldr r1, =CURRENT_TCB_PTR",
        "ldr r2, [r1]",
        "str r0, [r2]",        // CURRENT_TCB_PTR->stack_pointer = r0

        "bl pendsv_entry",     // clobbers lr; returns the new Tcb* in r0

        "ldr r0, [r0]",        // new_tcb.stack_pointer
        "ldmia r0!, {{r4-r11, lr}}",
        "msr PSP, r0",
        "bx lr",
        options(noreturn),
    );
}

/// Rust side of `PendSV`: runs the scheduler and records the chosen
/// thread. Returns a pointer to the chosen `Tcb` (whose first field is its
/// `stack_pointer`) so the naked prologue above can reload it cheaply.
#[no_mangle]
unsafe extern "C" fn pendsv_entry() -> *mut Tcb {
    let next = crate::kernel::with_kernel(|k| {
        k.scheduler.run_once();
        k.scheduler.current_mut() as *mut Tcb
    });
    CURRENT_TCB_PTR = Some(NonNull::new_unchecked(next));
    next
}

#[allow(non_snake_case)]
#[no_mangle]
#[cfg(target_arch = "arm")]
pub unsafe extern "C" fn SysTick() {
    // `Kernel::tick` pends the context switch itself, unconditionally,
    // per the tick service contract -- every tick requests a reschedule,
    // not just ticks that changed something.
    crate::kernel::with_kernel(|k| k.tick());
}

/// Sets the bit that pends a `PendSV` interrupt. `PendSV` runs once the
/// current ISR (and anything it's nested inside) returns.
pub fn pend_context_switch() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            cortex_m::peripheral::SCB::set_pendsv();
        } else {
            crate::arch::sim::pend_context_switch();
        }
    }
}

pub fn disable_irq(n: u32) {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            unsafe {
                let nvic = &*cortex_m::peripheral::NVIC::ptr();
                nvic.icer[(n / 32) as usize].write(1 << (n % 32));
            }
        } else {
            let _ = n;
        }
    }
}

pub fn enable_irq(n: u32) {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            unsafe {
                let nvic = &*cortex_m::peripheral::NVIC::ptr();
                nvic.iser[(n / 32) as usize].write(1 << (n % 32));
            }
        } else {
            let _ = n;
        }
    }
}

pub fn set_irq_priority(n: u32, priority: u8) {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            unsafe {
                let nvic = &*cortex_m::peripheral::NVIC::ptr();
                nvic.ipr[n as usize].write(priority);
            }
        } else {
            let _ = (n, priority);
        }
    }
}
