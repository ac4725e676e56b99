//! The kernel singleton: owns the thread ring, the periodic ring, the
//! aperiodic handler table, and the system tick count, and ties them
//! together into the external API surface.
//!
//! Global mutable kernel state is a single object, created once by
//! `init()` and reached everywhere else -- including from the `PendSV`
//! and `SysTick` ISRs -- only through `with_kernel`, which proves mutual
//! exclusion the same way any other kernel mutation does: by holding the
//! critical section for the duration of the closure.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::err::{FifoError, KernelError};
use crate::fifo::FifoTable;
use crate::irq::AperiodicTable;
use crate::periodic::PeriodicRing;
use crate::sched::Scheduler;
use crate::sem::Semaphore;
use crate::time::Ticks;

static KERNEL: Mutex<RefCell<Option<Kernel>>> = Mutex::new(RefCell::new(None));

/// Kernel state. Construct with `Kernel::new`, install it as the global
/// singleton with `init()`, or (in tests) keep an instance locally and
/// call its methods directly without ever touching the singleton.
pub struct Kernel {
    pub(crate) scheduler: Scheduler,
    periodic: PeriodicRing,
    aperiodic: AperiodicTable,
    fifos: FifoTable,
    system_time: Ticks,
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            scheduler: Scheduler::new(),
            periodic: PeriodicRing::new(),
            aperiodic: AperiodicTable::new(),
            fifos: FifoTable::new(),
            system_time: Ticks::ZERO,
        }
    }

    pub fn add_thread(
        &mut self,
        entry: extern "C" fn(),
        priority: u8,
        name: &str,
        thread_id: u8,
    ) -> Result<(), KernelError> {
        self.scheduler.add_thread(entry, priority, name, thread_id)
    }

    pub fn kill_thread(&mut self, id: u8) -> Result<(), KernelError> {
        self.scheduler.kill_thread(id)
    }

    /// See `kill_self()` (the free function) for the context-switch half
    /// of this operation; this is the ring-mutation half only.
    pub fn kill_self(&mut self) -> Result<(), KernelError> {
        self.scheduler.kill_self()
    }

    pub fn add_aperiodic_event(
        &mut self,
        handler: extern "C" fn(),
        priority: u8,
        irq_number: i32,
    ) -> Result<(), KernelError> {
        self.aperiodic
            .add_aperiodic_event(handler, priority, irq_number)
    }

    pub fn add_periodic_event(
        &mut self,
        handler: extern "C" fn(),
        period: u32,
        execution: u32,
    ) -> Result<(), KernelError> {
        self.periodic
            .add_periodic_event(handler, period, execution, self.system_time)
    }

    pub fn get_thread_id(&self) -> u8 {
        self.scheduler.current().thread_id
    }

    pub fn get_number_of_threads(&self) -> usize {
        self.scheduler.num_threads()
    }

    pub fn get_sys_time(&self) -> Ticks {
        self.system_time
    }

    pub fn init_fifo(&self, index: usize) -> Result<(), FifoError> {
        self.fifos.init_fifo(index)
    }

    pub fn read_fifo(&self, index: usize) -> Result<i32, FifoError> {
        self.fifos.read_fifo(index)
    }

    pub fn write_fifo(&self, index: usize, data: i32) -> Result<(), FifoError> {
        self.fifos.write_fifo(index, data)
    }

    /// Runs one tick's worth of timebase work: wakes sleepers whose
    /// `sleep_until` matches the (pre-increment) current tick, dispatches
    /// due periodic handlers, advances `system_time`, and unconditionally
    /// requests a context switch.
    pub(crate) fn tick(&mut self) {
        self.scheduler.wake_sleepers(self.system_time);
        self.periodic.dispatch_due(self.system_time);
        self.system_time = self.system_time + 1;
        crate::arch::pend_context_switch();
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: `Kernel` embeds raw `*const Semaphore` pointers (`Tcb::blocked_on`),
// which aren't `Send` by default. There's only ever one `Kernel`, reachable
// only through `with_kernel`'s critical section, so nothing about moving it
// across the (single, and on this target only notional) execution context
// boundary is actually unsound.
unsafe impl Send for Kernel {}

/// Installs a freshly constructed `Kernel` as the global singleton. Must
/// be called exactly once, before any other kernel operation (including
/// `launch`).
pub fn init() {
    critical_section::with(|cs| {
        KERNEL.borrow(cs).replace(Some(Kernel::new()));
    });
}

/// Runs `f` with exclusive access to the kernel singleton, with interrupts
/// disabled for the duration. This is the only way kernel state is ever
/// touched once `init()` has run, including from `PendSV`/`SysTick`.
///
/// # Panics
/// Panics if called before `init()`.
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    critical_section::with(|cs| {
        let mut slot = KERNEL.borrow_ref_mut(cs);
        let kernel = slot
            .as_mut()
            .expect("Kernel::init() must run before any kernel operation");
        f(kernel)
    })
}

/// Finalizes the scheduler (making the first-added thread
/// `currently_running`), starts the tick timer, and resumes that thread.
/// `cycles_per_tick` is supplied by board bring-up code (clock
/// configuration is out of this kernel's scope) and should be the core
/// clock frequency divided by the desired tick rate (1 kHz per the tick
/// service contract).
///
/// On the real target this never returns on success: the final step jumps
/// to the first thread's entry point via a forged exception return. It
/// only returns here, with an error, if the scheduler has no threads to
/// launch. Host test builds always return, since there's no real
/// exception-return trampoline to jump through.
pub fn launch(cycles_per_tick: u32) -> Result<(), KernelError> {
    with_kernel(|k| k.scheduler.launch())?;

    unsafe {
        crate::arch::configure_and_start_tick(cycles_per_tick);
    }

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            unsafe {
                let tcb_ptr = with_kernel(|k| k.scheduler.current_mut() as *mut crate::sched::Tcb);
                crate::arch::start_first_task(&mut *tcb_ptr)
            }
        } else {
            Ok(())
        }
    }
}

pub fn add_thread(
    entry: extern "C" fn(),
    priority: u8,
    name: &str,
    thread_id: u8,
) -> Result<(), KernelError> {
    with_kernel(|k| k.add_thread(entry, priority, name, thread_id))
}

pub fn kill_thread(id: u8) -> Result<(), KernelError> {
    with_kernel(|k| k.kill_thread(id))
}

/// Per the thread lifecycle contract, a real caller never observes this
/// return: a context switch is pending by the time it would, and this
/// thread no longer exists by the time it would run again.
pub fn kill_self() -> Result<(), KernelError> {
    let result = with_kernel(|k| k.kill_self());
    if result.is_ok() {
        crate::arch::pend_context_switch();
    }
    result
}

pub fn sleep(duration_ms: u32) {
    with_kernel(|k| {
        let now = k.get_sys_time();
        k.scheduler.sleep(now, duration_ms);
    });
    crate::arch::pend_context_switch();
}

pub fn add_aperiodic_event(
    handler: extern "C" fn(),
    priority: u8,
    irq_number: i32,
) -> Result<(), KernelError> {
    with_kernel(|k| k.add_aperiodic_event(handler, priority, irq_number))
}

pub fn add_periodic_event(
    handler: extern "C" fn(),
    period: u32,
    execution: u32,
) -> Result<(), KernelError> {
    with_kernel(|k| k.add_periodic_event(handler, period, execution))
}

pub fn get_thread_id() -> u8 {
    with_kernel(|k| k.get_thread_id())
}

pub fn get_number_of_threads() -> usize {
    with_kernel(|k| k.get_number_of_threads())
}

pub fn get_sys_time() -> Ticks {
    with_kernel(|k| k.get_sys_time())
}

pub fn init_semaphore(sem: &Semaphore, value: i32) {
    sem.init(value);
}

/// `wait_semaphore`: decrements `sem` under critical section; if it went
/// negative, records the calling thread as blocked and, once the critical
/// section ends, pends a context switch.
pub fn wait_semaphore(sem: &Semaphore) {
    let became_blocked = with_kernel(|k| k.scheduler.wait_semaphore(sem));
    if became_blocked {
        crate::arch::pend_context_switch();
    }
}

/// `signal_semaphore`: increments `sem` under critical section and clears
/// one waiter's `blocked_on` if one existed. Deliberately does not pend a
/// context switch -- see the semaphore design note -- so the woken thread
/// only becomes `currently_running` at the next scheduler invocation.
pub fn signal_semaphore(sem: &Semaphore) {
    with_kernel(|k| {
        k.scheduler.signal_semaphore(sem);
    });
}

pub fn init_fifo(index: usize) -> Result<(), FifoError> {
    with_kernel(|k| k.init_fifo(index))
}

pub fn read_fifo(index: usize) -> Result<i32, FifoError> {
    with_kernel(|k| k.read_fifo(index))
}

pub fn write_fifo(index: usize, data: i32) -> Result<(), FifoError> {
    with_kernel(|k| k.write_fifo(index, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() {}

    #[test]
    fn semaphore_blocking_scenario() {
        // Scenario 4: s=0. X waits, becomes blocked and skipped by the
        // scheduler. Y signals; after the next reschedule X is runnable
        // again and s.value == 0.
        let mut k = Kernel::new();
        k.add_thread(dummy_entry, 1, "X", 1).unwrap();
        k.add_thread(dummy_entry, 1, "Y", 2).unwrap();
        k.scheduler.launch().unwrap();

        let s = Semaphore::new();
        s.init(0);

        assert!(k.scheduler.wait_semaphore(&s));
        assert!(k.scheduler.current().blocked_on.is_some());
        assert!(!k.scheduler.current().is_runnable());

        // Move currently_running to Y so the wake-scan (which starts at
        // currently_running.next) can find X.
        k.scheduler.run_once();
        assert_eq!(k.scheduler.current().thread_id, b'Y');

        let woke = k.scheduler.signal_semaphore(&s);
        assert!(woke);
        assert_eq!(s.get(), 0);

        k.scheduler.run_once();
        assert_eq!(k.scheduler.current().thread_id, b'X');
        assert!(k.scheduler.current().is_runnable());
    }

    #[test]
    fn kill_with_held_wait_scenario() {
        // Scenario 5: X blocked on s (value -1). kill_thread(X) succeeds,
        // num_threads drops by one, and s.value == 0.
        let mut k = Kernel::new();
        k.add_thread(dummy_entry, 1, "X", 1).unwrap();
        k.add_thread(dummy_entry, 1, "Y", 2).unwrap();
        k.scheduler.launch().unwrap();

        let s = Semaphore::new();
        s.init(0);
        assert!(k.scheduler.wait_semaphore(&s));
        assert_eq!(s.get(), -1);

        k.scheduler.run_once();
        assert_eq!(k.scheduler.current().thread_id, b'Y');

        let before = k.get_number_of_threads();
        k.kill_thread(b'X').unwrap();
        assert_eq!(k.get_number_of_threads(), before - 1);
        assert_eq!(s.get(), 0);
    }

    #[test]
    fn wait_semaphore_does_not_block_when_permits_available() {
        let mut k = Kernel::new();
        k.add_thread(dummy_entry, 1, "X", 1).unwrap();
        k.scheduler.launch().unwrap();

        let s = Semaphore::new();
        s.init(1);
        assert!(!k.scheduler.wait_semaphore(&s));
        assert_eq!(s.get(), 0);
        assert!(k.scheduler.current().blocked_on.is_none());
    }
}
