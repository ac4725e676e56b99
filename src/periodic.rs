//! Periodic thread control blocks and the tick-driven periodic ring.
//!
//! Unlike the thread ring, PTCBs are never killed: the array's first
//! `num_pthreads` entries form the ring, in insertion order, for the
//! lifetime of the kernel.

use crate::config::MAX_PTHREADS;
use crate::err::KernelError;
use crate::time::Ticks;

#[derive(Clone, Copy)]
struct Ptcb {
    handler: extern "C" fn(),
    period: u32,
    execute_time: Ticks,
    current_time: Ticks,
}

/// Fixed-capacity, insertion-ordered list of periodic handlers.
pub struct PeriodicRing {
    ptcbs: [Option<Ptcb>; MAX_PTHREADS],
    len: usize,
}

impl PeriodicRing {
    pub fn new() -> Self {
        PeriodicRing {
            ptcbs: [None; MAX_PTHREADS],
            len: 0,
        }
    }

    /// `add_periodic_event(handler, period, execution)`: `execution` is
    /// accepted and recorded, but does not influence when `handler` first
    /// fires -- the first fire is always `system_time + period`. This is
    /// a known mismatch between the parameter's name and its effect, kept
    /// rather than silently "corrected."
    pub fn add_periodic_event(
        &mut self,
        handler: extern "C" fn(),
        period: u32,
        execution: u32,
        now: Ticks,
    ) -> Result<(), KernelError> {
        if self.len == MAX_PTHREADS {
            return Err(KernelError::ThreadLimitReached);
        }
        let _ = execution;
        self.ptcbs[self.len] = Some(Ptcb {
            handler,
            period,
            execute_time: now + execution,
            current_time: now + period,
        });
        self.len += 1;
        Ok(())
    }

    /// Runs every handler due at `now`, in insertion order, rescheduling
    /// each to `now + period`. Called once per tick, at tick-ISR priority.
    pub fn dispatch_due(&mut self, now: Ticks) {
        for slot in self.ptcbs[..self.len].iter_mut() {
            if let Some(ptcb) = slot {
                if ptcb.current_time == now {
                    (ptcb.handler)();
                    ptcb.current_time = now + ptcb.period;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exposed for tests; the scheduled first-run tick is informational
    /// per the data model and never read by `dispatch_due`.
    #[cfg(test)]
    fn execute_time(&self, index: usize) -> Ticks {
        self.ptcbs[index].unwrap().execute_time
    }
}

impl Default for PeriodicRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRES: AtomicU32 = AtomicU32::new(0);
    extern "C" fn handler() {
        FIRES.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn periodic_dispatch_scenario() {
        // Scenario 6: period=5, execution=0, registered at system_time=0;
        // fires at ticks 5, 10, 15, 20.
        let mut ring = PeriodicRing::new();
        ring.add_periodic_event(handler, 5, 0, Ticks(0)).unwrap();
        let before = FIRES.load(Ordering::SeqCst);
        let mut fire_ticks = Vec::new();
        for t in 1..=20u32 {
            let prev = FIRES.load(Ordering::SeqCst);
            ring.dispatch_due(Ticks(t));
            if FIRES.load(Ordering::SeqCst) != prev {
                fire_ticks.push(t);
            }
        }
        assert_eq!(fire_ticks, vec![5, 10, 15, 20]);
        assert_eq!(FIRES.load(Ordering::SeqCst), before + 4);
    }

    #[test]
    fn execution_argument_does_not_gate_first_fire() {
        let mut ring = PeriodicRing::new();
        ring.add_periodic_event(handler, 5, 3, Ticks(0)).unwrap();
        // current_time is system_time + period, not + execution.
        let before = FIRES.load(Ordering::SeqCst);
        ring.dispatch_due(Ticks(3));
        assert_eq!(FIRES.load(Ordering::SeqCst), before);
        ring.dispatch_due(Ticks(5));
        assert_eq!(FIRES.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn fails_at_capacity() {
        let mut ring = PeriodicRing::new();
        for _ in 0..MAX_PTHREADS {
            ring.add_periodic_event(handler, 1, 0, Ticks(0)).unwrap();
        }
        assert_eq!(
            ring.add_periodic_event(handler, 1, 0, Ticks(0)).unwrap_err(),
            KernelError::ThreadLimitReached
        );
    }
}
