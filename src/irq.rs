//! Aperiodic event registration: attaching user handlers to hardware IRQ
//! lines.
//!
//! The real vector table lives in flash; at boot the startup code (outside
//! this crate's scope, per the external context-save/restore trampoline
//! contract) relocates a writable copy into SRAM. What this module owns is
//! the *aperiodic slice* of that table: a RAM-resident array of handler
//! pointers indexed by IRQ number, which the relocated table's IRQ entries
//! jump through. Installing a handler here, raising its NVIC priority, and
//! enabling the line are the three steps `add_aperiodic_event` performs
//! under critical section.

use crate::config::{MAX_APERIODIC_IRQN, MAX_APERIODIC_PRIORITY};
use crate::err::KernelError;

/// Number of IRQ line slots the aperiodic table covers: `irq_number` is
/// validated against `0..=MAX_APERIODIC_IRQN`, so the table needs one slot
/// per valid number.
const IRQ_SLOTS: usize = MAX_APERIODIC_IRQN as usize + 1;

/// The RAM-resident aperiodic handler table.
pub struct AperiodicTable {
    handlers: [Option<extern "C" fn()>; IRQ_SLOTS],
}

impl AperiodicTable {
    pub fn new() -> Self {
        AperiodicTable {
            handlers: [None; IRQ_SLOTS],
        }
    }

    /// Validates `irq_number` and `priority`, installs `handler`, raises
    /// the line's hardware priority, and enables it. Must be called under
    /// critical section by the caller (`Kernel::add_aperiodic_event`).
    pub fn add_aperiodic_event(
        &mut self,
        handler: extern "C" fn(),
        priority: u8,
        irq_number: i32,
    ) -> Result<(), KernelError> {
        if irq_number < 0 || irq_number > MAX_APERIODIC_IRQN {
            return Err(KernelError::IrqnInvalid);
        }
        if priority > MAX_APERIODIC_PRIORITY {
            return Err(KernelError::HwiPriorityInvalid);
        }

        self.handlers[irq_number as usize] = Some(handler);
        crate::arch::set_irq_priority(irq_number as u32, priority);
        crate::arch::enable_irq(irq_number as u32);
        Ok(())
    }

    /// Looks up and invokes the handler installed for `irq_number`, if any.
    /// Called from the real vector table's generic IRQ trampoline; a no-op
    /// for an IRQ with nothing installed.
    pub fn dispatch(&self, irq_number: i32) {
        if let Ok(idx) = usize::try_from(irq_number) {
            if let Some(slot) = self.handlers.get(idx) {
                if let Some(handler) = slot {
                    handler();
                }
            }
        }
    }
}

impl Default for AperiodicTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static CALLS: AtomicU32 = AtomicU32::new(0);
    extern "C" fn bump() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn rejects_out_of_range_irq_numbers() {
        let mut table = AperiodicTable::new();
        assert_eq!(
            table.add_aperiodic_event(bump, 0, -1).unwrap_err(),
            KernelError::IrqnInvalid
        );
        assert_eq!(
            table
                .add_aperiodic_event(bump, 0, MAX_APERIODIC_IRQN + 1)
                .unwrap_err(),
            KernelError::IrqnInvalid
        );
    }

    #[test]
    fn rejects_priority_in_kernel_band() {
        let mut table = AperiodicTable::new();
        assert_eq!(
            table
                .add_aperiodic_event(bump, MAX_APERIODIC_PRIORITY + 1, 5)
                .unwrap_err(),
            KernelError::HwiPriorityInvalid
        );
    }

    #[test]
    fn installed_handler_runs_on_dispatch() {
        let mut table = AperiodicTable::new();
        table.add_aperiodic_event(bump, 0, 10).unwrap();
        let before = CALLS.load(Ordering::SeqCst);
        table.dispatch(10);
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
    }
}
