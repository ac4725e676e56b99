//! Thread control blocks, the thread ring, and the scheduler.
//!
//! The ring is a fixed array of `Tcb`s threaded into a circular doubly
//! linked list via `next_index`/`prev_index`, per the design note against
//! intrusive pointer-based rings: an owned arena of descriptors with
//! index-based links instead of owning back-pointers. `head`/`tail` are
//! just the two ends of the splice point for `add_thread`; they aren't
//! otherwise distinguished nodes.

use crate::config::{MAX_NAME_LEN, MAX_THREADS, STACK_WORDS};
use crate::err::KernelError;
use crate::sem::Semaphore;
use crate::time::Ticks;

/// A single thread's kernel-visible state.
///
/// `stack_pointer` is deliberately the first field: the naked `PendSV`
/// handler treats a `*mut Tcb` as a `*mut u32` to load and store it
/// without knowing the rest of the struct's layout.
#[repr(C)]
pub struct Tcb {
    pub stack_pointer: u32,
    pub priority: u8,
    pub thread_id: u8,
    name: [u8; MAX_NAME_LEN],
    name_len: u8,
    pub asleep: bool,
    pub sleep_until: Ticks,
    pub alive: bool,
    pub blocked_on: Option<*const Semaphore>,
    next_index: Option<usize>,
    prev_index: Option<usize>,
    stack: [u32; STACK_WORDS],
}

impl Tcb {
    const fn new() -> Self {
        Tcb {
            stack_pointer: 0,
            priority: 0,
            thread_id: 0,
            name: [0; MAX_NAME_LEN],
            name_len: 0,
            asleep: false,
            sleep_until: Ticks::ZERO,
            alive: false,
            blocked_on: None,
            next_index: None,
            prev_index: None,
            stack: [0; STACK_WORDS],
        }
    }

    /// Runnable iff alive, awake, and not blocked on a semaphore.
    pub fn is_runnable(&self) -> bool {
        self.alive && !self.asleep && self.blocked_on.is_none()
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let truncated = bytes
            .iter()
            .position(|&b| b == 0)
            .map(|p| &bytes[..p])
            .unwrap_or(bytes);
        let n = truncated.len().min(MAX_NAME_LEN);
        self.name[..n].copy_from_slice(&truncated[..n]);
        self.name[n..].fill(0);
        self.name_len = n as u8;
    }
}

/// Selects, adds, kills, and puts to sleep threads in the ring. Does not
/// itself perform a context switch; callers (`kernel`) pend one where
/// called for.
pub struct Scheduler {
    tcbs: [Tcb; MAX_THREADS],
    head: Option<usize>,
    tail: Option<usize>,
    current: Option<usize>,
    num_threads: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        // `Tcb` isn't `Copy` (it embeds a sizable stack array), so the
        // table is built element-by-element rather than with a
        // `[Tcb::new(); N]` repeat expression.
        Scheduler {
            tcbs: core::array::from_fn(|_| Tcb::new()),
            head: None,
            tail: None,
            current: None,
            num_threads: 0,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> &Tcb {
        &self.tcbs[self.current.expect("scheduler not launched")]
    }

    pub fn current_mut(&mut self) -> &mut Tcb {
        &mut self.tcbs[self.current.expect("scheduler not launched")]
    }

    pub fn tcb(&self, index: usize) -> &Tcb {
        &self.tcbs[index]
    }

    /// Called once by `Kernel::launch`: makes the first-added thread the
    /// currently-running one.
    pub(crate) fn launch(&mut self) -> Result<(), KernelError> {
        self.current = Some(self.head.ok_or(KernelError::NoThreadsScheduled)?);
        Ok(())
    }

    /// Adds a thread. See the module doc for the ring-splice contract.
    pub fn add_thread(
        &mut self,
        entry: extern "C" fn(),
        priority: u8,
        name: &str,
        thread_id: u8,
    ) -> Result<(), KernelError> {
        if self.num_threads >= MAX_THREADS {
            return Err(KernelError::ThreadLimitReached);
        }

        let idx = (0..MAX_THREADS)
            .find(|&i| !self.tcbs[i].alive)
            .expect("num_threads < MAX_THREADS implies a free slot exists");

        if self.num_threads == 0 {
            self.tcbs[idx].next_index = Some(idx);
            self.tcbs[idx].prev_index = Some(idx);
            self.head = Some(idx);
            self.tail = Some(idx);
        } else {
            let head = self.head.unwrap();
            let tail = self.tail.unwrap();
            self.tcbs[idx].next_index = Some(head);
            self.tcbs[idx].prev_index = Some(tail);
            self.tcbs[tail].next_index = Some(idx);
            self.tcbs[head].prev_index = Some(idx);
            self.tail = Some(idx);
        }

        let stack_top = unsafe { self.tcbs[idx].stack.as_mut_ptr().add(STACK_WORDS) };
        self.tcbs[idx].stack_pointer = crate::arch::init_stack(stack_top, entry);
        self.tcbs[idx].priority = priority;
        self.tcbs[idx].thread_id = thread_id;
        self.tcbs[idx].set_name(name);
        self.tcbs[idx].asleep = false;
        self.tcbs[idx].sleep_until = Ticks::ZERO;
        self.tcbs[idx].blocked_on = None;
        self.tcbs[idx].alive = true;

        self.num_threads += 1;
        Ok(())
    }

    /// Kills the first ring member (searching from `currently_running.next`
    /// forward, which intentionally excludes `currently_running`) whose
    /// `thread_id` matches.
    pub fn kill_thread(&mut self, id: u8) -> Result<(), KernelError> {
        if self.num_threads <= 1 {
            return Err(KernelError::CannotKillLastThread);
        }
        let current = self.current.ok_or(KernelError::NoThreadsScheduled)?;
        let mut idx = self.tcbs[current].next_index.unwrap();
        while idx != current {
            if self.tcbs[idx].thread_id == id {
                self.unlink_and_kill(idx);
                return Ok(());
            }
            idx = self.tcbs[idx].next_index.unwrap();
        }
        Err(KernelError::ThreadDoesNotExist)
    }

    /// Kills `currently_running`. A real caller never observes the return:
    /// a context switch is pending by the time this returns, and by the
    /// time this thread runs again it won't exist. Modeled here as an
    /// ordinary fallible call so it stays host-testable.
    pub fn kill_self(&mut self) -> Result<(), KernelError> {
        if self.num_threads <= 1 {
            return Err(KernelError::CannotKillLastThread);
        }
        let current = self.current.ok_or(KernelError::NoThreadsScheduled)?;
        self.unlink_and_kill(current);
        Ok(())
    }

    fn unlink_and_kill(&mut self, victim: usize) {
        let prev = self.tcbs[victim].prev_index.unwrap();
        let next = self.tcbs[victim].next_index.unwrap();
        self.tcbs[prev].next_index = Some(next);
        self.tcbs[next].prev_index = Some(prev);
        if self.tail == Some(victim) {
            self.tail = Some(prev);
        }
        if self.head == Some(victim) {
            self.head = Some(next);
        }

        if let Some(sem_ptr) = self.tcbs[victim].blocked_on {
            // Safety: `blocked_on` only ever holds a pointer handed to us by
            // `Kernel::wait_semaphore`, which requires `'static` semaphores.
            let sem = unsafe { &*sem_ptr };
            if sem.get() < 0 {
                self.signal_semaphore(sem);
            }
        }

        self.tcbs[victim].blocked_on = None;
        self.tcbs[victim].alive = false;
        self.num_threads -= 1;
    }

    /// `sleep(duration_ms)`: must be called only from thread context (i.e.
    /// while some thread is `currently_running`).
    pub fn sleep(&mut self, now: Ticks, duration_ms: u32) {
        let current = self.current_mut();
        current.sleep_until = now + duration_ms;
        current.asleep = true;
    }

    /// Walks the ring from `currently_running.next` and clears `asleep` on
    /// any thread whose `sleep_until` matches `now` exactly.
    pub fn wake_sleepers(&mut self, now: Ticks) {
        let current = match self.current {
            Some(c) => c,
            None => return,
        };
        let mut idx = current;
        loop {
            if self.tcbs[idx].asleep && self.tcbs[idx].sleep_until == now {
                self.tcbs[idx].asleep = false;
            }
            idx = self.tcbs[idx].next_index.unwrap();
            if idx == current {
                break;
            }
        }
    }

    /// The scheduling policy itself: walk every thread except
    /// `currently_running`, track the strictly-smallest-priority runnable
    /// one (ties go to the earliest visited), and fall back to keeping
    /// `currently_running` if nothing else qualifies.
    pub fn select(&self) -> usize {
        let current = self.current.expect("scheduler not launched");
        let mut chosen = current;
        let mut best: Option<u8> = None;

        let mut idx = self.tcbs[current].next_index.unwrap();
        for _ in 0..self.num_threads.saturating_sub(1) {
            let t = &self.tcbs[idx];
            if t.is_runnable() && best.map_or(true, |bp| t.priority < bp) {
                best = Some(t.priority);
                chosen = idx;
            }
            idx = t.next_index.unwrap();
        }

        chosen
    }

    /// Runs `select` and makes its result `currently_running`. Called from
    /// the context-switch ISR.
    pub fn run_once(&mut self) {
        self.current = Some(self.select());
    }

    /// `wait_semaphore`'s ring-touching half: decrements `sem`, and if it
    /// went negative, records `currently_running.blocked_on = sem`.
    /// Returns whether the calling thread became blocked (i.e. whether the
    /// caller should pend a context switch).
    pub(crate) fn wait_semaphore(&mut self, sem: &Semaphore) -> bool {
        let new_value = unsafe { sem.dec() };
        if new_value < 0 {
            let current = self.current.expect("wait_semaphore before launch");
            self.tcbs[current].blocked_on = Some(sem.as_ptr());
            true
        } else {
            false
        }
    }

    /// `signal_semaphore`'s ring-touching half: increments `sem`, and if a
    /// waiter existed, clears the first matching `blocked_on` found walking
    /// forward from `currently_running.next`. Returns whether a waiter was
    /// woken. This deliberately does NOT request a context switch; the
    /// woken thread simply becomes eligible for the next scheduler
    /// invocation.
    pub(crate) fn signal_semaphore(&mut self, sem: &Semaphore) -> bool {
        let new_value = unsafe { sem.inc() };
        if new_value <= 0 {
            self.wake_one_blocked_on(sem)
        } else {
            false
        }
    }

    fn wake_one_blocked_on(&mut self, sem: &Semaphore) -> bool {
        let current = match self.current {
            Some(c) => c,
            None => return false,
        };
        let target = sem.as_ptr();
        let mut idx = self.tcbs[current].next_index.unwrap_or(current);
        while idx != current {
            if self.tcbs[idx].blocked_on == Some(target) {
                self.tcbs[idx].blocked_on = None;
                return true;
            }
            idx = self.tcbs[idx].next_index.unwrap();
        }
        false
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() {}

    fn add(sched: &mut Scheduler, priority: u8, id: u8) {
        sched
            .add_thread(dummy_entry, priority, "t", id)
            .expect("add_thread");
    }

    #[test]
    fn priority_selection_scenario() {
        // Scenario 1: A(10) B(5) C(3) D(3) added in order; after launch and
        // the first reschedule, C is running.
        let mut sched = Scheduler::new();
        add(&mut sched, 10, b'A');
        add(&mut sched, 5, b'B');
        add(&mut sched, 3, b'C');
        add(&mut sched, 3, b'D');
        sched.launch().unwrap();
        sched.run_once();
        assert_eq!(sched.current().thread_id, b'C');
    }

    #[test]
    fn add_thread_at_capacity_fails_without_mutating() {
        let mut sched = Scheduler::new();
        for i in 0..MAX_THREADS {
            add(&mut sched, 1, i as u8);
        }
        let err = sched.add_thread(dummy_entry, 1, "x", 99).unwrap_err();
        assert_eq!(err, KernelError::ThreadLimitReached);
        assert_eq!(sched.num_threads(), MAX_THREADS);
    }

    #[test]
    fn kill_thread_requires_more_than_one_alive() {
        let mut sched = Scheduler::new();
        add(&mut sched, 1, 1);
        sched.launch().unwrap();
        assert_eq!(
            sched.kill_thread(1).unwrap_err(),
            KernelError::CannotKillLastThread
        );
    }

    #[test]
    fn kill_thread_missing_id_fails() {
        let mut sched = Scheduler::new();
        add(&mut sched, 1, 1);
        add(&mut sched, 1, 2);
        sched.launch().unwrap();
        assert_eq!(
            sched.kill_thread(42).unwrap_err(),
            KernelError::ThreadDoesNotExist
        );
    }

    #[test]
    fn ring_stays_consistent_after_kill() {
        let mut sched = Scheduler::new();
        add(&mut sched, 1, 1);
        add(&mut sched, 1, 2);
        add(&mut sched, 1, 3);
        sched.launch().unwrap();
        sched.kill_thread(2).unwrap();
        assert_eq!(sched.num_threads(), 2);
        for i in 0..MAX_THREADS {
            let t = sched.tcb(i);
            if t.alive {
                let next = sched.tcb(t.next_index.unwrap());
                assert_eq!(next.prev_index.unwrap(), i);
            }
        }
    }

    #[test]
    fn sleep_wakes_on_exact_tick() {
        // Scenario 2: thread sleeps 10ms at tick 100; asleep clears exactly
        // at tick 110.
        let mut sched = Scheduler::new();
        add(&mut sched, 1, 1);
        add(&mut sched, 1, 2);
        sched.launch().unwrap();
        sched.sleep(Ticks(100), 10);
        assert!(sched.current().asleep);
        for tick in 101..110 {
            sched.wake_sleepers(Ticks(tick));
            assert!(sched.current().asleep, "still asleep at {}", tick);
        }
        sched.wake_sleepers(Ticks(110));
        assert!(!sched.current().asleep);
    }
}
