//! The critical-section primitive.
//!
//! Treated as a contract by the rest of the kernel: `enter()` atomically
//! masks interrupts and returns an opaque token; `leave(token)` restores
//! whatever mask was in effect before the matching `enter()`, so nested
//! critical sections compose correctly. The actual register-level
//! implementation (PRIMASK save/restore on the real target, a global lock
//! on the host test backend) is supplied by the `critical-section` crate's
//! `Impl`, registered for us by `cortex-m`'s `critical-section-single-core`
//! feature on the real target and by `critical-section`'s `std` feature in
//! host test builds.

/// Opaque token returned by `enter()`. Must be passed to the matching
/// `leave()` and to no other.
#[must_use]
pub struct Token(critical_section::RawRestoreState);

/// Disables maskable interrupts, returning a token that restores the prior
/// mask state when passed to `leave`.
///
/// # Safety
/// Every `enter()` must be paired with exactly one `leave()` of the token
/// it returned, and the pairing must nest properly (LIFO), exactly like a
/// lock guard.
#[inline]
pub unsafe fn enter() -> Token {
    Token(critical_section::acquire())
}

/// Restores the interrupt mask saved by the matching `enter()`.
///
/// # Safety
/// `token` must be the one returned by the most recent unmatched `enter()`.
#[inline]
pub unsafe fn leave(token: Token) {
    critical_section::release(token.0)
}

/// Runs `f` with interrupts disabled, restoring the prior mask afterward.
/// This is the safe, preferred entry point; `enter`/`leave` exist for
/// call sites (e.g. `wait_semaphore`) that must end their critical section
/// in a different control-flow branch than the one that began it.
#[inline]
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| f())
}
