//! System time: a 1 kHz tick counter.

/// A tick count since `launch()`. Wraps at `u32::MAX`; all comparisons
/// against a scheduled tick are equality comparisons on the wrapped value,
/// never `<`, so wraparound is transparent to callers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Ticks(pub u32);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    pub fn wrapping_add(self, delta: u32) -> Ticks {
        Ticks(self.0.wrapping_add(delta))
    }
}

impl core::ops::Add<u32> for Ticks {
    type Output = Ticks;
    fn add(self, rhs: u32) -> Ticks {
        self.wrapping_add(rhs)
    }
}

impl From<u32> for Ticks {
    fn from(v: u32) -> Self {
        Ticks(v)
    }
}

impl From<Ticks> for u32 {
    fn from(v: Ticks) -> Self {
        v.0
    }
}
