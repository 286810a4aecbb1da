//! The server's only piece of state: a signed 64-bit counter.
//!
//! The counter is owned by the event loop and passed by `&mut` into the
//! protocol handler, so it needs no synchronization. Arithmetic wraps in
//! two's complement; there is no overflow check.

/// Process-wide counter, reset to zero on every start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    value: i64,
}

impl Counter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        self.value
    }

    /// Add `delta` and return the new value.
    pub fn incr(&mut self, delta: i64) -> i64 {
        self.value = self.value.wrapping_add(delta);
        self.value
    }

    /// Subtract `delta` and return the new value.
    pub fn decr(&mut self, delta: i64) -> i64 {
        self.value = self.value.wrapping_sub(delta);
        self.value
    }
}
