//! Monotonic index generator for constant-buffer slots.

/// Hands out consecutive `usize` indices starting at zero.
///
/// Each builder that assigns constant-buffer indices owns one of these, so
/// index assignment is explicit and deterministic per instance.
#[derive(Debug, Default, Clone)]
pub struct IndexSequence {
    next: usize,
}

impl IndexSequence {
    /// Creates a sequence starting at zero.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Returns the next index and advances the sequence.
    pub fn next_index(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }

    /// Number of indices issued so far.
    #[inline]
    pub fn issued(&self) -> usize {
        self.next
    }
}
