//! Time-ordered identifiers
//!
//! Every persistent entity is keyed by a lexicographically-sortable,
//! 26-character ULID. A process-local monotonic generator guarantees strict
//! ordering for ids minted within the same millisecond, and remains strictly
//! increasing even if the wall clock regresses.

use std::sync::Mutex;

use ulid::Ulid;

/// Monotonic ULID generator.
///
/// Wraps `ulid::Ulid::new()` with a last-seen-id guard so that two ids
/// minted in the same millisecond (or during a clock regression) are still
/// strictly increasing, which `retain`'s insertion ordering depends on.
pub struct IdGenerator {
    last: Mutex<Option<Ulid>>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Mint a new id, guaranteed strictly greater than every id this
    /// generator has produced before.
    pub fn next(&self) -> Ulid {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let candidate = Ulid::new();
        let minted = match *last {
            Some(prev) if candidate <= prev => prev
                .increment()
                .expect("ULID overflow: exhausted the 80-bit random tail"),
            _ => candidate,
        };
        *last = Some(minted);
        minted
    }

    /// Mint a new id as a string, as stored on every entity's `id` field.
    pub fn next_string(&self) -> String {
        self.next().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_within_same_process() {
        let gen = IdGenerator::new();
        let mut prev = gen.next();
        for _ in 0..1000 {
            let next = gen.next();
            assert!(next > prev, "ids must be strictly increasing");
            prev = next;
        }
    }

    #[test]
    fn ids_are_26_characters() {
        let gen = IdGenerator::new();
        assert_eq!(gen.next_string().len(), 26);
    }
}
