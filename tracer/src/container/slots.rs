use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{Result, TraceError};

/// How a sparse container picks the slot of a newly seen key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotPolicy {
    /// The lowest unused slot. Reproducible.
    #[default]
    LowestFree,
    /// A uniformly chosen unused slot from a generator seeded with the value.
    /// Reproducible for a fixed insertion order.
    Seeded(u64),
    /// A uniformly chosen unused slot from an OS-seeded generator.
    Random,
}

/// SlotAllocator hands out sparse slots, ensuring that:
/// - A slot is never handed out twice, so key-to-slot assignments stay
///   injective for the container's lifetime,
/// - Slots come from `[0, bound)` where `bound` is the declared capacity or,
///   without one, the container's observed length grown just enough to fit,
/// - A full declared capacity is reported as exhaustion rather than grown.
pub(crate) struct SlotAllocator {
    /// Which slots have been handed out.
    used: Vec<bool>,
    used_count: u64,
    /// Every slot below this index is used.
    cursor: u64,
    capacity: Option<u64>,
    rng: Option<StdRng>,
}

impl SlotAllocator {
    pub fn new(policy: SlotPolicy, capacity: Option<u64>) -> Self {
        let rng = match policy {
            SlotPolicy::LowestFree => None,
            SlotPolicy::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
            SlotPolicy::Random => Some(StdRng::from_os_rng()),
        };
        Self {
            used: Vec::new(),
            used_count: 0,
            cursor: 0,
            capacity,
            rng,
        }
    }

    pub fn used_count(&self) -> u64 {
        self.used_count
    }

    /// Upper bound of the slot range for a container of observed length
    /// `max_len`.
    pub fn bound(&self, max_len: u64) -> u64 {
        self.capacity
            .unwrap_or_else(|| max_len.max(self.used_count + 1))
    }

    /// Hands out an unused slot in `[0, bound(max_len))`.
    pub fn claim(&mut self, max_len: u64) -> Result<u64> {
        let bound = self.bound(max_len);
        if self.used_count >= bound {
            return Err(TraceError::SparseExhaustion { capacity: bound });
        }
        if self.used.len() < bound as usize {
            self.used.resize(bound as usize, false);
        }

        let slot = match self.rng.as_mut() {
            None => self.lowest_free(),
            Some(rng) => {
                // Pick the n-th free slot among the `bound - used_count` left.
                let n = rng.random_range(0..bound - self.used_count);
                self.nth_free(n, bound)
            }
        };

        self.used[slot as usize] = true;
        self.used_count += 1;
        while (self.cursor as usize) < self.used.len() && self.used[self.cursor as usize] {
            self.cursor += 1;
        }
        Ok(slot)
    }

    /// The slot a lookup of a never seen key is charged to: the lowest unused
    /// one, or slot zero when none is left. Nothing is claimed.
    pub fn peek(&self, max_len: u64) -> u64 {
        if self.cursor < self.bound(max_len) {
            self.cursor
        } else {
            0
        }
    }

    fn lowest_free(&self) -> u64 {
        self.cursor
    }

    fn nth_free(&self, n: u64, bound: u64) -> u64 {
        (self.cursor..bound)
            .filter(|slot| !self.used[*slot as usize])
            .nth(n as usize)
            .unwrap_or_else(|| unreachable!("fewer than {n} free slots below {bound}"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_lowest_free_is_sequential() {
        let mut slots = SlotAllocator::new(SlotPolicy::LowestFree, None);
        assert_eq!(slots.claim(1).unwrap(), 0);
        assert_eq!(slots.claim(2).unwrap(), 1);
        // Without a declared capacity the range grows with the container.
        assert_eq!(slots.claim(0).unwrap(), 2);
        assert_eq!(slots.used_count(), 3);
    }

    #[test]
    fn test_declared_capacity_exhausts() {
        let mut slots = SlotAllocator::new(SlotPolicy::LowestFree, Some(2));
        slots.claim(0).unwrap();
        slots.claim(0).unwrap();
        assert!(matches!(
            slots.claim(0),
            Err(TraceError::SparseExhaustion { capacity: 2 })
        ));
    }

    #[test]
    fn test_seeded_is_injective_and_reproducible() {
        let run = || {
            let mut slots = SlotAllocator::new(SlotPolicy::Seeded(42), Some(16));
            (0..16).map(|_| slots.claim(0).unwrap()).collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        let unique: HashSet<_> = first.iter().copied().collect();
        assert_eq!(unique.len(), 16);
        assert!(first.iter().all(|slot| *slot < 16));
    }

    #[test]
    fn test_peek_does_not_claim() {
        let mut slots = SlotAllocator::new(SlotPolicy::LowestFree, Some(2));
        assert_eq!(slots.peek(0), 0);
        assert_eq!(slots.peek(0), 0);
        slots.claim(0).unwrap();
        assert_eq!(slots.peek(0), 1);
        slots.claim(0).unwrap();
        assert_eq!(slots.peek(0), 0);
    }
}
