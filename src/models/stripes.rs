//! Fixed arrays of mutexes covering an unbounded ID space.
use parking_lot::{Mutex, MutexGuard};

/// A ring of locks. ID `id` is covered by stripe `id % len`, so many IDs
/// share each stripe.
#[derive(Debug)]
pub struct LockStripes {
    locks: Box<[Mutex<()>]>,
}

impl LockStripes {
    /// Build `num_stripes` locks. `num_stripes` must be positive.
    pub fn new(num_stripes: usize) -> Self {
        LockStripes {
            locks: (0..num_stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of stripes.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether there are no stripes.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// The stripe covering `id`.
    #[inline]
    pub fn stripe(&self, id: usize) -> usize {
        id % self.locks.len()
    }

    /// Block until the stripe covering `id` is acquired.
    pub fn lock(&self, id: usize) -> MutexGuard<'_, ()> {
        self.lock_stripe(self.stripe(id))
    }

    /// Block until stripe `stripe` is acquired.
    pub fn lock_stripe(&self, stripe: usize) -> MutexGuard<'_, ()> {
        self.locks[stripe].lock()
    }

    /// Whether the stripe covering `id` is currently held by anyone.
    pub fn is_locked(&self, id: usize) -> bool {
        self.locks[self.stripe(id)].is_locked()
    }

    /// Acquire the stripes covering two IDs: the higher stripe first, then
    /// the lower one unless both IDs share a stripe.
    ///
    /// Every caller locking two stripes goes through this ordering, so no
    /// two callers can each hold one stripe while waiting on the other.
    pub fn lock_pair(&self, first: usize, second: usize) -> PairGuard<'_> {
        let (first, second) = (self.stripe(first), self.stripe(second));
        let (high, low) = if first >= second {
            (first, second)
        } else {
            (second, first)
        };

        let high_guard = self.lock_stripe(high);
        let low_guard = if low != high {
            Some(self.lock_stripe(low))
        } else {
            None
        };

        PairGuard {
            _low: low_guard,
            _high: high_guard,
        }
    }
}

/// Guards over one or two stripes taken by `LockStripes::lock_pair`.
///
/// The lower stripe is released before the higher one.
#[derive(Debug)]
pub struct PairGuard<'a> {
    // Fields drop in declaration order.
    _low: Option<MutexGuard<'a, ()>>,
    _high: MutexGuard<'a, ()>,
}

impl<'a> PairGuard<'a> {
    /// Whether both IDs mapped to the same stripe.
    pub fn is_shared(&self) -> bool {
        self._low.is_none()
    }
}
