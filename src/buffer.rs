//! Ping-pong double buffering
//!
//! Every logical pipeline buffer maps to two physical storages. A pass reads
//! the previously committed slot and writes the other; the read index flips
//! once after the pass completes. No pass ever reads a value it is
//! concurrently producing.

/// Two-slot arena with a single active read index
///
/// # Example
///
/// ```
/// use voronoi_relax::buffer::PingPong;
///
/// let mut buf = PingPong::new(vec![0u32; 4], vec![0u32; 4]);
/// {
///     let (prev, next) = buf.split();
///     next[0] = prev[0] + 1;
/// }
/// buf.swap();
/// assert_eq!(buf.read()[0], 1);
/// ```
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    /// Create a ping-pong pair; the first slot starts as the read side
    pub fn new(read_slot: T, write_slot: T) -> Self {
        Self {
            slots: [read_slot, write_slot],
            read: 0,
        }
    }

    /// The committed result of the previous completed pass
    #[inline]
    pub fn read(&self) -> &T {
        &self.slots[self.read]
    }

    /// Borrow the committed slot and the write slot together
    ///
    /// This is the only way to obtain the write slot, which keeps a pass
    /// from mutating the buffer it reads.
    pub fn split(&mut self) -> (&T, &mut T) {
        let (lo, hi) = self.slots.split_at_mut(1);
        if self.read == 0 {
            (&lo[0], &mut hi[0])
        } else {
            (&hi[0], &mut lo[0])
        }
    }

    /// Commit the write slot: flip the read index
    ///
    /// Called exactly once per completed pass, never mid-pass.
    #[inline]
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    /// Mutate both slots at once (reconfiguration only)
    ///
    /// Resizing is a global reset, so both physical storages are replaced
    /// together and no partially-updated state survives.
    pub fn reset_both(&mut self, read_slot: T, write_slot: T) {
        self.slots = [read_slot, write_slot];
        self.read = 0;
    }

    /// Apply the same mutation to both slots (bootstrap overrides)
    pub fn for_both(&mut self, mut f: impl FnMut(&mut T)) {
        f(&mut self.slots[0]);
        f(&mut self.slots[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_returns_disjoint_slots() {
        let mut buf = PingPong::new(vec![1, 2], vec![0, 0]);
        {
            let (prev, next) = buf.split();
            next[0] = prev[0] * 10;
            next[1] = prev[1] * 10;
        }
        // Write slot is invisible until the swap
        assert_eq!(buf.read(), &vec![1, 2]);
        buf.swap();
        assert_eq!(buf.read(), &vec![10, 20]);
    }

    #[test]
    fn test_swap_alternates() {
        let mut buf = PingPong::new('a', 'b');
        assert_eq!(*buf.read(), 'a');
        buf.swap();
        assert_eq!(*buf.read(), 'b');
        buf.swap();
        assert_eq!(*buf.read(), 'a');
    }

    #[test]
    fn test_reset_both_restores_read_index() {
        let mut buf = PingPong::new(1, 2);
        buf.swap();
        buf.reset_both(7, 8);
        assert_eq!(*buf.read(), 7);
    }
}
