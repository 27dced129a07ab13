//! Per-file line counter buffers
//!
//! The tracker increments a dense local buffer on every line event and
//! only moves the counts into the data store on flush. The buffer is sized
//! to the file's line count when it is created, so steady-state increments
//! never allocate.

/// Dense execution counters for one file (index 0 is line 1)
#[derive(Debug, Clone, Default)]
pub struct LineCounters {
    /// Local counter buffer, one slot per line
    local: Vec<u64>,
    /// Increments since the last flush
    pending: usize,
    /// Number of flushes performed
    flush_count: usize,
}

impl LineCounters {
    /// Create counters for a file with `line_count` lines
    #[must_use]
    pub fn new(line_count: u32) -> Self {
        Self {
            local: vec![0; line_count as usize],
            pending: 0,
            flush_count: 0,
        }
    }

    /// Count one execution of `line`
    ///
    /// Returns false for line 0 or lines past the end of the buffer.
    #[inline(always)]
    pub fn increment(&mut self, line: u32) -> bool {
        let Some(slot) = line
            .checked_sub(1)
            .and_then(|i| self.local.get_mut(i as usize))
        else {
            return false;
        };
        *slot += 1;
        self.pending += 1;
        true
    }

    /// Current local count for a line (before flush)
    #[inline]
    #[must_use]
    pub fn get(&self, line: u32) -> u64 {
        line.checked_sub(1)
            .and_then(|i| self.local.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Drain non-zero counts as `(line, count)` pairs and reset the buffer
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.pending = 0;
        self.flush_count += 1;
        self.local
            .iter_mut()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(i, c)| (i as u32 + 1, std::mem::take(c)))
    }

    /// Number of times the buffer was drained
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    /// Number of lines tracked
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.local.len()
    }

    /// Any increments since the last drain
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut c = LineCounters::new(3);
        assert!(c.increment(1));
        assert!(c.increment(1));
        assert!(c.increment(3));
        assert_eq!(c.get(1), 2);
        assert_eq!(c.get(2), 0);
        assert_eq!(c.get(3), 1);
        assert!(c.has_pending());
    }

    #[test]
    fn test_out_of_range_lines_are_ignored() {
        let mut c = LineCounters::new(2);
        assert!(!c.increment(0));
        assert!(!c.increment(3));
        assert!(!c.has_pending());
        assert_eq!(c.get(0), 0);
    }

    #[test]
    fn test_drain_resets() {
        let mut c = LineCounters::new(4);
        let _ = c.increment(2);
        let _ = c.increment(4);
        let _ = c.increment(4);
        let drained: Vec<(u32, u64)> = c.drain().collect();
        assert_eq!(drained, vec![(2, 1), (4, 2)]);
        assert_eq!(c.flush_count(), 1);
        assert!(!c.has_pending());
        assert_eq!(c.drain().count(), 0);
        assert_eq!(c.line_count(), 4);
    }
}
