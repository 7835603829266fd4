//! Memory accounting for a decode session.
//!
//! This module provides [`MemoryLimiter`], which tracks how much memory the
//! filters of the active block have been granted and refuses reservations
//! that would push the total past the caller's ceiling.

use crate::{Error, Result};

/// Running total of memory granted to filter stages.
///
/// A limiter belongs to one session and is not shared, so plain integers
/// are enough. Reservations are released explicitly when a block's filter
/// chain is dropped, and all at once when the session resets or ends.
///
/// # Example
///
/// ```rust
/// use xzstream::streaming::MemoryLimiter;
///
/// let mut limiter = MemoryLimiter::new(64 * 1024);
/// limiter.reserve(48 * 1024)?;
/// assert!(limiter.reserve(32 * 1024).is_err());
/// assert_eq!(limiter.current_usage(), 48 * 1024);
///
/// limiter.release_all();
/// assert_eq!(limiter.current_usage(), 0);
/// # Ok::<(), xzstream::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryLimiter {
    current_usage: u64,
    peak_usage: u64,
    limit: u64,
}

impl MemoryLimiter {
    /// Creates a limiter with the given ceiling in bytes.
    ///
    /// A ceiling of zero is treated as one byte, so every real reservation fails.
    pub fn new(limit: u64) -> Self {
        Self {
            current_usage: 0,
            peak_usage: 0,
            limit: limit.max(1),
        }
    }

    /// Creates a limiter that never refuses a reservation.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Returns the ceiling.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the bytes currently reserved.
    pub fn current_usage(&self) -> u64 {
        self.current_usage
    }

    /// Returns the highest reserved total seen since creation or the last [`reset_peak`](Self::reset_peak).
    pub fn peak_usage(&self) -> u64 {
        self.peak_usage
    }

    /// Returns how many more bytes could be reserved.
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.current_usage)
    }

    /// Checks whether `bytes` could be reserved right now.
    pub fn can_reserve(&self, bytes: u64) -> bool {
        self.current_usage
            .checked_add(bytes)
            .is_some_and(|total| total <= self.limit)
    }

    /// Reserves `bytes` against the ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryLimitExceeded`] if the total would exceed the
    /// ceiling. The running total is left unchanged in that case.
    pub fn reserve(&mut self, bytes: u64) -> Result<()> {
        let required = self.current_usage.saturating_add(bytes);
        if !self.can_reserve(bytes) {
            return Err(Error::MemoryLimitExceeded {
                required,
                limit: self.limit,
            });
        }
        self.current_usage = required;
        self.peak_usage = self.peak_usage.max(required);
        Ok(())
    }

    /// Returns `bytes` to the pool.
    pub fn release(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.current_usage, "releasing more than reserved");
        self.current_usage = self.current_usage.saturating_sub(bytes);
    }

    /// Drops every outstanding reservation.
    pub fn release_all(&mut self) {
        self.current_usage = 0;
    }

    /// Changes the ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryLimitExceeded`] if more than `limit` bytes are
    /// already reserved; the old ceiling stays in effect.
    pub fn set_limit(&mut self, limit: u64) -> Result<()> {
        let limit = limit.max(1);
        if limit < self.current_usage {
            return Err(Error::MemoryLimitExceeded {
                required: self.current_usage,
                limit,
            });
        }
        self.limit = limit;
        Ok(())
    }

    /// Resets peak tracking to the current usage.
    pub fn reset_peak(&mut self) {
        self.peak_usage = self.current_usage;
    }
}

impl Default for MemoryLimiter {
    fn default() -> Self {
        Self::new(crate::streaming::DEFAULT_MEMORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_within_limit() {
        let mut limiter = MemoryLimiter::new(1000);

        limiter.reserve(400).unwrap();
        limiter.reserve(600).unwrap();
        assert_eq!(limiter.current_usage(), 1000);
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_failed_reserve_leaves_state_unchanged() {
        let mut limiter = MemoryLimiter::new(1000);
        limiter.reserve(700).unwrap();

        let err = limiter.reserve(400).unwrap_err();
        assert!(matches!(
            err,
            Error::MemoryLimitExceeded {
                required: 1100,
                limit: 1000
            }
        ));
        assert_eq!(limiter.current_usage(), 700);
        assert_eq!(limiter.peak_usage(), 700);
    }

    #[test]
    fn test_reserve_overflow_rejected() {
        let mut limiter = MemoryLimiter::unlimited();
        limiter.reserve(10).unwrap();
        assert!(limiter.reserve(u64::MAX).is_err());
        assert_eq!(limiter.current_usage(), 10);
    }

    #[test]
    fn test_release_and_peak() {
        let mut limiter = MemoryLimiter::new(1000);
        limiter.reserve(800).unwrap();
        limiter.release(500);
        assert_eq!(limiter.current_usage(), 300);
        assert_eq!(limiter.peak_usage(), 800);

        limiter.reset_peak();
        assert_eq!(limiter.peak_usage(), 300);
    }

    #[test]
    fn test_release_all() {
        let mut limiter = MemoryLimiter::new(1000);
        limiter.reserve(100).unwrap();
        limiter.reserve(200).unwrap();
        limiter.release_all();
        assert_eq!(limiter.current_usage(), 0);
        assert!(limiter.can_reserve(1000));
    }

    #[test]
    fn test_zero_limit_means_one_byte() {
        let mut limiter = MemoryLimiter::new(0);
        assert_eq!(limiter.limit(), 1);
        assert!(limiter.reserve(2).is_err());
    }

    #[test]
    fn test_set_limit_below_usage_fails() {
        let mut limiter = MemoryLimiter::new(1000);
        limiter.reserve(600).unwrap();

        assert!(limiter.set_limit(500).is_err());
        assert_eq!(limiter.limit(), 1000);

        limiter.set_limit(600).unwrap();
        assert_eq!(limiter.limit(), 600);
        assert!(!limiter.can_reserve(1));
    }
}
