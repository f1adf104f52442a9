//! Admission control and bounded-overflow counters.
//!
//! # Responsibilities
//! - Assign request sequence ids
//! - Maintain pending/success/failure/rate bookkeeping
//! - Rebase the sequence transparently when it hits its ceiling
//! - Reject new non-probe work once too much is pending
//!
//! Counters are fixed-width. The request sequence is rebased at
//! [`MAX_COUNT`] so ids never lose precision; `pending` and the rate
//! difference are preserved across the rebase, making the wrap invisible to
//! anyone reading only those two values. Ids of long-completed requests may
//! be reused after a rebase; uniqueness is only guaranteed among the
//! currently open set.

use crate::error::EndpointError;

/// Largest value the request sequence may carry before rebasing.
pub(crate) const MAX_COUNT: u32 = 1 << 31;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub request_count: u32,
    pub requests_last_check: u32,
    pub request_rate: u32,
    pub pending: u32,
    pub successes: u32,
    pub failures: u32,
}

impl Counters {
    /// Admission check. Probe requests always pass: the probe is how a
    /// saturated endpoint recovers its health signal.
    pub fn check_admission(&self, is_probe: bool, max_pending: u32) -> Result<(), EndpointError> {
        if self.pending >= max_pending && !is_probe {
            return Err(EndpointError::Full {
                pending: self.pending,
                max: max_pending,
            });
        }
        Ok(())
    }

    /// Assign the next sequence id and account for the dispatch.
    pub fn next_id(&mut self) -> u32 {
        let id = self.request_count;
        self.request_count += 1;
        self.recompute_pending();
        id
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
        self.recompute_pending();
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.recompute_pending();
    }

    /// Recompute `pending` from the raw counters. Not a pure read: reaching
    /// the sequence ceiling triggers the rebase here.
    pub fn recompute_pending(&mut self) {
        self.pending = self.request_count - (self.successes + self.failures);
        if self.request_count == MAX_COUNT {
            self.rebase();
        }
    }

    /// Rebase the sequence into the low range. Only raw counter values move;
    /// `pending` and the `request_count - requests_last_check` difference
    /// used for the rate stay intact.
    fn rebase(&mut self) {
        self.requests_last_check = self.request_rate.wrapping_sub(self.pending);
        self.request_count = self.pending;
        self.successes = 0;
        self.failures = 0;
    }

    /// Requests observed since the previous sample. Run once per sweep
    /// tick; callers normalize by the sweep resolution for a true rate.
    pub fn sample_rate(&mut self) {
        self.request_rate = self.request_count.wrapping_sub(self.requests_last_check);
        self.requests_last_check = self.request_count;
    }
}
