//! Process-wide admission gate for GET requests.
//!
//! The gate holds a counter that starts at zero and only grows. Once it
//! reaches the configured threshold every further [`AdmissionGate::admit`]
//! call is rejected for the rest of the process lifetime. There is no window,
//! no decay and no per-client partitioning.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of GET requests served before the gate closes.
pub const DEFAULT_THRESHOLD: u64 = 100;

/// How the counter is compared against the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Boundary {
    /// Exactly `threshold` requests are admitted.
    #[default]
    Exact,
    /// Rejects only once the counter is strictly greater than the threshold,
    /// which admits `threshold + 1` requests.
    Legacy,
}

impl Boundary {
    fn is_closed(self, observed: u64, threshold: u64) -> bool {
        match self {
            Boundary::Exact => observed >= threshold,
            Boundary::Legacy => observed > threshold,
        }
    }
}

/// Decision returned by [`AdmissionGate::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        self == Admission::Allowed
    }
}

/// Counts admitted GET requests and rejects them past a fixed threshold.
///
/// ```
/// use pingpong::gate::{Admission, AdmissionGate};
///
/// let gate = AdmissionGate::new(1);
/// assert_eq!(gate.admit(), Admission::Allowed);
/// assert_eq!(gate.admit(), Admission::Rejected);
/// ```
#[derive(Debug)]
pub struct AdmissionGate {
    observed: AtomicU64,
    threshold: u64,
    boundary: Boundary,
}

impl AdmissionGate {
    pub fn new(threshold: u64) -> Self {
        Self::with_boundary(threshold, Boundary::default())
    }

    pub fn with_boundary(threshold: u64, boundary: Boundary) -> Self {
        Self {
            observed: AtomicU64::new(0),
            threshold,
            boundary,
        }
    }

    /// Decides whether one more GET request may be served.
    ///
    /// The counter only moves on [`Admission::Allowed`]; rejected attempts do
    /// not count towards later decisions. The compare and the increment happen
    /// as a single atomic update, so concurrent callers can never push the
    /// number of admissions past the boundary.
    pub fn admit(&self) -> Admission {
        let (threshold, boundary) = (self.threshold, self.boundary);

        let updated = self
            .observed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |observed| {
                if boundary.is_closed(observed, threshold) {
                    None
                } else {
                    Some(observed.saturating_add(1))
                }
            });

        match updated {
            Ok(_) => Admission::Allowed,
            Err(_) => Admission::Rejected,
        }
    }

    /// Number of GET requests admitted so far.
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Acquire)
    }

    /// How many more requests will be admitted before the gate closes.
    pub fn remaining(&self) -> u64 {
        let limit = match self.boundary {
            Boundary::Exact => self.threshold,
            Boundary::Legacy => self.threshold.saturating_add(1),
        };
        limit.saturating_sub(self.observed())
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn admits_exactly_threshold_requests() {
        let gate = AdmissionGate::new(DEFAULT_THRESHOLD);

        let decisions = (1..=150).map(|_| gate.admit()).collect::<Vec<_>>();

        assert!(decisions[..100].iter().all(|d| d.is_allowed()));
        assert!(decisions[100..].iter().all(|d| !d.is_allowed()));
        assert_eq!(gate.observed(), 100);
        assert_eq!(gate.remaining(), 0);
    }

    #[test]
    fn legacy_boundary_admits_one_extra_request() {
        let gate = AdmissionGate::with_boundary(100, Boundary::Legacy);

        let allowed = (0..150).filter(|_| gate.admit().is_allowed()).count();

        assert_eq!(allowed, 101);
        assert_eq!(gate.observed(), 101);
    }

    #[test]
    fn rejections_do_not_move_the_counter() {
        let gate = AdmissionGate::new(2);
        gate.admit();
        gate.admit();

        for _ in 0..10 {
            assert_eq!(gate.admit(), Admission::Rejected);
        }

        assert_eq!(gate.observed(), 2);
    }

    #[test]
    fn zero_threshold_rejects_everything() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.admit(), Admission::Rejected);
        assert_eq!(gate.observed(), 0);

        let legacy = AdmissionGate::with_boundary(0, Boundary::Legacy);
        assert_eq!(legacy.admit(), Admission::Allowed);
        assert_eq!(legacy.admit(), Admission::Rejected);
    }

    #[test]
    fn remaining_counts_down() {
        let gate = AdmissionGate::new(3);
        assert_eq!(gate.remaining(), 3);
        gate.admit();
        assert_eq!(gate.remaining(), 2);

        let legacy = AdmissionGate::with_boundary(3, Boundary::Legacy);
        assert_eq!(legacy.remaining(), 4);
    }

    #[test]
    fn concurrent_admissions_are_exact() {
        let gate = Arc::new(AdmissionGate::new(100));

        let handles = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || (0..25).filter(|_| gate.admit().is_allowed()).count())
            })
            .collect::<Vec<_>>();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(allowed, 100);
        assert_eq!(gate.observed(), 100);
    }
}
