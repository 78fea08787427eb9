//! Document Ranges.
//!
//! A half-open `[begin, end)` span over document offsets. Either end may be
//! unbounded; an unbounded begin sorts before every bounded one and an
//! unbounded end sorts after every bounded one.

use crate::error::{LucidError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Half-open document span with optional bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start offset, `None` if unbounded
    pub begin: Option<u32>,
    /// Exclusive end offset, `None` if unbounded
    pub end: Option<u32>,
}

impl Range {
    /// The fully unbounded range.
    pub const UNBOUNDED: Range = Range {
        begin: None,
        end: None,
    };

    /// Create a bounded range.
    pub fn new(begin: u32, end: u32) -> Result<Self> {
        if end < begin {
            return Err(LucidError::InvalidRange { begin, end });
        }
        Ok(Self {
            begin: Some(begin),
            end: Some(end),
        })
    }

    /// Create a range from optional bounds.
    pub fn from_bounds(begin: Option<u32>, end: Option<u32>) -> Result<Self> {
        if let (Some(b), Some(e)) = (begin, end) {
            return Self::new(b, e);
        }
        Ok(Self { begin, end })
    }

    /// Length of a bounded range.
    #[must_use]
    pub fn len(&self) -> Option<u32> {
        match (self.begin, self.end) {
            (Some(b), Some(e)) => Some(e - b),
            _ => None,
        }
    }

    /// Check whether the range covers no offsets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Check whether two ranges share at least one offset.
    #[must_use]
    pub fn overlaps(&self, other: &Range) -> bool {
        let starts_before_other_ends = match (self.begin, other.end) {
            (Some(b), Some(e)) => b < e,
            _ => true,
        };
        let other_starts_before_end = match (other.begin, self.end) {
            (Some(b), Some(e)) => b < e,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_end
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn union(&self, other: &Range) -> Range {
        let begin = match (self.begin, other.begin) {
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        Range { begin, end }
    }

    /// Order key of the begin bound (unbounded first).
    #[must_use]
    pub fn begin_key(&self) -> i64 {
        self.begin.map_or(i64::MIN, i64::from)
    }

    /// Order key of the end bound (unbounded last).
    #[must_use]
    pub fn end_key(&self) -> i64 {
        self.end.map_or(i64::MAX, i64::from)
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        self.begin_key()
            .cmp(&other.begin_key())
            .then_with(|| self.end_key().cmp(&other.end_key()))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.begin {
            Some(b) => write!(f, "({}", b)?,
            None => write!(f, "(-inf")?,
        }
        match self.end {
            Some(e) => write!(f, ",{})", e),
            None => write!(f, ",inf)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            Range::new(5, 2),
            Err(LucidError::InvalidRange { begin: 5, end: 2 })
        ));
        assert!(Range::from_bounds(Some(5), None).is_ok());
    }

    #[test]
    fn test_unbounded_ordering() {
        let open_begin = Range::from_bounds(None, Some(4)).unwrap();
        let bounded = Range::new(0, 4).unwrap();
        let open_end = Range::from_bounds(Some(0), None).unwrap();

        assert!(open_begin < bounded);
        assert!(bounded < open_end);
        assert_eq!(Range::UNBOUNDED.len(), None);
    }

    #[test]
    fn test_overlap_and_union() {
        let a = Range::new(0, 5).unwrap();
        let b = Range::new(5, 9).unwrap();
        let c = Range::new(3, 6).unwrap();

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(Range::UNBOUNDED.overlaps(&a));
        assert_eq!(a.union(&b), Range::new(0, 9).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Range::new(2, 7).unwrap()), "(2,7)");
        assert_eq!(format!("{}", Range::UNBOUNDED), "(-inf,inf)");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn bound() -> impl Strategy<Value = Option<u32>> {
            prop::option::of(0u32..50)
        }

        fn range() -> impl Strategy<Value = Range> {
            (bound(), bound()).prop_map(|(b, e)| match (b, e) {
                (Some(b), Some(e)) => Range {
                    begin: Some(b.min(e)),
                    end: Some(b.max(e)),
                },
                _ => Range { begin: b, end: e },
            })
        }

        proptest! {
            #[test]
            fn union_covers_both(a in range(), b in range()) {
                let u = a.union(&b);
                prop_assert!(u.begin_key() <= a.begin_key().min(b.begin_key()));
                prop_assert!(u.end_key() >= a.end_key().max(b.end_key()));
                prop_assert_eq!(u, b.union(&a));
            }

            #[test]
            fn overlap_is_symmetric(a in range(), b in range()) {
                prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
            }

            #[test]
            fn order_is_consistent_with_eq(a in range(), b in range()) {
                prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
            }
        }
    }
}
