// THEORY:
// Both pipelines contain a geometric alignment step that can legitimately fail
// (no scale produced a usable template, too few keypoint matches, a degenerate
// homography). The pipelines still have to produce an output in that case, so
// the fallback raster is returned as usual, but the fact that alignment did
// not happen travels next to it as an `AlignmentOutcome` instead of being
// silently swallowed. Callers decide whether to log, report or ignore it.

use std::fmt;

/// Why an alignment step fell back to its identity/background result.
#[derive(Debug, Clone, PartialEq)]
pub enum UnalignedReason {
    /// Every scale in the search range produced an empty or oversized template.
    NoValidScale,
    /// The best normalized correlation never rose above zero.
    NonPositiveScore(f64),
    /// One of the two images yielded no keypoint descriptors.
    NoDescriptors,
    /// Fewer matches than a homography needs survived filtering.
    TooFewMatches(usize),
    /// Robust estimation found no consistent, invertible homography.
    DegenerateHomography,
}

impl fmt::Display for UnalignedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnalignedReason::NoValidScale => write!(f, "no scale produced a valid template"),
            UnalignedReason::NonPositiveScore(score) => {
                write!(f, "best correlation score {score:.4} is not positive")
            }
            UnalignedReason::NoDescriptors => write!(f, "no keypoint descriptors found"),
            UnalignedReason::TooFewMatches(n) => write!(f, "only {n} matches survived filtering"),
            UnalignedReason::DegenerateHomography => write!(f, "homography estimation failed"),
        }
    }
}

/// The tagged result of an alignment step.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome<T> {
    Aligned(T),
    Unaligned(UnalignedReason),
}

impl<T> AlignmentOutcome<T> {
    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignmentOutcome::Aligned(_))
    }

    pub fn aligned(&self) -> Option<&T> {
        match self {
            AlignmentOutcome::Aligned(value) => Some(value),
            AlignmentOutcome::Unaligned(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&UnalignedReason> {
        match self {
            AlignmentOutcome::Aligned(_) => None,
            AlignmentOutcome::Unaligned(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_follow_the_variant() {
        let ok: AlignmentOutcome<u8> = AlignmentOutcome::Aligned(3);
        assert!(ok.is_aligned());
        assert_eq!(ok.aligned(), Some(&3));
        assert!(ok.reason().is_none());

        let failed: AlignmentOutcome<u8> = AlignmentOutcome::Unaligned(UnalignedReason::TooFewMatches(2));
        assert!(!failed.is_aligned());
        assert_eq!(failed.reason().map(|r| r.to_string()).as_deref(), Some("only 2 matches survived filtering"));
    }
}
