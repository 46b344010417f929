use crate::config::RuleParams;
use crate::finding::Confidence;

/// Ordered threshold ladder mapping a resource age onto a confidence
/// tier. Tiers are checked from HIGH down; the first matching breakpoint
/// wins, and boundaries are inclusive (`>=`). An unknown age never
/// reaches any tier here; callers decide whether unknown means "skip"
/// or "cap at a lower tier", but it can never mean HIGH.
///
/// This is the single implementation every rule goes through, so the
/// evaluation order and boundary behaviour cannot drift between rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceLadder {
    pub high_days: Option<i64>,
    pub medium_days: Option<i64>,
}

impl ConfidenceLadder {
    pub fn from_params(params: &RuleParams) -> Self {
        Self {
            high_days: params.high_days,
            medium_days: params.medium_days,
        }
    }

    /// Classify an age in days. `None` age or no matching breakpoint
    /// yields no tier.
    pub fn classify(&self, age_days: Option<i64>) -> Option<Confidence> {
        let age = age_days?;
        if let Some(high) = self.high_days {
            if age >= high {
                return Some(Confidence::High);
            }
        }
        if let Some(medium) = self.medium_days {
            if age >= medium {
                return Some(Confidence::Medium);
            }
        }
        None
    }

    /// Classify, but never above `cap`. Used by rules whose signal is a
    /// proxy (e.g. creation age standing in for detached duration).
    pub fn classify_capped(&self, age_days: Option<i64>, cap: Confidence) -> Option<Confidence> {
        self.classify(age_days).map(|tier| tier.min(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ladder(high: i64, medium: i64) -> ConfidenceLadder {
        ConfidenceLadder {
            high_days: Some(high),
            medium_days: Some(medium),
        }
    }

    #[test]
    fn boundaries_are_inclusive_toward_higher_tier() {
        let l = ladder(14, 7);
        assert_eq!(l.classify(Some(14)), Some(Confidence::High));
        assert_eq!(l.classify(Some(13)), Some(Confidence::Medium));
        assert_eq!(l.classify(Some(7)), Some(Confidence::Medium));
        assert_eq!(l.classify(Some(6)), None);
    }

    #[test]
    fn unknown_age_never_classifies() {
        assert_eq!(ladder(14, 7).classify(None), None);
    }

    #[test]
    fn missing_medium_tier_skips_to_none() {
        let l = ConfidenceLadder {
            high_days: Some(30),
            medium_days: None,
        };
        assert_eq!(l.classify(Some(30)), Some(Confidence::High));
        assert_eq!(l.classify(Some(29)), None);
    }

    #[test]
    fn zero_high_threshold_flags_any_known_age() {
        let l = ConfidenceLadder {
            high_days: Some(0),
            medium_days: None,
        };
        assert_eq!(l.classify(Some(0)), Some(Confidence::High));
        assert_eq!(l.classify(None), None);
    }

    #[test]
    fn cap_limits_the_tier() {
        let l = ladder(14, 7);
        assert_eq!(
            l.classify_capped(Some(100), Confidence::Medium),
            Some(Confidence::Medium)
        );
        assert_eq!(
            l.classify_capped(Some(8), Confidence::Medium),
            Some(Confidence::Medium)
        );
        assert_eq!(l.classify_capped(Some(2), Confidence::Medium), None);
    }

    proptest! {
        // For h > m: age >= h is HIGH, m <= age < h is MEDIUM, age < m
        // is nothing.
        #[test]
        fn tier_assignment_matches_interval(
            medium in 1i64..400,
            gap in 1i64..400,
            age in 0i64..2000,
        ) {
            let high = medium + gap;
            let l = ladder(high, medium);
            let tier = l.classify(Some(age));
            if age >= high {
                prop_assert_eq!(tier, Some(Confidence::High));
            } else if age >= medium {
                prop_assert_eq!(tier, Some(Confidence::Medium));
            } else {
                prop_assert_eq!(tier, None);
            }
        }

        #[test]
        fn classification_is_deterministic(high in 0i64..500, medium in 0i64..500, age in 0i64..1000) {
            let l = ladder(high, medium);
            prop_assert_eq!(l.classify(Some(age)), l.classify(Some(age)));
        }
    }
}
