//! Pure scoring functions: no I/O, no side effects.
//!
//! Popularity weights mirror the product formula used for the popular
//! recall strategy; the language multiplier is applied once at composition
//! time, never inside individual strategies.

use crate::models::InteractionCounts;

pub const VIEW_WEIGHT: f64 = 1.0;
pub const LIKE_WEIGHT: f64 = 5.0;
pub const COMMENT_WEIGHT: f64 = 3.0;
pub const SAVE_WEIGHT: f64 = 7.0;
pub const SHARE_WEIGHT: f64 = 10.0;

pub const LANGUAGE_MATCH_WEIGHT: f64 = 2.0;
pub const LANGUAGE_MISMATCH_WEIGHT: f64 = 0.5;

/// Engagement-weighted popularity. Missing counters default to zero
/// upstream, so this is total on all inputs.
pub fn popularity_score(counts: &InteractionCounts) -> f64 {
    counts.view_count as f64 * VIEW_WEIGHT
        + counts.like_count as f64 * LIKE_WEIGHT
        + counts.comment_count as f64 * COMMENT_WEIGHT
        + counts.save_count as f64 * SAVE_WEIGHT
        + counts.share_count as f64 * SHARE_WEIGHT
}

/// Language multiplier relative to the user's preferred language.
/// No preference (anonymous user, following feed) weighs everything equally.
pub fn language_weight(preferred: Option<&str>, content_language: &str) -> f64 {
    match preferred {
        Some(preferred) if preferred == content_language => LANGUAGE_MATCH_WEIGHT,
        Some(_) => LANGUAGE_MISMATCH_WEIGHT,
        None => 1.0,
    }
}

pub fn final_score(raw_score: f64, preferred: Option<&str>, content_language: &str) -> f64 {
    raw_score * language_weight(preferred, content_language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popularity_formula() {
        let counts = InteractionCounts {
            view_count: 10,
            like_count: 2,
            comment_count: 3,
            save_count: 1,
            share_count: 1,
        };
        // 10*1 + 2*5 + 3*3 + 1*7 + 1*10
        assert_eq!(popularity_score(&counts), 46.0);
    }

    #[test]
    fn test_popularity_defaults_to_zero() {
        assert_eq!(popularity_score(&InteractionCounts::default()), 0.0);
    }

    #[test]
    fn test_language_weight_ratio() {
        // Matching content scores 4x a mismatched equivalent
        let matched = final_score(1.0, Some("ko"), "ko");
        let mismatched = final_score(1.0, Some("ko"), "en");
        assert_eq!(matched, 2.0);
        assert_eq!(mismatched, 0.5);
        assert_eq!(matched / mismatched, 4.0);
    }

    #[test]
    fn test_no_preference_is_neutral() {
        assert_eq!(language_weight(None, "ko"), 1.0);
        assert_eq!(final_score(3.5, None, "en"), 3.5);
    }
}
