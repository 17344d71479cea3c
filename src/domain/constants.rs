//! Domain constants for extraction, repair and the quality gate
//!
//! Runtime-tunable values (delays, attempt ceilings, cooldowns) have their
//! defaults in `infrastructure::config::defaults`; the values here are rules of
//! the domain itself.

/// Pattern store confidence bookkeeping
pub mod patterns {
    /// Upper bound of a pattern confidence
    pub const MAX_CONFIDENCE: u8 = 100;

    /// Added when the top-ranked selector is confirmed
    pub const CONFIDENCE_SUCCESS_BONUS: u8 = 5;

    /// Subtracted when a selector is reported as failing
    pub const CONFIDENCE_FAILURE_PENALTY: u8 = 10;

    /// Longest selector list kept per field
    pub const MAX_SELECTORS_PER_FIELD: usize = 5;

    /// Confidence right after a repair, below a long-proven selector
    pub const HEALED_CONFIDENCE_BASELINE: u8 = 80;
}

/// Record normalization limits
pub mod validation {
    /// Highest discount accepted
    pub const MAX_DISCOUNT_PERCENT: i32 = 95;

    /// Ratings are on a five-star scale
    pub const MAX_RATING: f64 = 5.0;

    /// Review counts above this are treated as parse noise and capped
    pub const MAX_REVIEW_COUNT: i64 = 999_999;
}

/// Quality score penalties, each applied independently
pub mod quality {
    pub const BASE_SCORE: i32 = 100;
    pub const MISSING_RATING_PENALTY: i32 = 15;
    pub const NO_REVIEWS_PENALTY: i32 = 10;
    pub const EMPTY_SPECS_PENALTY: i32 = 20;
    pub const FEW_SPECS_PENALTY: i32 = 10;
    pub const FEW_SPECS_THRESHOLD: usize = 3;
    pub const NO_DISCOUNT_PENALTY: i32 = 5;
    pub const NO_IMAGE_PENALTY: i32 = 10;
    pub const SHORT_TITLE_PENALTY: i32 = 10;
    pub const SHORT_TITLE_CHARS: usize = 20;

    /// Records scoring below this are never persisted
    pub const ACCEPTANCE_THRESHOLD: i32 = 30;
}
