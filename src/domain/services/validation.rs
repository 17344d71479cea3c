//! Validation and quality scoring
//!
//! Single chokepoint between extraction and persistence. Normalization runs in a
//! fixed order (price, original price, inversion fix, discount, rating, reviews,
//! specifications) and the quality score decides acceptance.

use serde_json::Value;
use thiserror::Error;

use crate::domain::constants::quality::{
    ACCEPTANCE_THRESHOLD, BASE_SCORE, EMPTY_SPECS_PENALTY, FEW_SPECS_PENALTY, FEW_SPECS_THRESHOLD,
    MISSING_RATING_PENALTY, NO_DISCOUNT_PENALTY, NO_IMAGE_PENALTY, NO_REVIEWS_PENALTY, SHORT_TITLE_CHARS,
    SHORT_TITLE_PENALTY,
};
use crate::domain::constants::validation::{MAX_DISCOUNT_PERCENT, MAX_RATING, MAX_REVIEW_COUNT};
use crate::domain::product::{CandidateRecord, Specifications, ValidatedProduct};

/// Why a candidate never reached persistence
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationRejection {
    #[error("current price missing or not positive: {0:?}")]
    InvalidPrice(Option<f64>),

    #[error("quality score {score} below acceptance threshold")]
    LowQuality { score: i32 },
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn specifications_from(value: Option<Value>) -> Specifications {
    let Some(Value::Object(map)) = value else {
        return Specifications::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect()
}

/// Penalties subtracted independently from 100, floored at 0.
///
/// An empty mapping triggers both the empty and the fewer-than-three penalty.
pub fn quality_score(
    rating: Option<f64>,
    review_count: i64,
    specifications: &Specifications,
    discount_percent: i32,
    image_url: Option<&str>,
    title: &str,
) -> i32 {
    let mut score = BASE_SCORE;
    if rating.is_none() {
        score -= MISSING_RATING_PENALTY;
    }
    if review_count == 0 {
        score -= NO_REVIEWS_PENALTY;
    }
    if specifications.is_empty() {
        score -= EMPTY_SPECS_PENALTY;
    }
    if specifications.len() < FEW_SPECS_THRESHOLD {
        score -= FEW_SPECS_PENALTY;
    }
    if discount_percent == 0 {
        score -= NO_DISCOUNT_PENALTY;
    }
    if image_url.is_none_or(|url| url.trim().is_empty()) {
        score -= NO_IMAGE_PENALTY;
    }
    if title.chars().count() < SHORT_TITLE_CHARS {
        score -= SHORT_TITLE_PENALTY;
    }
    score.max(0)
}

/// Normalize a raw candidate and apply the quality gate
pub fn normalize_candidate(candidate: CandidateRecord) -> Result<ValidatedProduct, ValidationRejection> {
    let mut current_price =
        positive(candidate.current_price).ok_or(ValidationRejection::InvalidPrice(candidate.current_price))?;
    let mut original_price = positive(candidate.original_price).unwrap_or(current_price);

    let mut discount = candidate.discount_percent.filter(|d| d.is_finite());
    if original_price < current_price {
        std::mem::swap(&mut original_price, &mut current_price);
        discount = Some(((original_price - current_price) / original_price * 100.0).round());
    }
    let discount_percent = discount.map_or(0, |d| d.round().clamp(0.0, f64::from(MAX_DISCOUNT_PERCENT)) as i32);

    let rating = candidate
        .rating
        .filter(|r| r.is_finite() && (0.0..=MAX_RATING).contains(r));
    let review_count = candidate.review_count.unwrap_or(0).clamp(0, MAX_REVIEW_COUNT);
    let specifications = specifications_from(candidate.specifications);

    let quality_score = quality_score(
        rating,
        review_count,
        &specifications,
        discount_percent,
        candidate.image_url.as_deref(),
        &candidate.title,
    );
    if quality_score < ACCEPTANCE_THRESHOLD {
        return Err(ValidationRejection::LowQuality { score: quality_score });
    }

    Ok(ValidatedProduct {
        source: candidate.source,
        product_id: candidate.product_id,
        title: candidate.title,
        brand: candidate.brand,
        category: candidate.category,
        subcategory: candidate.subcategory,
        image_url: candidate.image_url,
        url: candidate.url,
        current_price,
        original_price,
        discount_percent,
        available: candidate.available,
        rating,
        review_count,
        specifications,
        quality_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rich_candidate() -> CandidateRecord {
        CandidateRecord {
            source: "shopmart".into(),
            product_id: "SKU-1".into(),
            title: "Phone X 8GB RAM 128GB 5000mAh 5G".into(),
            current_price: Some(900.0),
            original_price: Some(1000.0),
            discount_percent: Some(10.0),
            rating: Some(4.4),
            review_count: Some(120),
            image_url: Some("https://img.test/x.jpg".into()),
            specifications: Some(json!({"ram": "8GB", "storage": "128GB", "battery": "5000mAh"})),
            available: true,
            ..CandidateRecord::default()
        }
    }

    /// Null rating, no reviews, empty specs, no image, long title, non-zero discount
    fn degraded_candidate() -> CandidateRecord {
        CandidateRecord {
            rating: None,
            review_count: Some(0),
            specifications: None,
            image_url: None,
            title: "A sufficiently long product title".into(),
            ..rich_candidate()
        }
    }

    #[test]
    fn rejects_missing_or_non_positive_price() {
        for price in [None, Some(0.0), Some(-5.0), Some(f64::NAN)] {
            let candidate = CandidateRecord {
                current_price: price,
                ..rich_candidate()
            };
            assert!(matches!(
                normalize_candidate(candidate),
                Err(ValidationRejection::InvalidPrice(_))
            ));
        }
    }

    #[test]
    fn inverted_prices_are_swapped_and_discount_recomputed() {
        let candidate = CandidateRecord {
            current_price: Some(1000.0),
            original_price: Some(800.0),
            discount_percent: Some(3.0),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.original_price, 1000.0);
        assert_eq!(product.current_price, 800.0);
        assert_eq!(product.discount_percent, 20);
    }

    #[test]
    fn missing_original_price_defaults_to_current() {
        let candidate = CandidateRecord {
            original_price: None,
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.original_price, product.current_price);
    }

    #[test]
    fn out_of_range_rating_is_nulled_not_rejected() {
        let candidate = CandidateRecord {
            rating: Some(7.0),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.rating, None);
    }

    #[test]
    fn discount_and_reviews_are_clamped() {
        let candidate = CandidateRecord {
            discount_percent: Some(99.0),
            review_count: Some(5_000_000),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.discount_percent, 95);
        assert_eq!(product.review_count, 999_999);

        let candidate = CandidateRecord {
            discount_percent: Some(-4.0),
            review_count: Some(-3),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.discount_percent, 0);
        assert_eq!(product.review_count, 0);
    }

    #[test]
    fn non_mapping_specifications_become_empty() {
        let candidate = CandidateRecord {
            specifications: Some(json!(["ram", "8GB"])),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert!(product.specifications.is_empty());
    }

    #[test]
    fn non_string_specification_values_are_stringified() {
        let candidate = CandidateRecord {
            specifications: Some(json!({"refresh_rate": 120, "nfc": true, "weight": null})),
            ..rich_candidate()
        };
        let product = normalize_candidate(candidate).unwrap();
        assert_eq!(product.specifications.get("refresh_rate").map(String::as_str), Some("120"));
        assert_eq!(product.specifications.get("nfc").map(String::as_str), Some("true"));
        assert!(!product.specifications.contains_key("weight"));
    }

    #[test]
    fn stacked_penalties_at_the_gate() {
        // 100 - 15 (rating) - 10 (reviews) - 20 (empty specs) - 10 (< 3 specs) - 10 (image)
        let product = normalize_candidate(degraded_candidate()).unwrap();
        assert_eq!(product.quality_score, 35);

        // ... and a zero discount (-5) lands exactly on the threshold
        let at_threshold = CandidateRecord {
            discount_percent: None,
            original_price: None,
            ..degraded_candidate()
        };
        assert_eq!(normalize_candidate(at_threshold).unwrap().quality_score, 30);

        // ... a short title (-10) on top drops it below
        let rejected = CandidateRecord {
            discount_percent: None,
            original_price: None,
            title: "Phone X 15 char".into(),
            ..degraded_candidate()
        };
        assert_eq!(
            normalize_candidate(rejected),
            Err(ValidationRejection::LowQuality { score: 20 })
        );
    }

    #[test]
    fn every_penalty_together_leaves_twenty() {
        let specs = Specifications::new();
        assert_eq!(quality_score(None, 0, &specs, 0, None, "x"), 20);
        // a blank image URL counts as missing
        assert_eq!(quality_score(None, 0, &specs, 0, Some("  "), "x"), 20);
    }

    proptest! {
        #[test]
        fn accepted_records_hold_invariants(
            current in proptest::option::of(-100.0f64..5000.0),
            original in proptest::option::of(-100.0f64..5000.0),
            discount in proptest::option::of(-50.0f64..200.0),
            rating in proptest::option::of(-2.0f64..10.0),
            reviews in proptest::option::of(-10i64..2_000_000),
        ) {
            let candidate = CandidateRecord {
                current_price: current,
                original_price: original,
                discount_percent: discount,
                rating,
                review_count: reviews,
                ..rich_candidate()
            };
            if let Ok(product) = normalize_candidate(candidate) {
                prop_assert!((0..=95).contains(&product.discount_percent));
                prop_assert!(product.rating.is_none_or(|r| (0.0..=5.0).contains(&r)));
                prop_assert!(product.review_count >= 0);
                prop_assert!(product.current_price <= product.original_price);
                prop_assert!((0..=100).contains(&product.quality_score));
            }
        }
    }
}
