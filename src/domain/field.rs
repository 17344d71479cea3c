//! Field catalogue for listing extraction
//!
//! Every field a listing card can carry is described once here: its name in the
//! pattern store, the description handed to the selector-inference service, and
//! the kind that decides how a matched element is turned into a value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::markup::MarkupElement;

/// How a matched sub-element becomes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed text content
    Text,
    /// `href` attribute
    Link,
    /// `src` (or lazy-load variants) attribute
    Image,
    /// Monetary amount, currency symbols and separators stripped
    Price,
    /// Non-negative count such as "(1,234)" or "2.1k ratings"
    Count,
    /// Decimal such as "4.3 out of 5"
    Decimal,
    /// Stock flag; text mentioning "out of stock" and friends reads as false
    Availability,
}

/// A single extracted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Non-null, non-empty and not a failed numeric parse
    pub fn is_usable(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::Number(n) => n.is_finite(),
            Self::Flag(_) => true,
        }
    }
}

/// Static description of one listing field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    /// Whether a miss on this field may trigger a selector repair.
    /// Fields that are legitimately absent on many cards stay false.
    pub healable: bool,
}

pub const PRODUCT_ID: FieldSpec = FieldSpec {
    name: "product_id",
    description: "element carrying the product identifier (SKU, ASIN or item id) as its text",
    kind: FieldKind::Text,
    healable: false,
};

pub const TITLE: FieldSpec = FieldSpec {
    name: "title",
    description: "the product title / name shown on the listing card",
    kind: FieldKind::Text,
    healable: true,
};

pub const BRAND: FieldSpec = FieldSpec {
    name: "brand",
    description: "the brand or manufacturer name",
    kind: FieldKind::Text,
    healable: false,
};

pub const PRICE: FieldSpec = FieldSpec {
    name: "price",
    description: "the current selling price",
    kind: FieldKind::Price,
    healable: true,
};

pub const ORIGINAL_PRICE: FieldSpec = FieldSpec {
    name: "original_price",
    description: "the struck-through list price before discount",
    kind: FieldKind::Price,
    healable: false,
};

pub const DISCOUNT: FieldSpec = FieldSpec {
    name: "discount",
    description: "the discount percentage badge, e.g. '20% off'",
    kind: FieldKind::Decimal,
    healable: false,
};

pub const RATING: FieldSpec = FieldSpec {
    name: "rating",
    description: "the average star rating out of 5",
    kind: FieldKind::Decimal,
    healable: true,
};

pub const REVIEW_COUNT: FieldSpec = FieldSpec {
    name: "review_count",
    description: "the number of ratings or reviews",
    kind: FieldKind::Count,
    healable: true,
};

pub const IMAGE: FieldSpec = FieldSpec {
    name: "image",
    description: "the main product image (an img element)",
    kind: FieldKind::Image,
    healable: true,
};

pub const URL: FieldSpec = FieldSpec {
    name: "url",
    description: "the link to the product detail page (an anchor element)",
    kind: FieldKind::Link,
    healable: true,
};

pub const AVAILABILITY: FieldSpec = FieldSpec {
    name: "availability",
    description: "the stock status text, e.g. 'In stock' or 'Currently unavailable'",
    kind: FieldKind::Availability,
    healable: false,
};

pub const SUBCATEGORY: FieldSpec = FieldSpec {
    name: "subcategory",
    description: "the sub-category or department label",
    kind: FieldKind::Text,
    healable: false,
};

/// All fields extracted from a listing card, in extraction order
pub const LISTING_FIELDS: &[FieldSpec] = &[
    PRODUCT_ID,
    TITLE,
    BRAND,
    PRICE,
    ORIGINAL_PRICE,
    DISCOUNT,
    RATING,
    REVIEW_COUNT,
    IMAGE,
    URL,
    AVAILABILITY,
    SUBCATEGORY,
];

static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").expect("valid number regex"));
static COUNT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,.]*)\s*([km])?\b").expect("valid count regex"));

const OUT_OF_STOCK_MARKERS: &[&str] = &[
    "out of stock",
    "sold out",
    "unavailable",
    "not available",
    "coming soon",
    "notify me",
];

/// Parse a monetary amount from noisy text ("₹1,299.00", "$ 12", "1.299,00 €")
pub fn parse_price(text: &str) -> Option<f64> {
    let token = NUMBER_TOKEN.find(text)?.as_str().trim_end_matches(['.', ',']);
    normalize_number(token)
}

/// Parse a count such as "(1,234)", "2.1k ratings" or "15 reviews"
pub fn parse_count(text: &str) -> Option<f64> {
    let caps = COUNT_TOKEN.captures(text)?;
    let digits = caps.get(1)?.as_str().trim_end_matches(['.', ',']);
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) if suffix == "k" => 1_000.0,
        Some(suffix) if suffix == "m" => 1_000_000.0,
        _ => 1.0,
    };
    if multiplier > 1.0 {
        let base: f64 = digits.replace(',', ".").parse().ok()?;
        return Some((base * multiplier).round());
    }
    digits.replace([',', '.'], "").parse().ok()
}

/// Parse the first decimal in the text ("4.3 out of 5 stars" -> 4.3, "20% off" -> 20)
pub fn parse_decimal(text: &str) -> Option<f64> {
    let token = NUMBER_TOKEN.find(text)?.as_str().trim_end_matches(['.', ',']);
    token.replace(',', ".").parse().ok()
}

/// Interpret availability text
pub fn parse_availability(text: &str) -> bool {
    let lowered = text.to_lowercase();
    !OUT_OF_STOCK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn normalize_number(token: &str) -> Option<f64> {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');
    let cleaned = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(comma)) if token.len() - comma == 3 && token.matches(',').count() == 1 => {
            token.replace(',', ".")
        }
        (None, Some(_)) => token.replace(',', ""),
        (Some(dot), None) if token.matches('.').count() > 1 || token.len() - dot == 4 => {
            token.replace('.', "")
        }
        _ => token.to_string(),
    };
    cleaned.parse().ok()
}

/// Extraction function applied to each sub-element a selector matches.
///
/// Returns `None` for empty text, missing attributes and failed numeric parses so
/// the resolver moves on to the next match or selector.
pub fn extract_value<E: MarkupElement>(kind: FieldKind, element: &E) -> Option<FieldValue> {
    let value = match kind {
        FieldKind::Text => Some(FieldValue::Text(collapse_whitespace(&element.text()))),
        FieldKind::Link => element.attr("href").map(FieldValue::Text),
        FieldKind::Image => ["src", "data-src", "data-old-hires", "srcset"]
            .iter()
            .find_map(|name| element.attr(name))
            .and_then(|raw| raw.split_whitespace().next().map(str::to_string))
            .map(FieldValue::Text),
        FieldKind::Price => parse_price(&element.text())
            .or_else(|| element.attr("content").as_deref().and_then(parse_price))
            .map(FieldValue::Number),
        FieldKind::Count => parse_count(&element.text())
            .or_else(|| element.attr("aria-label").as_deref().and_then(parse_count))
            .map(FieldValue::Number),
        FieldKind::Decimal => parse_decimal(&element.text())
            .or_else(|| element.attr("aria-label").as_deref().and_then(parse_decimal))
            .or_else(|| element.attr("title").as_deref().and_then(parse_decimal))
            .map(FieldValue::Number),
        FieldKind::Availability => {
            let text = element.text();
            if text.trim().is_empty() {
                None
            } else {
                Some(FieldValue::Flag(parse_availability(&text)))
            }
        }
    };
    value.filter(FieldValue::is_usable)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
