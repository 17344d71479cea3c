//! Title attribute inference
//!
//! Listing titles carry most of the specification a card never shows in
//! structured form ("Phone X 8GB RAM 128GB 5000mAh 5G"). Every attribute has its
//! own ordered list of case-insensitive patterns and the first pattern that
//! yields a value wins. Attributes never depend on each other, so a rule can be
//! added or changed without touching the rest.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::product::Specifications;

type Render = fn(&Captures<'_>, &str) -> Option<String>;

struct TitlePattern {
    regex: Regex,
    render: Render,
}

struct AttributeRule {
    key: &'static str,
    patterns: Vec<TitlePattern>,
}

fn pattern(expr: &str, render: Render) -> TitlePattern {
    TitlePattern {
        regex: Regex::new(expr).unwrap_or_else(|e| panic!("invalid title pattern {expr}: {e}")),
        render,
    }
}

fn group(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index).map(|m| m.as_str().trim().to_string())
}

fn gigabytes(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{}GB", group(caps, 1)?))
}

fn sized(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{}{}", group(caps, 1)?, group(caps, 2)?.to_uppercase()))
}

/// Generic "<n>GB" that is not the RAM figure
///
/// A figure is the RAM figure when it lies inside a span matched by one of the
/// RAM patterns, e.g. "8GB RAM" or "RAM 4GB". A figure that merely follows such
/// a span ("8GB RAM 128GB") is storage.
fn storage_not_ram(caps: &Captures<'_>, title: &str) -> Option<String> {
    let whole = caps.get(0)?;
    let inside_ram = RAM_PATTERNS
        .iter()
        .flat_map(|p| p.regex.find_iter(title))
        .any(|ram| ram.start() < whole.end() && whole.start() < ram.end());
    if inside_ram {
        return None;
    }
    sized(caps, title)
}

fn inches(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{} inch", group(caps, 1)?))
}

fn milliamp_hours(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{}mAh", group(caps, 1)?))
}

fn upper(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(group(caps, 1)?.to_uppercase())
}

fn megapixels(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{}MP", group(caps, 1)?))
}

fn collapsed(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(title_case(&group(caps, 1)?))
}

fn operating_system(caps: &Captures<'_>, _: &str) -> Option<String> {
    let name = group(caps, 1)?;
    let canonical = match name.to_lowercase().as_str() {
        "android" => "Android".to_string(),
        "ios" => "iOS".to_string(),
        "ipados" => "iPadOS".to_string(),
        "harmonyos" => "HarmonyOS".to_string(),
        "hyperos" => "HyperOS".to_string(),
        "one ui" => "One UI".to_string(),
        "windows" => "Windows".to_string(),
        other => title_case(other),
    };
    match group(caps, 2) {
        Some(version) if !version.is_empty() => Some(format!("{canonical} {version}")),
        _ => Some(canonical),
    }
}

fn hertz(caps: &Captures<'_>, _: &str) -> Option<String> {
    Some(format!("{}Hz", group(caps, 1)?))
}

fn watts(caps: &Captures<'_>, _: &str) -> Option<String> {
    let watts: u32 = group(caps, 1)?.parse().ok()?;
    (5..=300).contains(&watts).then(|| format!("{watts}W"))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn ram_patterns() -> Vec<TitlePattern> {
    vec![
        pattern(r"(?i)\b(\d{1,2})\s*GB\s*(?:of\s*)?RAM\b", gigabytes),
        pattern(r"(?i)\bRAM\s*[:\-]?\s*(\d{1,2})\s*GB\b", gigabytes),
        pattern(r"(?i)\b(\d{1,2})\s*(?:GB)?\s*[+/]\s*\d{2,4}\s*(?:GB|TB)\b", gigabytes),
    ]
}

static RAM_PATTERNS: Lazy<Vec<TitlePattern>> = Lazy::new(ram_patterns);

static RULES: Lazy<Vec<AttributeRule>> = Lazy::new(|| {
    vec![
        AttributeRule {
            key: "ram",
            patterns: ram_patterns(),
        },
        AttributeRule {
            key: "storage",
            patterns: vec![
                pattern(r"(?i)\b(\d{1,4})\s*(GB|TB)\s*(?:ROM|storage|internal|SSD|UFS)\b", sized),
                pattern(r"(?i)\b\d{1,2}\s*(?:GB)?\s*[+/]\s*(\d{1,4})\s*(GB|TB)\b", sized),
                pattern(r"(?i)\b(\d{1,4})\s*(GB|TB)\b", storage_not_ram),
            ],
        },
        AttributeRule {
            key: "display",
            patterns: vec![
                pattern(r#"(?i)\b(\d{1,2}(?:\.\d{1,2})?)\s*(?:-\s*)?(?:inch(?:es)?\b|"|”)"#, inches),
                pattern(r"(?i)\b(\d{1,2}(?:\.\d{1,2})?)\s*cm\s*\((\d{1,2}(?:\.\d{1,2})?)\s*inch", |caps, _| {
                    Some(format!("{} inch", group(caps, 2)?))
                }),
            ],
        },
        AttributeRule {
            key: "battery",
            patterns: vec![
                pattern(r"(?i)\b(\d{3,5})\s*mAh\b", milliamp_hours),
                pattern(r"(?i)\bbattery\s*[:\-]?\s*(\d{3,5})\b", milliamp_hours),
            ],
        },
        AttributeRule {
            key: "connectivity",
            patterns: vec![
                pattern(r"(?i)\b(5G)\b", upper),
                pattern(r"(?i)\b(4G)\b", upper),
                pattern(r"(?i)\b(LTE|VoLTE)\b", upper),
            ],
        },
        AttributeRule {
            key: "camera",
            patterns: vec![
                pattern(r"(?i)\b(\d{1,3}(?:\.\d)?)\s*MP\b", megapixels),
                pattern(r"(?i)\b(\d{1,3})\s*mega\s*pixels?\b", megapixels),
            ],
        },
        AttributeRule {
            key: "processor",
            patterns: vec![
                pattern(
                    r"(?i)\b(Snapdragon\s+\d+\w*(?:\s+Gen\s*\d)?|Dimensity\s+\d+\w*|Helio\s+[A-Z]?\d+|Exynos\s+\d+|A\d{2}\s+(?:Pro\s+)?Bionic|Tensor(?:\s+G\d)?|Unisoc\s+\w+|Kirin\s+\d+)",
                    |caps, _| group(caps, 1).map(|p| p.split_whitespace().collect::<Vec<_>>().join(" ")),
                ),
                pattern(r"(?i)\b(octa[- ]core|hexa[- ]core|quad[- ]core)\b", collapsed),
            ],
        },
        AttributeRule {
            key: "os",
            patterns: vec![
                pattern(r"(?i)\b(Android|iPadOS|iOS)\s*(\d{1,2}(?:\.\d)?)\b", operating_system),
                pattern(r"(?i)\b(HarmonyOS|HyperOS|One UI|Windows)\s*(\d{1,2}(?:\.\d)?)?", operating_system),
            ],
        },
        AttributeRule {
            key: "refresh_rate",
            patterns: vec![pattern(r"(?i)\b(\d{2,3})\s*Hz\b", hertz)],
        },
        AttributeRule {
            key: "charging",
            patterns: vec![
                pattern(r"(?i)\b(\d{1,3})\s*W\s*(?:fast|super|turbo|flash|dart|warp|supervooc)?\s*charg", watts),
                pattern(r"(?i)\b(\d{1,3})\s*W\b", watts),
            ],
        },
        AttributeRule {
            key: "color",
            patterns: vec![pattern(
                r"(?i)\b(Midnight Black|Phantom Black|Space Gr[ae]y|Rose Gold|Sky Blue|Ocean Blue|Forest Green|Black|White|Blue|Green|Red|Silver|Gold|Grey|Gray|Purple|Pink|Yellow|Orange|Graphite|Titanium|Bronze|Violet|Lavender|Mint|Cream|Beige)\b",
                collapsed,
            )],
        },
    ]
});

/// Attributes recognised in `title`; attributes without a match are simply absent
pub fn infer_attributes(title: &str) -> Specifications {
    let mut attributes = Specifications::new();
    for rule in RULES.iter() {
        let value = rule.patterns.iter().find_map(|p| {
            p.regex
                .captures_iter(title)
                .find_map(|caps| (p.render)(&caps, title))
        });
        if let Some(value) = value {
            attributes.insert(rule.key.to_string(), value);
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn phone_title_yields_exactly_the_listed_attributes() {
        let specs = infer_attributes("Phone X 8GB RAM 128GB 5000mAh 5G");
        let expected: Specifications = [
            ("ram", "8GB"),
            ("storage", "128GB"),
            ("battery", "5000mAh"),
            ("connectivity", "5G"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(specs, expected);
    }

    #[rstest]
    #[case("Galaxy M34 5G (Midnight Blue, 6GB/128GB)", "ram", "6GB")]
    #[case("Galaxy M34 5G (Midnight Blue, 6GB/128GB)", "storage", "128GB")]
    #[case("Redmi Note 13 (8GB RAM, 256GB Storage) 6.67 inch AMOLED", "display", "6.67 inch")]
    #[case("Pixel 8 with Tensor G3, 50MP camera", "processor", "Tensor G3")]
    #[case("Pixel 8 with Tensor G3, 50MP camera", "camera", "50MP")]
    #[case("Nord CE 3 Lite | Snapdragon 695 | 120Hz display", "refresh_rate", "120Hz")]
    #[case("Nord CE 3 Lite | Snapdragon 695 | 120Hz display", "processor", "Snapdragon 695")]
    #[case("Moto G54 Android 14 with 33W TurboPower charging", "os", "Android 14")]
    #[case("Moto G54 Android 14 with 33W TurboPower charging", "charging", "33W")]
    #[case("iPhone 15 (128 GB) - Black", "color", "Black")]
    #[case("Laptop 16GB RAM 1TB SSD", "storage", "1TB")]
    #[case("Tablet RAM 4GB 64GB 4G LTE", "ram", "4GB")]
    #[case("Tablet RAM 4GB 64GB 4G LTE", "storage", "64GB")]
    #[case("Tablet RAM 4GB 64GB 4G LTE", "connectivity", "4G")]
    #[case("Phone 6 GB of RAM 64GB", "storage", "64GB")]
    #[case("Phone 12GB RAM, 512GB, 5G", "storage", "512GB")]
    fn single_attribute_cases(#[case] title: &str, #[case] key: &str, #[case] expected: &str) {
        let specs = infer_attributes(title);
        assert_eq!(specs.get(key).map(String::as_str), Some(expected), "title: {title}");
    }

    #[test]
    fn ram_figure_alone_is_not_storage() {
        let specs = infer_attributes("Phone 8GB RAM 5G");
        assert_eq!(specs.get("ram").map(String::as_str), Some("8GB"));
        assert!(!specs.contains_key("storage"));
    }

    #[test]
    fn missing_attributes_do_not_block_others() {
        let specs = infer_attributes("Plain Widget Deluxe 5000mAh");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs["battery"], "5000mAh");
    }

    #[test]
    fn redmi_is_not_red() {
        let specs = infer_attributes("Redmi 13C");
        assert!(!specs.contains_key("color"));
    }

    #[test]
    fn empty_title_yields_nothing() {
        assert!(infer_attributes("").is_empty());
    }
}
