//! Field resolution against a card element
//!
//! A field's selector chain is the learned list from the pattern store followed
//! by the source's built-in selectors. The first selector whose matches yield a
//! usable value wins. Only a win by the learned top-ranked selector is reported
//! back to the store; fallback wins and misses leave it untouched.

use std::sync::Arc;
use tracing::debug;

use crate::domain::field::{FieldSpec, FieldValue, extract_value};
use crate::domain::markup::MarkupElement;
use crate::domain::pattern::merge_selectors;
use crate::infrastructure::pattern_store::PatternStore;

/// Which selector produced the value, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Hit { selector: String, rank: usize },
    Miss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolution {
    pub value: Option<FieldValue>,
    pub outcome: ResolutionOutcome,
}

impl FieldResolution {
    pub fn is_miss(&self) -> bool {
        self.outcome == ResolutionOutcome::Miss
    }
}

#[derive(Clone)]
pub struct SelectorResolver {
    store: Arc<PatternStore>,
}

impl SelectorResolver {
    pub fn new(store: Arc<PatternStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Learned selectors first, then `defaults`, deduplicated
    pub fn selector_chain(&self, source: &str, field: &str, defaults: &[String]) -> Vec<String> {
        let learned = self.store.get_selectors(source, field);
        merge_selectors(&learned, defaults, learned.len() + defaults.len())
    }

    /// Try `chain` in order against `element`, returning `fallback` on a miss
    pub fn resolve<E, F>(
        &self,
        source: &str,
        field: &str,
        element: &E,
        chain: &[String],
        extract: F,
        fallback: Option<FieldValue>,
    ) -> FieldResolution
    where
        E: MarkupElement,
        F: Fn(&E) -> Option<FieldValue>,
    {
        for (rank, selector) in chain.iter().enumerate() {
            let Some(value) = element.select(selector).iter().find_map(&extract) else {
                continue;
            };
            if rank == 0 {
                self.store.record_outcome(source, field, selector, true);
            }
            debug!("{}/{} resolved by {:?} (rank {})", source, field, selector, rank);
            return FieldResolution {
                value: Some(value),
                outcome: ResolutionOutcome::Hit {
                    selector: selector.clone(),
                    rank,
                },
            };
        }

        FieldResolution {
            value: fallback,
            outcome: ResolutionOutcome::Miss,
        }
    }

    /// Resolve a catalogue field with its kind's extraction function
    pub fn resolve_field<E: MarkupElement>(
        &self,
        source: &str,
        spec: &FieldSpec,
        element: &E,
        chain: &[String],
    ) -> FieldResolution {
        self.resolve(source, spec.name, element, chain, |e| extract_value(spec.kind, e), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::{PRICE, TITLE};
    use crate::domain::pattern::{FieldPattern, PatternDocument};
    use crate::infrastructure::markup::{ScrapedElement, parse_fragment};
    use std::collections::BTreeMap;

    const CARD: &str = r#"<div class="card">
        <h2 class="name">Acme Phone X</h2>
        <span class="amount">₹12,499</span>
        <span class="empty"> </span>
    </div>"#;

    fn store_with(field: &str, selectors: &[&str], confidence: u8) -> Arc<PatternStore> {
        let mut document = PatternDocument::new();
        document.insert(
            "shopmart".to_string(),
            BTreeMap::from([(
                field.to_string(),
                FieldPattern {
                    selectors: selectors.iter().map(|s| s.to_string()).collect(),
                    confidence,
                    last_healed: None,
                    last_worked: None,
                },
            )]),
        );
        Arc::new(PatternStore::in_memory(document))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chain_puts_learned_selectors_before_defaults() {
        let resolver = SelectorResolver::new(store_with("price", &[".amount", ".p"], 90));
        let chain = resolver.selector_chain("shopmart", "price", &strings(&[".p", ".price"]));
        assert_eq!(chain, vec![".amount", ".p", ".price"]);
        assert_eq!(
            resolver.selector_chain("shopmart", "title", &strings(&["h2"])),
            vec!["h2"]
        );
    }

    #[test]
    fn top_rank_hit_reinforces_confidence() {
        let store = store_with("price", &[".amount"], 90);
        let resolver = SelectorResolver::new(Arc::clone(&store));
        let html = parse_fragment(CARD);
        let card = ScrapedElement::root(&html);

        let chain = resolver.selector_chain("shopmart", "price", &[]);
        let resolution = resolver.resolve_field("shopmart", &PRICE, &card, &chain);
        assert_eq!(resolution.value, Some(FieldValue::Number(12_499.0)));
        assert_eq!(
            resolution.outcome,
            ResolutionOutcome::Hit {
                selector: ".amount".into(),
                rank: 0
            }
        );
        assert_eq!(store.pattern("shopmart", "price").unwrap().confidence, 95);
    }

    #[test]
    fn fallback_rank_hit_leaves_store_unchanged() {
        let store = store_with("price", &[".gone", ".amount"], 60);
        let resolver = SelectorResolver::new(Arc::clone(&store));
        let html = parse_fragment(CARD);
        let card = ScrapedElement::root(&html);

        let chain = resolver.selector_chain("shopmart", "price", &[]);
        let resolution = resolver.resolve_field("shopmart", &PRICE, &card, &chain);
        assert!(matches!(resolution.outcome, ResolutionOutcome::Hit { rank: 1, .. }));
        let pattern = store.pattern("shopmart", "price").unwrap();
        assert_eq!(pattern.confidence, 60);
        assert_eq!(pattern.selectors, vec![".gone", ".amount"]);
    }

    #[test]
    fn empty_text_and_bad_selectors_are_skipped() {
        let resolver = SelectorResolver::new(Arc::new(PatternStore::in_memory(PatternDocument::new())));
        let html = parse_fragment(CARD);
        let card = ScrapedElement::root(&html);

        let chain = strings(&["span.empty", "[[broken", "h2.name"]);
        let resolution = resolver.resolve_field("shopmart", &TITLE, &card, &chain);
        assert_eq!(resolution.value, Some(FieldValue::Text("Acme Phone X".into())));
        assert!(matches!(resolution.outcome, ResolutionOutcome::Hit { rank: 2, .. }));
    }

    #[test]
    fn miss_returns_fallback_without_touching_store() {
        let store = store_with("price", &[".gone"], 70);
        let before = store.snapshot();
        let resolver = SelectorResolver::new(Arc::clone(&store));
        let html = parse_fragment(CARD);
        let card = ScrapedElement::root(&html);

        let chain = resolver.selector_chain("shopmart", "price", &strings(&[".also-gone"]));
        let resolution = resolver.resolve(
            "shopmart",
            "price",
            &card,
            &chain,
            |e| extract_value(PRICE.kind, e),
            Some(FieldValue::Number(0.0)),
        );
        assert!(resolution.is_miss());
        assert_eq!(resolution.value, Some(FieldValue::Number(0.0)));
        assert_eq!(store.snapshot(), before);
    }
}
