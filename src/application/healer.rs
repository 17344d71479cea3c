//! Rate-limited selector repair
//!
//! When a field misses on a card, the healer asks the selector-inference
//! collaborator for new selectors, at most once per `(source, field)` per
//! cooldown window. Its answer is untrusted: it only reaches the pattern store
//! after the shape and syntax checks in [`SelectorProposal::from_payload`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::domain::field::FieldSpec;
use crate::domain::pattern::FieldKey;
use crate::domain::services::{InferenceRequest, SelectorInference};
use crate::infrastructure::config::HealingConfig;
use crate::infrastructure::markup::is_valid_selector;
use crate::infrastructure::pattern_store::PatternStore;

/// Longest selector accepted from the inference service
const MAX_SELECTOR_CHARS: usize = 512;

/// Result of one heal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// Pattern store updated; the repaired selector list, best first
    Repaired(Vec<String>),
    /// Service unreachable, timed out, errored or answered with nothing
    Unavailable,
    /// Service answered with a payload of the wrong shape
    Malformed,
    /// A heal for the pair ran within the cooldown window; nothing was attempted
    CoolingDown,
}

impl HealOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Malformed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealerSettings {
    pub cooldown: Duration,
    pub snippet_max_chars: usize,
    pub healed_confidence: u8,
    pub max_selectors: usize,
    pub inference_timeout: Duration,
}

impl From<&HealingConfig> for HealerSettings {
    fn from(config: &HealingConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            snippet_max_chars: config.snippet_max_chars,
            healed_confidence: config.healed_confidence,
            max_selectors: config.max_selectors,
            inference_timeout: config.inference_timeout(),
        }
    }
}

/// Candidate selectors that passed the shape check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorProposal {
    pub primary: String,
    pub fallback1: String,
    pub fallback2: Option<String>,
    pub explanation: String,
}

impl SelectorProposal {
    /// `primary` and `fallback1` must be non-empty, parseable selectors,
    /// `fallback2` a string or absent, `explanation` a string. An unusable
    /// `fallback2` is dropped.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let selector = |key: &str| -> Option<String> {
            let text = object.get(key)?.as_str()?.trim();
            let usable = !text.is_empty() && text.chars().count() <= MAX_SELECTOR_CHARS && is_valid_selector(text);
            if !usable {
                debug!("Rejected proposed {} selector {:?}", key, text);
            }
            usable.then(|| text.to_string())
        };

        let primary = selector("primary")?;
        let fallback1 = selector("fallback1")?;
        let fallback2 = match object.get("fallback2") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(_)) => selector("fallback2"),
            Some(_) => return None,
        };
        let explanation = object.get("explanation")?.as_str()?.trim().to_string();

        Some(Self {
            primary,
            fallback1,
            fallback2,
            explanation,
        })
    }

    pub fn selectors(&self) -> Vec<String> {
        let mut selectors = vec![self.primary.clone(), self.fallback1.clone()];
        selectors.extend(self.fallback2.clone());
        selectors
    }
}

/// Markup handed to the inference service, capped at `max_chars` characters
pub fn truncate_snippet(markup: &str, max_chars: usize) -> String {
    match markup.char_indices().nth(max_chars) {
        Some((cut, _)) => markup[..cut].to_string(),
        None => markup.to_string(),
    }
}

pub struct SelectorHealer {
    store: Arc<PatternStore>,
    inference: Arc<dyn SelectorInference>,
    settings: HealerSettings,
    last_attempts: Mutex<HashMap<FieldKey, Instant>>,
}

impl SelectorHealer {
    pub fn new(store: Arc<PatternStore>, inference: Arc<dyn SelectorInference>, settings: HealerSettings) -> Self {
        Self {
            store,
            inference,
            settings,
            last_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &HealerSettings {
        &self.settings
    }

    /// Claim the pair's cooldown slot; false while a previous attempt is within the window
    fn begin_attempt(&self, key: &FieldKey) -> bool {
        let now = Instant::now();
        let mut last_attempts = self.last_attempts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last_attempts.get(key) {
            if now.duration_since(*previous) < self.settings.cooldown {
                return false;
            }
        }
        last_attempts.insert(key.clone(), now);
        true
    }

    /// Repair `field` for `source` from the markup of a card it failed on
    pub async fn heal(&self, source: &str, field: &FieldSpec, element_markup: &str) -> HealOutcome {
        let key = FieldKey::new(source, field.name);
        if !self.begin_attempt(&key) {
            debug!("Heal for {} skipped, cooling down", key);
            return HealOutcome::CoolingDown;
        }

        let request = InferenceRequest {
            source: source.to_string(),
            field: field.name.to_string(),
            field_description: field.description.to_string(),
            html_snippet: truncate_snippet(element_markup, self.settings.snippet_max_chars),
        };
        info!("🩹 Requesting selector repair for {}", key);

        let payload = match timeout(self.settings.inference_timeout, self.inference.infer_selectors(&request)).await {
            Err(_) => {
                warn!(
                    "Selector inference for {} timed out after {:?}",
                    key, self.settings.inference_timeout
                );
                return HealOutcome::Unavailable;
            }
            Ok(Err(e)) => {
                warn!("Selector inference for {} failed: {}", key, e);
                return HealOutcome::Unavailable;
            }
            Ok(Ok(None)) => {
                warn!("Selector inference for {} returned nothing", key);
                return HealOutcome::Unavailable;
            }
            Ok(Ok(Some(payload))) => payload,
        };

        let Some(proposal) = SelectorProposal::from_payload(&payload) else {
            warn!("Selector inference for {} returned a malformed payload: {}", key, payload);
            return HealOutcome::Malformed;
        };

        let repaired = self.store.apply_repair(
            source,
            field.name,
            &proposal.selectors(),
            self.settings.healed_confidence,
            self.settings.max_selectors,
        );
        if let Err(e) = self.store.save().await {
            warn!("Repaired selectors for {} not persisted yet: {}", key, e);
        }
        info!(
            "✅ Repaired {} -> {:?} ({})",
            key, repaired.selectors, proposal.explanation
        );
        HealOutcome::Repaired(repaired.selectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::{PRICE, TITLE};
    use crate::domain::pattern::PatternDocument;
    use crate::infrastructure::pipeline_error::InferenceError;
    use crate::test_utils::ScriptedInference;
    use serde_json::json;

    fn settings() -> HealerSettings {
        HealerSettings {
            cooldown: Duration::from_secs(30),
            snippet_max_chars: 16,
            healed_confidence: 80,
            max_selectors: 5,
            inference_timeout: Duration::from_secs(5),
        }
    }

    fn healer(inference: Arc<ScriptedInference>) -> (Arc<PatternStore>, SelectorHealer) {
        let store = Arc::new(PatternStore::in_memory(PatternDocument::new()));
        let healer = SelectorHealer::new(Arc::clone(&store), inference, settings());
        (store, healer)
    }

    fn proposal() -> Value {
        json!({
            "primary": "span.a-price",
            "fallback1": "[data-price]",
            "fallback2": null,
            "explanation": "price moved into a-price"
        })
    }

    #[test]
    fn proposal_shape_is_checked() {
        let parsed = SelectorProposal::from_payload(&proposal()).unwrap();
        assert_eq!(parsed.selectors(), vec!["span.a-price", "[data-price]"]);

        for bad in [
            json!({ "fallback1": ".b", "explanation": "" }),
            json!({ "primary": "", "fallback1": ".b", "explanation": "" }),
            json!({ "primary": ".a", "fallback1": 3, "explanation": "" }),
            json!({ "primary": ".a", "fallback1": ".b", "fallback2": [".c"], "explanation": "" }),
            json!({ "primary": ".a", "fallback1": ".b" }),
            json!([".a", ".b"]),
            json!({ "primary": "span[[broken", "fallback1": "span.amount", "explanation": "" }),
            json!({ "primary": "span.amount", "fallback1": "a[[href", "explanation": "" }),
        ] {
            assert!(SelectorProposal::from_payload(&bad).is_none(), "accepted {bad}");
        }
    }

    #[test]
    fn unparseable_second_fallback_is_dropped() {
        let parsed = SelectorProposal::from_payload(&json!({
            "primary": "span.amount",
            "fallback1": "[itemprop=price]",
            "fallback2": "span[[broken",
            "explanation": "price moved"
        }))
        .unwrap();
        assert_eq!(parsed.fallback2, None);
        assert_eq!(parsed.selectors(), vec!["span.amount", "[itemprop=price]"]);
    }

    #[test]
    fn snippet_is_cut_on_char_boundaries() {
        assert_eq!(truncate_snippet("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_snippet("<b>", 10), "<b>");
    }

    #[tokio::test]
    async fn valid_answer_repairs_the_pattern() {
        let inference = Arc::new(ScriptedInference::answering(proposal()));
        let (store, healer) = healer(Arc::clone(&inference));

        let outcome = healer.heal("shopmart", &PRICE, "<div class=\"card\">₹12,499</div>").await;
        assert_eq!(
            outcome,
            HealOutcome::Repaired(vec!["span.a-price".into(), "[data-price]".into()])
        );
        let pattern = store.pattern("shopmart", "price").unwrap();
        assert_eq!(pattern.confidence, 80);
        assert!(pattern.last_healed.is_some());

        let request = &inference.requests()[0];
        assert_eq!(request.field, "price");
        assert_eq!(request.field_description, PRICE.description);
        assert_eq!(request.html_snippet.chars().count(), 16);
    }

    #[tokio::test]
    async fn second_attempt_within_window_is_skipped() {
        let inference = Arc::new(ScriptedInference::answering(proposal()));
        let (_store, healer) = healer(Arc::clone(&inference));

        assert!(matches!(healer.heal("shopmart", &PRICE, "<div/>").await, HealOutcome::Repaired(_)));
        assert_eq!(healer.heal("shopmart", &PRICE, "<div/>").await, HealOutcome::CoolingDown);
        // other fields and sources have their own windows
        assert!(matches!(healer.heal("shopmart", &TITLE, "<div/>").await, HealOutcome::Repaired(_)));
        assert!(matches!(healer.heal("bazaar", &PRICE, "<div/>").await, HealOutcome::Repaired(_)));
        assert_eq!(inference.calls(), 3);
    }

    #[tokio::test]
    async fn failures_leave_the_store_untouched() {
        let cases = [
            (ScriptedInference::failing(InferenceError::Transport("refused".into())), HealOutcome::Unavailable),
            (ScriptedInference::silent(), HealOutcome::Unavailable),
            (ScriptedInference::answering(json!({ "selector": ".x" })), HealOutcome::Malformed),
        ];
        for (inference, expected) in cases {
            let (store, healer) = healer(Arc::new(inference));
            let outcome = healer.heal("shopmart", &PRICE, "<div/>").await;
            assert_eq!(outcome, expected);
            assert!(outcome.is_failure());
            assert!(store.snapshot().is_empty());
        }
    }

    #[tokio::test]
    async fn unparseable_primary_is_never_installed() {
        let inference = Arc::new(ScriptedInference::answering(json!({
            "primary": "span[[broken",
            "fallback1": "span.amount",
            "fallback2": null,
            "explanation": "price moved"
        })));
        let (store, healer) = healer(inference);

        assert_eq!(healer.heal("shopmart", &PRICE, "<div/>").await, HealOutcome::Malformed);
        assert!(store.pattern("shopmart", "price").is_none());
    }

    #[tokio::test]
    async fn slow_inference_times_out() {
        let inference = Arc::new(ScriptedInference::answering(proposal()).delayed(Duration::from_millis(500)));
        let store = Arc::new(PatternStore::in_memory(PatternDocument::new()));
        let healer = SelectorHealer::new(
            Arc::clone(&store),
            inference,
            HealerSettings {
                inference_timeout: Duration::from_millis(20),
                ..settings()
            },
        );
        assert_eq!(healer.heal("shopmart", &PRICE, "<div/>").await, HealOutcome::Unavailable);
        assert!(store.pattern("shopmart", "price").is_none());
    }
}
