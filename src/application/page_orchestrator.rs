//! Single result page: fetch, classify, extract, heal, validate
//!
//! Fetch failures and blocked pages are retried with linear backoff; once the
//! attempt ceiling is hit the page comes back empty and the error stops here.
//! Markup is parsed in synchronous steps only. The heal step is the one await
//! inside extraction, so cards are carried across it as serialized markup.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::healer::{HealOutcome, SelectorHealer};
use crate::application::run_stats::RunStats;
use crate::application::selector_resolver::SelectorResolver;
use crate::domain::field::{FieldSpec, LISTING_FIELDS};
use crate::domain::markup::MarkupElement;
use crate::domain::product::{Specifications, ValidatedProduct};
use crate::domain::services::{
    ExtractedFields, FetchedPage, PageFetcher, SourceAdapter, infer_attributes, normalize_candidate,
};
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::markup::{ScrapedElement, parse_document, parse_fragment};
use crate::infrastructure::pipeline_error::{FetchError, PipelineIssue};

/// Records surviving one page, deduplicated by product identifier
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub records: Vec<ValidatedProduct>,
    /// Candidate elements located on the page
    pub candidates: usize,
    /// Whether the fetch gave up after the attempt ceiling
    pub gave_up: bool,
}

impl PageResult {
    fn gave_up() -> Self {
        Self {
            gave_up: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One card between extraction and validation
struct ElementDraft {
    markup: String,
    fields: ExtractedFields,
    /// Healable fields no selector resolved
    misses: Vec<&'static FieldSpec>,
}

pub struct PageOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    resolver: SelectorResolver,
    healer: Arc<SelectorHealer>,
    stats: Arc<RunStats>,
    crawl: CrawlConfig,
}

impl PageOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        resolver: SelectorResolver,
        healer: Arc<SelectorHealer>,
        stats: Arc<RunStats>,
        crawl: CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            healer,
            stats,
            crawl,
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    /// Fetch and extract one result page; never fails, an unusable page is empty
    pub async fn process_page(&self, source: &dyn SourceAdapter, url: &str) -> PageResult {
        let Some(page) = self.fetch_with_retry(source, url).await else {
            return PageResult::gave_up();
        };
        self.stats.page_fetched();

        let mut drafts = self.extract_drafts(source, &page.body);
        let candidates = drafts.len();
        self.heal_misses(source, &mut drafts).await;
        let records = self.finish(source, drafts);

        info!(
            "📄 {}: {} candidates, {} accepted from {}",
            source.name(),
            candidates,
            records.len(),
            url
        );
        PageResult {
            records,
            candidates,
            gave_up: false,
        }
    }

    /// Fetch -> classify -> retry with `attempt * unit` backoff, up to the ceiling
    async fn fetch_with_retry(&self, source: &dyn SourceAdapter, url: &str) -> Option<FetchedPage> {
        let headers = source.request_headers();
        let max_attempts = self.crawl.max_fetch_attempts.max(1);

        for attempt in 1..=max_attempts {
            let (issue, recoverable) = match self.fetcher.fetch(url, &headers).await {
                Ok(page) if source.is_blocked(&page) => {
                    warn!(
                        "🚫 Blocked page from {} (HTTP {}, {} bytes), attempt {}/{}",
                        source.name(),
                        page.status,
                        page.body.len(),
                        attempt,
                        max_attempts
                    );
                    (PipelineIssue::BlockedPage, true)
                }
                Ok(page) if !page.is_success() => {
                    let error = FetchError::Status {
                        url: url.to_string(),
                        status: page.status,
                    };
                    warn!("{}, attempt {}/{}", error, attempt, max_attempts);
                    (PipelineIssue::TransportFailure, error.is_recoverable())
                }
                Ok(page) => return Some(page),
                Err(error) => {
                    warn!("{}, attempt {}/{}", error, attempt, max_attempts);
                    (PipelineIssue::TransportFailure, error.is_recoverable())
                }
            };
            self.stats.record(issue);

            if !recoverable {
                break;
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.crawl.backoff(attempt)).await;
            }
        }

        warn!("Giving up on {} for {}", url, source.name());
        None
    }

    /// Resolve every catalogue field on every card
    fn extract_drafts(&self, source: &dyn SourceAdapter, body: &str) -> Vec<ElementDraft> {
        let document = parse_document(body);
        let root = ScrapedElement::root(&document);
        let cards = root.select(source.candidate_selector());
        self.stats.candidates_seen(cards.len());
        if cards.is_empty() {
            debug!("No {:?} elements on page from {}", source.candidate_selector(), source.name());
            return Vec::new();
        }

        let chains: Vec<(&'static FieldSpec, Vec<String>)> = LISTING_FIELDS
            .iter()
            .map(|spec| {
                let chain = self
                    .resolver
                    .selector_chain(source.name(), spec.name, source.default_selectors(spec.name));
                (spec, chain)
            })
            .collect();

        cards
            .iter()
            .map(|card| {
                let element_identifier = source
                    .identifier_attribute()
                    .and_then(|attribute| card.attr(attribute))
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty());
                let mut fields = ExtractedFields {
                    element_identifier,
                    values: HashMap::new(),
                };
                let mut misses = Vec::new();

                for (spec, chain) in &chains {
                    let resolution = self.resolver.resolve_field(source.name(), spec, card, chain);
                    match resolution.value {
                        Some(value) => {
                            fields.values.insert(spec.name, value);
                        }
                        None if spec.healable => misses.push(*spec),
                        None => {}
                    }
                }

                ElementDraft {
                    markup: card.markup(),
                    fields,
                    misses,
                }
            })
            .collect()
    }

    /// Heal each missing field once per page, then re-attempt it on the cards that missed it
    async fn heal_misses(&self, source: &dyn SourceAdapter, drafts: &mut [ElementDraft]) {
        let mut targets: Vec<(&'static FieldSpec, &str)> = Vec::new();
        for draft in drafts.iter() {
            for spec in &draft.misses {
                if !targets.iter().any(|(target, _)| target.name == spec.name) {
                    targets.push((*spec, draft.markup.as_str()));
                }
            }
        }
        if targets.is_empty() {
            return;
        }

        let outcomes = join_all(
            targets
                .iter()
                .map(|(spec, markup)| self.healer.heal(source.name(), spec, markup)),
        )
        .await;
        let repairs: Vec<(&'static FieldSpec, HealOutcome)> = targets
            .iter()
            .map(|(spec, _)| *spec)
            .zip(outcomes)
            .collect();

        for (spec, outcome) in repairs {
            match &outcome {
                HealOutcome::Repaired(selectors) => {
                    self.stats.heal_attempted();
                    self.stats.selector_repaired();
                    self.reattempt(source, spec, selectors, drafts);
                }
                HealOutcome::Unavailable | HealOutcome::Malformed => {
                    self.stats.heal_attempted();
                    self.stats.record(PipelineIssue::HealingFailure);
                    self.record_misses(spec, drafts);
                }
                HealOutcome::CoolingDown => self.record_misses(spec, drafts),
            }
        }
    }

    /// One more pass with the repaired list over the cards that missed `spec`
    fn reattempt(&self, source: &dyn SourceAdapter, spec: &'static FieldSpec, repaired: &[String], drafts: &mut [ElementDraft]) {
        let chain = self
            .resolver
            .selector_chain(source.name(), spec.name, source.default_selectors(spec.name));
        let mut recovered = 0usize;

        for draft in drafts.iter_mut().filter(|d| d.misses.iter().any(|m| m.name == spec.name)) {
            let fragment = parse_fragment(&draft.markup);
            let card = ScrapedElement::root(&fragment);
            let resolution = self.resolver.resolve_field(source.name(), spec, &card, &chain);
            draft.misses.retain(|m| m.name != spec.name);
            match resolution.value {
                Some(value) => {
                    draft.fields.values.insert(spec.name, value);
                    recovered += 1;
                }
                None => self.stats.record(PipelineIssue::ExtractionMiss),
            }
        }

        if recovered == 0 {
            if let Some(primary) = repaired.first() {
                self.resolver.store().record_outcome(source.name(), spec.name, primary, false);
            }
            warn!("Repaired selectors for {}/{} still match nothing", source.name(), spec.name);
        } else {
            debug!("{}/{} recovered on {} card(s) after repair", source.name(), spec.name, recovered);
        }
    }

    fn record_misses(&self, spec: &FieldSpec, drafts: &mut [ElementDraft]) {
        for draft in drafts.iter_mut() {
            let before = draft.misses.len();
            draft.misses.retain(|m| m.name != spec.name);
            if draft.misses.len() != before {
                self.stats.record(PipelineIssue::ExtractionMiss);
            }
        }
    }

    /// Candidate assembly, title inference, validation and in-page dedupe
    fn finish(&self, source: &dyn SourceAdapter, drafts: Vec<ElementDraft>) -> Vec<ValidatedProduct> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for draft in drafts {
            let Some(mut candidate) = source.extract_candidate(&draft.fields) else {
                debug!("Card without a product identifier skipped on {}", source.name());
                self.stats.record(PipelineIssue::ExtractionMiss);
                continue;
            };
            candidate.specifications = Some(with_inferred_attributes(
                candidate.specifications.take(),
                infer_attributes(&candidate.title),
            ));

            let product_id = candidate.product_id.clone();
            match normalize_candidate(candidate) {
                Ok(product) => {
                    if seen.insert(product.product_id.clone()) {
                        self.stats.record_accepted();
                        records.push(product);
                    } else {
                        self.stats.duplicate_dropped();
                    }
                }
                Err(rejection) => {
                    debug!("{}/{} rejected: {}", source.name(), product_id, rejection);
                    self.stats.record(PipelineIssue::ValidationRejection);
                }
            }
        }
        records
    }
}

/// Title-derived attributes fill keys the card itself did not provide
fn with_inferred_attributes(specifications: Option<serde_json::Value>, inferred: Specifications) -> serde_json::Value {
    let mut merged = match specifications {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in inferred {
        merged.entry(key).or_insert(serde_json::Value::String(value));
    }
    serde_json::Value::Object(merged)
}
