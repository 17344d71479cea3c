//! Test utilities for catalog-harvester
//!
//! Scripted collaborators and fixture builders shared by unit tests and the
//! integration tests under `tests/`. Nothing here touches the network.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::product::CandidateRecord;
use crate::domain::services::{FetchedPage, InferenceRequest, PageFetcher, SelectorInference};
use crate::infrastructure::config::{AppConfig, SourceConfig};
use crate::infrastructure::pipeline_error::{FetchError, InferenceError};

/// Fetcher answering from a per-URL script.
///
/// Each URL owns a queue of responses; the last response of a queue repeats once
/// the queue is drained. Unknown URLs answer with an empty 200 page.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<FetchedPage, FetchError>>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(
            url,
            Ok(FetchedPage {
                status,
                body: body.into(),
            }),
        )
    }

    pub fn fail(&self, url: &str, error: FetchError) -> &Self {
        self.push(url, Err(error))
    }

    fn push(&self, url: &str, response: Result<FetchedPage, FetchError>) -> &Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _headers: &[(String, String)]) -> Result<FetchedPage, FetchError> {
        lock(&self.requests).push(url.to_string());
        let mut scripts = lock(&self.scripts);
        let Some(queue) = scripts.get_mut(url) else {
            return Ok(FetchedPage {
                status: 200,
                body: String::new(),
            });
        };
        let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        next.unwrap_or_else(|| Err(FetchError::transport(url, "script exhausted")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inference collaborator replaying one canned answer and counting calls
pub struct ScriptedInference {
    answer: Result<Option<Value>, InferenceError>,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn answering(payload: Value) -> Self {
        Self::with_answer(Ok(Some(payload)))
    }

    pub fn silent() -> Self {
        Self::with_answer(Ok(None))
    }

    pub fn failing(error: InferenceError) -> Self {
        Self::with_answer(Err(error))
    }

    fn with_answer(answer: Result<Option<Value>, InferenceError>) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer only after `delay`, for timeout tests
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SelectorInference for ScriptedInference {
    async fn infer_selectors(&self, request: &InferenceRequest) -> Result<Option<Value>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone()
    }
}

pub const SHOP_SEARCH_URL: &str = "https://shop.test/search?q={query}&page={page}";

/// Source whose cards look like [`listing_card`]
pub fn shop_source(name: &str) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        search_url_template: SHOP_SEARCH_URL.to_string(),
        base_url: "https://shop.test".to_string(),
        candidate_selector: "div.card".to_string(),
        identifier_attribute: Some("data-sku".to_string()),
        block_markers: vec!["captcha".to_string(), "robot check".to_string()],
        min_body_bytes: 64,
        default_selectors: BTreeMap::from([
            ("title".to_string(), vec!["h2.title".to_string()]),
            ("price".to_string(), vec!["span.price".to_string()]),
            ("original_price".to_string(), vec!["span.mrp".to_string()]),
            ("rating".to_string(), vec!["span.rating".to_string()]),
            ("review_count".to_string(), vec!["span.reviews".to_string()]),
            ("image".to_string(), vec!["img".to_string()]),
            ("url".to_string(), vec!["a.link".to_string()]),
        ]),
        category: Some("phones".to_string()),
        headers: BTreeMap::new(),
    }
}

/// Config with no pacing and no backoff so pipeline tests run instantly
pub fn fast_config(sources: Vec<SourceConfig>) -> AppConfig {
    let mut config = AppConfig::default();
    config.crawl.backoff_unit_ms = 1;
    config.crawl.page_delay_min_ms = 0;
    config.crawl.page_delay_max_ms = 0;
    config.healing.inference_timeout_secs = 5;
    config.sources = sources;
    config
}

/// One listing card in the markup `shop_source` expects.
///
/// `price_class` lets a test move the price to a class the default selectors miss.
pub fn listing_card(sku: &str, title: &str, price: &str, price_class: &str) -> String {
    format!(
        r#"<div class="card" data-sku="{sku}">
  <a class="link" href="/p/{sku}"><h2 class="title">{title}</h2></a>
  <img src="/img/{sku}.jpg">
  <span class="{price_class}">{price}</span>
  <span class="mrp">₹99,999</span>
  <span class="rating">4.4 out of 5 stars</span>
  <span class="reviews">(1,204)</span>
</div>"#
    )
}

/// Result page wrapping `cards`, padded past the minimum body size
pub fn result_page(cards: &[String]) -> String {
    format!(
        "<html><head><title>Search results</title></head><body><main id=\"results\">{}</main></body></html>",
        cards.join("\n")
    )
}

pub fn candidate(product_id: &str) -> CandidateRecord {
    CandidateRecord {
        source: "shopmart".to_string(),
        product_id: product_id.to_string(),
        title: "Acme Phone X 8GB RAM 128GB 5000mAh 5G".to_string(),
        brand: Some("Acme".to_string()),
        category: Some("phones".to_string()),
        image_url: Some("https://shop.test/img/1.jpg".to_string()),
        url: Some(format!("https://shop.test/p/{product_id}")),
        current_price: Some(14_999.0),
        original_price: Some(19_999.0),
        available: true,
        rating: Some(4.3),
        review_count: Some(120),
        specifications: Some(serde_json::json!({ "ram": "8GB", "storage": "128GB", "battery": "5000mAh" })),
        ..CandidateRecord::default()
    }
}
