//! Config-driven source strategies and their registry
//!
//! Every source is a [`ConfiguredSource`] built from its `SourceConfig`; the
//! registry maps source names to trait objects so the pipeline never branches
//! on a concrete source.

use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::domain::field::{self, collapse_whitespace};
use crate::domain::product::CandidateRecord;
use crate::domain::services::{ExtractedFields, FetchedPage, SourceAdapter};
use crate::infrastructure::config::SourceConfig;
use crate::infrastructure::pipeline_error::CrawlError;

/// Status codes sources answer with when they throttle or wall off a client
const BLOCKING_STATUSES: &[u16] = &[403, 429, 503];

pub struct ConfiguredSource {
    config: SourceConfig,
    base_url: Option<Url>,
    headers: Vec<(String, String)>,
    lowered_markers: Vec<String>,
}

impl ConfiguredSource {
    pub fn new(config: SourceConfig) -> Self {
        let base_url = Url::parse(&config.base_url).ok();
        if base_url.is_none() {
            tracing::warn!(
                "Source {} has an unparseable base_url {:?}; relative links stay unresolved",
                config.name,
                config.base_url
            );
        }
        let headers = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let lowered_markers = config.block_markers.iter().map(|m| m.to_lowercase()).collect();
        Self {
            config,
            base_url,
            headers,
            lowered_markers,
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Absolute form of a link found on a card
    fn resolve(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() || link.starts_with("data:") || link.starts_with("javascript:") {
            return None;
        }
        match Url::parse(link) {
            Ok(absolute) => Some(absolute.to_string()),
            Err(_) => self
                .base_url
                .as_ref()
                .and_then(|base| base.join(link).ok())
                .map(|u| u.to_string()),
        }
    }
}

/// Last meaningful path segment of a product URL
fn identifier_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !matches!(*segment, "dp" | "p" | "product" | "products" | "item" | "itm"))
        .last()
        .map(|segment| segment.trim_end_matches(".html").to_string())
        .filter(|segment| !segment.is_empty())
}

fn url_encode(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect()
}

impl SourceAdapter for ConfiguredSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn build_search_url(&self, query: &str, page: u32) -> String {
        self.config
            .search_url_template
            .replace("{query}", &url_encode(query))
            .replace("{page}", &page.max(1).to_string())
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }

    fn is_blocked(&self, page: &FetchedPage) -> bool {
        if BLOCKING_STATUSES.contains(&page.status) {
            return true;
        }
        if page.body.len() < self.config.min_body_bytes {
            return true;
        }
        let lowered = page.body.to_lowercase();
        self.lowered_markers.iter().any(|marker| lowered.contains(marker))
    }

    fn candidate_selector(&self) -> &str {
        &self.config.candidate_selector
    }

    fn identifier_attribute(&self) -> Option<&str> {
        self.config.identifier_attribute.as_deref()
    }

    fn default_selectors(&self, field: &str) -> &[String] {
        self.config
            .default_selectors
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn extract_candidate(&self, fields: &ExtractedFields) -> Option<CandidateRecord> {
        let url = fields.text(field::URL.name).and_then(|link| self.resolve(link));

        let product_id = fields
            .element_identifier
            .clone()
            .or_else(|| fields.text(field::PRODUCT_ID.name).map(collapse_whitespace))
            .or_else(|| url.as_deref().and_then(identifier_from_url))
            .filter(|id| !id.trim().is_empty())?;

        let title = fields.text(field::TITLE.name).map(collapse_whitespace).unwrap_or_default();
        let brand = fields
            .text(field::BRAND.name)
            .map(collapse_whitespace)
            .filter(|b| !b.is_empty())
            .or_else(|| title.split_whitespace().next().map(str::to_string));

        Some(CandidateRecord {
            source: self.config.name.clone(),
            product_id,
            title,
            brand,
            category: self.config.category.clone(),
            subcategory: fields.text(field::SUBCATEGORY.name).map(collapse_whitespace),
            image_url: fields.text(field::IMAGE.name).and_then(|src| self.resolve(src)),
            url,
            current_price: fields.number(field::PRICE.name),
            original_price: fields.number(field::ORIGINAL_PRICE.name),
            discount_percent: fields.number(field::DISCOUNT.name),
            available: fields.flag(field::AVAILABILITY.name).unwrap_or(true),
            rating: fields.number(field::RATING.name),
            review_count: fields.number(field::REVIEW_COUNT.name).map(|n| n.round() as i64),
            specifications: None,
        })
    }
}

/// Source name -> strategy
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn SourceAdapter>>,
    order: Vec<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[SourceConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Arc::new(ConfiguredSource::new(config.clone())));
        }
        registry
    }

    /// Add or replace a source; registration order is kept for runs
    pub fn register(&mut self, source: Arc<dyn SourceAdapter>) {
        let name = source.name().to_string();
        if self.sources.insert(name.clone(), source).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SourceAdapter>, CrawlError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| CrawlError::UnknownSource(name.to_string()))
    }

    pub fn all(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.order
            .iter()
            .filter_map(|name| self.sources.get(name).cloned())
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::FieldValue;
    use crate::infrastructure::config::defaults;
    use std::collections::BTreeMap;

    fn source_config() -> SourceConfig {
        SourceConfig {
            name: "shopmart".into(),
            search_url_template: "https://shop.test/search?q={query}&page={page}".into(),
            base_url: "https://shop.test".into(),
            candidate_selector: "div.card".into(),
            identifier_attribute: Some("data-sku".into()),
            block_markers: defaults::block_markers(),
            min_body_bytes: 20,
            default_selectors: BTreeMap::from([("price".to_string(), vec![".price".to_string()])]),
            category: Some("phones".into()),
            headers: BTreeMap::from([("Accept-Language".to_string(), "en-IN".to_string())]),
        }
    }

    fn fields(values: &[(&'static str, FieldValue)]) -> ExtractedFields {
        ExtractedFields {
            element_identifier: None,
            values: values.iter().cloned().collect(),
        }
    }

    #[test]
    fn search_url_encodes_query() {
        let source = ConfiguredSource::new(source_config());
        assert_eq!(
            source.build_search_url("usb c hub", 2),
            "https://shop.test/search?q=usb+c+hub&page=2"
        );
        assert_eq!(source.request_headers().len(), 1);
    }

    #[test]
    fn block_heuristics() {
        let source = ConfiguredSource::new(source_config());
        let page = |status: u16, body: &str| FetchedPage {
            status,
            body: body.to_string(),
        };
        assert!(source.is_blocked(&page(200, "tiny")));
        assert!(source.is_blocked(&page(200, "<html>Please solve this CAPTCHA to continue</html>")));
        assert!(source.is_blocked(&page(503, &"x".repeat(100))));
        assert!(!source.is_blocked(&page(200, &"<div class=card></div>".repeat(5))));
    }

    #[test]
    fn candidate_uses_identifier_fallbacks_and_resolves_links() {
        let source = ConfiguredSource::new(source_config());
        let record = source
            .extract_candidate(&fields(&[
                ("title", FieldValue::Text("Acme  Phone X 8GB RAM".into())),
                ("url", FieldValue::Text("/p/acme-phone-x".into())),
                ("image", FieldValue::Text("//cdn.shop.test/x.jpg".into())),
                ("price", FieldValue::Number(999.0)),
                ("review_count", FieldValue::Number(1234.0)),
            ]))
            .expect("identified by url");
        assert_eq!(record.product_id, "acme-phone-x");
        assert_eq!(record.url.as_deref(), Some("https://shop.test/p/acme-phone-x"));
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.shop.test/x.jpg"));
        assert_eq!(record.brand.as_deref(), Some("Acme"));
        assert_eq!(record.title, "Acme Phone X 8GB RAM");
        assert_eq!(record.category.as_deref(), Some("phones"));
        assert_eq!(record.review_count, Some(1234));
        assert!(record.available);

        let mut with_attribute = fields(&[("product_id", FieldValue::Text("from-field".into()))]);
        with_attribute.element_identifier = Some("SKU-7".into());
        assert_eq!(source.extract_candidate(&with_attribute).unwrap().product_id, "SKU-7");

        assert!(source.extract_candidate(&fields(&[("title", FieldValue::Text("t".into()))])).is_none());
    }

    #[test]
    fn registry_lookup_and_order() {
        let mut second = source_config();
        second.name = "bazaar".into();
        let registry = SourceRegistry::from_configs(&[source_config(), second]);
        assert_eq!(registry.names(), ["shopmart".to_string(), "bazaar".to_string()]);
        assert_eq!(registry.get("bazaar").unwrap().name(), "bazaar");
        assert!(matches!(registry.get("nope"), Err(CrawlError::UnknownSource(_))));
        assert_eq!(registry.get("shopmart").unwrap().default_selectors("price"), [".price".to_string()]);
        assert!(registry.get("shopmart").unwrap().default_selectors("title").is_empty());
    }
}
