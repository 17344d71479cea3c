//! Multi-page crawl of one query on one source
//!
//! Pages are visited strictly one after another with a randomized pause in
//! between. The run stops at the target record count, the page ceiling, after
//! too many consecutive pages without new records, or when cancelled between
//! pages.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::page_orchestrator::PageOrchestrator;
use crate::domain::product::ValidatedProduct;
use crate::domain::services::SourceAdapter;
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::pattern_store::PatternStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPlan {
    pub query: String,
    pub target_count: usize,
    pub max_pages: u32,
}

impl CrawlPlan {
    pub fn from_config(query: impl Into<String>, crawl: &CrawlConfig) -> Self {
        Self {
            query: query.into(),
            target_count: crawl.target_count,
            max_pages: crawl.max_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    PageCeiling,
    ConsecutiveEmptyPages,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub records: Vec<ValidatedProduct>,
    pub pages_visited: u32,
    pub stop_reason: StopReason,
}

pub struct CrawlDriver {
    orchestrator: Arc<PageOrchestrator>,
    patterns: Arc<PatternStore>,
    crawl: CrawlConfig,
}

impl CrawlDriver {
    pub fn new(orchestrator: Arc<PageOrchestrator>, patterns: Arc<PatternStore>, crawl: CrawlConfig) -> Self {
        Self {
            orchestrator,
            patterns,
            crawl,
        }
    }

    pub async fn run(&self, source: &dyn SourceAdapter, plan: &CrawlPlan, cancel: &CancellationToken) -> CrawlOutcome {
        let mut records: Vec<ValidatedProduct> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages_visited = 0u32;
        let mut consecutive_empty = 0u32;

        let stop_reason = loop {
            if records.len() >= plan.target_count {
                break StopReason::TargetReached;
            }
            if pages_visited >= plan.max_pages {
                break StopReason::PageCeiling;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if pages_visited > 0 && !self.pause(cancel).await {
                break StopReason::Cancelled;
            }

            pages_visited += 1;
            let url = source.build_search_url(&plan.query, pages_visited);
            debug!("{} page {} -> {}", source.name(), pages_visited, url);
            let page = self.orchestrator.process_page(source, &url).await;

            let mut fresh = 0usize;
            for record in page.records {
                if seen.insert(record.product_id.clone()) {
                    records.push(record);
                    fresh += 1;
                } else {
                    self.orchestrator.stats().duplicate_dropped();
                }
            }

            if let Err(e) = self.patterns.flush().await {
                warn!("Pattern file not saved after page {}: {}", pages_visited, e);
            }

            if fresh == 0 {
                consecutive_empty += 1;
                if consecutive_empty >= self.crawl.max_consecutive_empty_pages.max(1) {
                    break StopReason::ConsecutiveEmptyPages;
                }
            } else {
                consecutive_empty = 0;
            }
        };

        records.truncate(plan.target_count);
        info!(
            "🏁 {} '{}': {} records over {} page(s), stopped: {:?}",
            source.name(),
            plan.query,
            records.len(),
            pages_visited,
            stop_reason
        );
        CrawlOutcome {
            records,
            pages_visited,
            stop_reason,
        }
    }

    /// Randomized inter-page delay; false when cancelled while waiting
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = self.page_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn page_delay(&self) -> Duration {
        let min = self.crawl.page_delay_min_ms;
        let max = self.crawl.page_delay_max_ms.max(min);
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::healer::{HealerSettings, SelectorHealer};
    use crate::application::run_stats::RunStats;
    use crate::application::selector_resolver::SelectorResolver;
    use crate::domain::pattern::PatternDocument;
    use crate::infrastructure::source_adapters::ConfiguredSource;
    use crate::test_utils::{ScriptedFetcher, ScriptedInference, fast_config, listing_card, result_page, shop_source};

    const TITLE: &str = "Acme Phone X 8GB RAM 128GB 5000mAh 5G";

    fn page_url(page: u32) -> String {
        format!("https://shop.test/search?q=phone&page={page}")
    }

    fn page_of(skus: &[&str]) -> String {
        let cards: Vec<String> = skus
            .iter()
            .map(|sku| listing_card(sku, TITLE, "₹14,999", "price"))
            .collect();
        result_page(&cards)
    }

    fn driver(fetcher: Arc<ScriptedFetcher>) -> CrawlDriver {
        let config = fast_config(vec![shop_source("shopmart")]);
        let store = Arc::new(PatternStore::in_memory(PatternDocument::new()));
        let healer = Arc::new(SelectorHealer::new(
            Arc::clone(&store),
            Arc::new(ScriptedInference::silent()),
            HealerSettings::from(&config.healing),
        ));
        let orchestrator = Arc::new(PageOrchestrator::new(
            fetcher,
            SelectorResolver::new(Arc::clone(&store)),
            healer,
            Arc::new(RunStats::new()),
            config.crawl.clone(),
        ));
        CrawlDriver::new(orchestrator, store, config.crawl)
    }

    fn plan(target_count: usize, max_pages: u32) -> CrawlPlan {
        CrawlPlan {
            query: "phone".into(),
            target_count,
            max_pages,
        }
    }

    #[tokio::test]
    async fn stops_at_target_and_truncates() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&page_url(1), 200, page_of(&["A", "B"]));
        fetcher.respond(&page_url(2), 200, page_of(&["C", "D"]));

        let source = ConfiguredSource::new(shop_source("shopmart"));
        let outcome = driver(Arc::clone(&fetcher)).run(&source, &plan(3, 10), &CancellationToken::new()).await;
        assert_eq!(outcome.stop_reason, StopReason::TargetReached);
        assert_eq!(outcome.pages_visited, 2);
        let ids: Vec<_> = outcome.records.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn repeated_pages_count_as_empty() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        for page in 1..=5 {
            fetcher.respond(&page_url(page), 200, page_of(&["A", "B"]));
        }

        let source = ConfiguredSource::new(shop_source("shopmart"));
        let outcome = driver(Arc::clone(&fetcher)).run(&source, &plan(100, 10), &CancellationToken::new()).await;
        assert_eq!(outcome.stop_reason, StopReason::ConsecutiveEmptyPages);
        // one productive page, then three pages of duplicates
        assert_eq!(outcome.pages_visited, 4);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn stops_at_page_ceiling() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&page_url(1), 200, page_of(&["A"]));
        fetcher.respond(&page_url(2), 200, page_of(&["B"]));

        let source = ConfiguredSource::new(shop_source("shopmart"));
        let outcome = driver(Arc::clone(&fetcher)).run(&source, &plan(100, 2), &CancellationToken::new()).await;
        assert_eq!(outcome.stop_reason, StopReason::PageCeiling);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_run_fetches_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = ConfiguredSource::new(shop_source("shopmart"));
        let outcome = driver(Arc::clone(&fetcher)).run(&source, &plan(10, 10), &cancel).await;
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.pages_visited, 0);
        assert!(fetcher.requests().is_empty());
    }
}
