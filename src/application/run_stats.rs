//! Run-wide counters
//!
//! Soft failures are counted here instead of propagated. Counters are shared by
//! every orchestrator of a run, so they are plain atomics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::infrastructure::pipeline_error::PipelineIssue;

#[derive(Debug, Default)]
pub struct RunStats {
    pages_fetched: AtomicU64,
    candidates_seen: AtomicU64,
    records_accepted: AtomicU64,
    duplicates_dropped: AtomicU64,
    records_persisted: AtomicU64,
    heal_attempts: AtomicU64,
    selector_repairs: AtomicU64,
    validation_rejections: AtomicU64,
    extraction_misses: AtomicU64,
    healing_failures: AtomicU64,
    blocked_pages: AtomicU64,
    transport_failures: AtomicU64,
    persistence_failures: AtomicU64,
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatsSnapshot {
    pub pages_fetched: u64,
    pub candidates_seen: u64,
    pub records_accepted: u64,
    pub duplicates_dropped: u64,
    pub records_persisted: u64,
    pub heal_attempts: u64,
    pub selector_repairs: u64,
    pub validation_rejections: u64,
    pub extraction_misses: u64,
    pub healing_failures: u64,
    pub blocked_pages: u64,
    pub transport_failures: u64,
    pub persistence_failures: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, issue: PipelineIssue) {
        let counter = match issue {
            PipelineIssue::ValidationRejection => &self.validation_rejections,
            PipelineIssue::ExtractionMiss => &self.extraction_misses,
            PipelineIssue::HealingFailure => &self.healing_failures,
            PipelineIssue::BlockedPage => &self.blocked_pages,
            PipelineIssue::TransportFailure => &self.transport_failures,
            PipelineIssue::PersistenceFailure => &self.persistence_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn candidates_seen(&self, count: usize) {
        self.candidates_seen.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.records_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heal_attempted(&self) {
        self.heal_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn selector_repaired(&self) {
        self.selector_repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issue_count(&self, issue: PipelineIssue) -> u64 {
        let snapshot = self.snapshot();
        match issue {
            PipelineIssue::ValidationRejection => snapshot.validation_rejections,
            PipelineIssue::ExtractionMiss => snapshot.extraction_misses,
            PipelineIssue::HealingFailure => snapshot.healing_failures,
            PipelineIssue::BlockedPage => snapshot.blocked_pages,
            PipelineIssue::TransportFailure => snapshot.transport_failures,
            PipelineIssue::PersistenceFailure => snapshot.persistence_failures,
        }
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RunStatsSnapshot {
            pages_fetched: load(&self.pages_fetched),
            candidates_seen: load(&self.candidates_seen),
            records_accepted: load(&self.records_accepted),
            duplicates_dropped: load(&self.duplicates_dropped),
            records_persisted: load(&self.records_persisted),
            heal_attempts: load(&self.heal_attempts),
            selector_repairs: load(&self.selector_repairs),
            validation_rejections: load(&self.validation_rejections),
            extraction_misses: load(&self.extraction_misses),
            healing_failures: load(&self.healing_failures),
            blocked_pages: load(&self.blocked_pages),
            transport_failures: load(&self.transport_failures),
            persistence_failures: load(&self.persistence_failures),
        }
    }
}
