//! Durable registry of learned selector patterns
//!
//! The whole [`PatternDocument`] lives behind one synchronous mutex so every
//! read-modify-write of a `(source, field)` entry is atomic; no lock is held
//! across an await. Saves serialize a snapshot and replace the file through a
//! temporary sibling, and concurrent saves are ordered by an async mutex.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::pattern::{FieldPattern, PatternDocument};
use crate::infrastructure::pipeline_error::PatternStoreError;

pub struct PatternStore {
    path: Option<PathBuf>,
    document: Mutex<PatternDocument>,
    dirty: AtomicBool,
    write_lock: tokio::sync::Mutex<()>,
}

impl PatternStore {
    /// Open the pattern file, starting empty when it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PatternStoreError> {
        let path = path.into();
        let document = if fs::try_exists(&path).await.map_err(|e| io_error(&path, e))? {
            Self::load(&path).await?
        } else {
            info!("Pattern file {:?} not found, starting with no learned selectors", path);
            PatternDocument::new()
        };
        Ok(Self::with_document(Some(path), document))
    }

    /// Store that never touches disk
    pub fn in_memory(document: PatternDocument) -> Self {
        Self::with_document(None, document)
    }

    fn with_document(path: Option<PathBuf>, document: PatternDocument) -> Self {
        Self {
            path,
            document: Mutex::new(document),
            dirty: AtomicBool::new(false),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Read and parse a pattern document
    pub async fn load(path: &Path) -> Result<PatternDocument, PatternStoreError> {
        let content = fs::read_to_string(path).await.map_err(|e| io_error(path, e))?;
        let document: PatternDocument = serde_json::from_str(&content)?;
        let entries: usize = document.values().map(|fields| fields.len()).sum();
        debug!("Loaded {} learned patterns from {:?}", entries, path);
        Ok(document)
    }

    /// Write the current document; no-op for an in-memory store
    pub async fn save(&self) -> Result<(), PatternStoreError> {
        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        };

        let _write = self.write_lock.lock().await;
        self.dirty.store(false, Ordering::SeqCst);
        let content = serde_json::to_string_pretty(&self.snapshot())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).await.map_err(|e| io_error(&temp_path, e))?;
        fs::rename(&temp_path, path).await.map_err(|e| io_error(path, e))?;
        debug!("Saved pattern file {:?}", path);
        Ok(())
    }

    /// Save only when outcome feedback changed something since the last save
    pub async fn flush(&self) -> Result<bool, PatternStoreError> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    /// Ordered selectors for the pair; empty when nothing was learned
    pub fn get_selectors(&self, source: &str, field: &str) -> Vec<String> {
        self.pattern(source, field).map(|p| p.selectors).unwrap_or_default()
    }

    pub fn pattern(&self, source: &str, field: &str) -> Option<FieldPattern> {
        self.document().get(source).and_then(|fields| fields.get(field)).cloned()
    }

    /// Apply extraction feedback; returns false when no pattern exists for the pair
    pub fn record_outcome(&self, source: &str, field: &str, selector: &str, worked: bool) -> bool {
        let mut document = self.document();
        let Some(pattern) = document.get_mut(source).and_then(|fields| fields.get_mut(field)) else {
            return false;
        };
        if worked {
            pattern.record_success(selector, Utc::now());
        } else {
            pattern.record_failure();
        }
        self.dirty.store(true, Ordering::SeqCst);
        true
    }

    /// Install a repaired selector list, merged in front of the existing one
    pub fn apply_repair(
        &self,
        source: &str,
        field: &str,
        candidates: &[String],
        baseline_confidence: u8,
        max_selectors: usize,
    ) -> FieldPattern {
        let mut document = self.document();
        let fields = document.entry(source.to_string()).or_default();
        let repaired = FieldPattern::repaired(
            fields.get(field),
            candidates,
            baseline_confidence,
            max_selectors,
            Utc::now(),
        );
        fields.insert(field.to_string(), repaired.clone());
        self.dirty.store(true, Ordering::SeqCst);
        repaired
    }

    pub fn snapshot(&self) -> PatternDocument {
        self.document().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn document(&self) -> MutexGuard<'_, PatternDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PatternStoreError {
    PatternStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
