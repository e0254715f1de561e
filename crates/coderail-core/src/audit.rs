//! Append-only audit log
//!
//! Every governed action, success or failure, produces exactly one entry.
//! Failures carry a `*_FAILURE` action tag so `summarize` can compute an
//! error rate. Entries are kept in memory and, when a directory is
//! configured, persisted as one JSON object per line in one file per
//! calendar day (`audit-YYYY-MM-DD.jsonl`). Queries are full scans with
//! predicate filters; audit volume is bounded by governed-call volume, so
//! this stays cheap.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

use crate::error::{CoreError, Result};
use crate::types::{AuditEntry, TenantId, UserId};

/// Suffix that marks a failed governed action
pub const FAILURE_SUFFIX: &str = "_FAILURE";

/// Predicate filters for `query` and `summarize`
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
    pub action_contains: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if &entry.tenant_id != tenant {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if &entry.user_id != user {
                return false;
            }
        }
        if let Some(needle) = &self.action_contains {
            if !entry.action.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Aggregate view over a filtered slice of the log
#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub total: usize,
    pub failures: usize,
    pub failure_rate: f64,
    pub by_action: HashMap<String, usize>,
}

/// Append-only, queryable audit log
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    storage_dir: Option<PathBuf>,
}

impl AuditLog {
    /// In-memory log, no persistence
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            storage_dir: None,
        }
    }

    /// Log persisted under `dir`, one JSONL file per calendar day
    pub async fn with_persistence(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            entries: RwLock::new(Vec::new()),
            storage_dir: Some(dir),
        })
    }

    fn file_for_day(dir: &PathBuf, day: NaiveDate) -> PathBuf {
        dir.join(format!("audit-{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Append one entry. The in-memory log is updated first; a persistence
    /// failure is surfaced but cannot retract the in-memory record.
    pub async fn record(&self, entry: AuditEntry) -> Result<()> {
        tracing::debug!(
            "Audit: {} {} tenant={} user={}",
            entry.action,
            entry.resource,
            entry.tenant_id,
            entry.user_id
        );

        let line = serde_json::to_string(&entry)?;
        let day = entry.timestamp.date_naive();
        self.entries.write().push(entry);

        if let Some(dir) = &self.storage_dir {
            let path = Self::file_for_day(dir, day);
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| CoreError::Audit(format!("open {}: {}", path.display(), e)))?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        Ok(())
    }

    /// Full-scan query with predicate filters
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Aggregate counts per action plus a failure rate derived from
    /// `*_FAILURE` tags
    pub fn summarize(&self, filter: &AuditFilter) -> AuditSummary {
        let entries = self.query(filter);
        let mut summary = AuditSummary {
            total: entries.len(),
            ..AuditSummary::default()
        };
        for entry in &entries {
            *summary.by_action.entry(entry.action.clone()).or_insert(0) += 1;
            if entry.action.ends_with(FAILURE_SUFFIX) {
                summary.failures += 1;
            }
        }
        if summary.total > 0 {
            summary.failure_rate = summary.failures as f64 / summary.total as f64;
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Rebuild the in-memory log from every day file on disk. Malformed
    /// lines are skipped, matching the persistence guarantee: the log is
    /// append-only, not self-healing.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(dir) = &self.storage_dir else {
            return Ok(0);
        };

        let mut loaded = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(dirent) = read_dir.next_entry().await? {
            let path = dirent.path();
            let name = dirent.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("audit-") || !name.ends_with(".jsonl") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditEntry>(line) {
                    Ok(entry) => loaded.push(entry),
                    Err(e) => {
                        tracing::warn!("Skipping malformed audit line in {}: {}", name, e);
                    }
                }
            }
        }
        loaded.sort_by_key(|e| e.timestamp);
        let count = loaded.len();
        *self.entries.write() = loaded;
        Ok(count)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
