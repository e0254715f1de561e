//! Usage ledger - rate limiting and per-tenant quota accounting
//!
//! Counters are kept in memory per tenant and reset on an hourly window.
//! The window reset rule is the elapsed-time rule: a tenant's counters reset
//! when 3,600 or more seconds have passed since `last_request_time`. The
//! hour-of-day comparison was rejected because it disagrees with elapsed
//! time near midnight (see DESIGN.md).
//!
//! Two additive gates exist:
//! - tenant budgets (tokens/calls/storage/concurrency), checked here and
//!   read-only peeked by the policy engine's resource check;
//! - a per-(tenant,user) sliding counter capped at a fixed ceiling,
//!   independent of the tenant budgets.
//!
//! All read-modify-write paths go through the map's exclusive entry guards,
//! so concurrent requests for one tenant cannot both pass a check that only
//! one can satisfy.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{CoreError, Result};
use crate::types::{ResourceLimits, TenantId, UsageCounters, UserId, Violation, ViolationKind};
use crate::types::Severity;

/// Fixed ceiling for the per-user sliding counter
pub const USER_ACTIONS_PER_HOUR: u32 = 100;

/// Hourly window length
const WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct TenantUsage {
    counters: UsageCounters,
    storage_bytes: u64,
}

impl Default for TenantUsage {
    fn default() -> Self {
        Self {
            counters: UsageCounters::default(),
            storage_bytes: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct UserWindow {
    count: u32,
    window_start: Instant,
}

impl UserWindow {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.window_start.elapsed() >= WINDOW
    }
}

/// In-memory usage ledger, one instance per process
pub struct UsageLedger {
    tenants: DashMap<TenantId, TenantUsage>,
    user_windows: DashMap<(TenantId, UserId), UserWindow>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            user_windows: DashMap::new(),
        }
    }

    /// Reset windowed counters when the window has elapsed
    fn maybe_reset(counters: &mut UsageCounters, now: DateTime<Utc>) {
        let elapsed = now.signed_duration_since(counters.last_request_time);
        if elapsed.num_seconds() >= WINDOW.as_secs() as i64 {
            counters.hourly_token_count = 0;
            counters.hourly_request_count = 0;
        }
    }

    /// Read-only budget check used by the policy engine's resource check.
    /// Returns every budget that the estimated request would exceed; never
    /// mutates counters.
    pub fn peek(
        &self,
        tenant_id: &TenantId,
        limits: &ResourceLimits,
        estimated_tokens: u64,
    ) -> Vec<Violation> {
        let usage = self
            .tenants
            .get(tenant_id)
            .map(|e| e.clone())
            .unwrap_or_default();

        let mut counters = usage.counters;
        Self::maybe_reset(&mut counters, Utc::now());

        let mut violations = Vec::new();
        if counters.hourly_token_count + estimated_tokens > limits.max_tokens_per_hour {
            violations.push(Violation::new(
                ViolationKind::TokenBudgetExceeded,
                Severity::High,
                format!(
                    "hourly token budget: {} used, {} estimated, {} allowed",
                    counters.hourly_token_count, estimated_tokens, limits.max_tokens_per_hour
                ),
            ));
        }
        if counters.hourly_request_count + 1 > limits.max_calls_per_hour {
            violations.push(Violation::new(
                ViolationKind::CallBudgetExceeded,
                Severity::High,
                format!(
                    "hourly call budget: {} used, {} allowed",
                    counters.hourly_request_count, limits.max_calls_per_hour
                ),
            ));
        }
        if usage.storage_bytes > limits.max_storage_bytes {
            violations.push(Violation::new(
                ViolationKind::StorageBudgetExceeded,
                Severity::High,
                format!(
                    "storage budget: {} bytes used, {} allowed",
                    usage.storage_bytes, limits.max_storage_bytes
                ),
            ));
        }
        if counters.concurrent_jobs >= limits.max_concurrent_jobs {
            violations.push(Violation::new(
                ViolationKind::ConcurrencyExceeded,
                Severity::High,
                format!(
                    "concurrent jobs: {} running, {} allowed",
                    counters.concurrent_jobs, limits.max_concurrent_jobs
                ),
            ));
        }
        violations
    }

    /// Reserve the estimated cost against the tenant's budgets.
    ///
    /// On success the estimate is charged and a job slot is taken; the
    /// caller must later `commit` with the actual cost (0 on failure) to
    /// settle the reservation. On rejection no counter changes persist.
    pub fn check_and_reserve(
        &self,
        tenant_id: &TenantId,
        limits: &ResourceLimits,
        estimated_tokens: u64,
    ) -> Result<()> {
        let now = Utc::now();
        let mut entry = self.tenants.entry(tenant_id.clone()).or_default();
        Self::maybe_reset(&mut entry.counters, now);

        if entry.counters.hourly_token_count + estimated_tokens > limits.max_tokens_per_hour {
            return Err(CoreError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                reason: "hourly token budget exceeded".to_string(),
            });
        }
        if entry.counters.hourly_request_count + 1 > limits.max_calls_per_hour {
            return Err(CoreError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                reason: "hourly call budget exceeded".to_string(),
            });
        }
        if entry.counters.concurrent_jobs >= limits.max_concurrent_jobs {
            return Err(CoreError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                reason: "concurrent job budget exceeded".to_string(),
            });
        }

        entry.counters.hourly_token_count += estimated_tokens;
        entry.counters.hourly_request_count += 1;
        entry.counters.concurrent_jobs += 1;
        entry.counters.last_request_time = now;

        tracing::debug!(
            "Reserved {} tokens for {} ({} used this window)",
            estimated_tokens,
            tenant_id,
            entry.counters.hourly_token_count
        );
        Ok(())
    }

    /// Settle a reservation with the actual token usage.
    ///
    /// `reserved` is the estimate passed to `check_and_reserve`; `actual` is
    /// what the inference service reported (0 when the governed action
    /// failed, releasing the whole reservation).
    pub fn commit(&self, tenant_id: &TenantId, reserved: u64, actual: u64) {
        let mut entry = self.tenants.entry(tenant_id.clone()).or_default();
        entry.counters.hourly_token_count = entry
            .counters
            .hourly_token_count
            .saturating_sub(reserved)
            .saturating_add(actual);
        entry.counters.concurrent_jobs = entry.counters.concurrent_jobs.saturating_sub(1);
    }

    /// Record storage consumed by a tenant (indexing, generated artifacts)
    pub fn record_storage(&self, tenant_id: &TenantId, bytes: i64) {
        let mut entry = self.tenants.entry(tenant_id.clone()).or_default();
        if bytes.is_negative() {
            entry.storage_bytes = entry.storage_bytes.saturating_sub(bytes.unsigned_abs());
        } else {
            entry.storage_bytes = entry.storage_bytes.saturating_add(bytes as u64);
        }
    }

    /// Snapshot of a tenant's current counters
    pub fn current_usage(&self, tenant_id: &TenantId) -> UsageCounters {
        self.tenants
            .get(tenant_id)
            .map(|e| e.counters.clone())
            .unwrap_or_default()
    }

    /// Per-(tenant,user) sliding gate, independent of the tenant budgets.
    /// Counts the action and rejects once the fixed ceiling is reached.
    pub fn check_user_rate(&self, tenant_id: &TenantId, user_id: &UserId) -> Result<()> {
        let key = (tenant_id.clone(), user_id.clone());
        let mut entry = self.user_windows.entry(key).or_insert_with(UserWindow::new);
        if entry.is_expired() {
            *entry = UserWindow::new();
        }
        if entry.count >= USER_ACTIONS_PER_HOUR {
            return Err(CoreError::RateLimitExceeded {
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        entry.count += 1;
        Ok(())
    }

    /// Drop expired user windows (periodic housekeeping)
    pub fn cleanup(&self) {
        self.user_windows.retain(|_, w| !w.is_expired());
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}
