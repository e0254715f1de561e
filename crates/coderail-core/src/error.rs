//! Error types for the Coderail governance core
//!
//! One `thiserror` enum for the whole crate plus a `Result` alias. Policy
//! rejections carry the full verdict so callers can surface violations and
//! recommendations in one round trip.

use thiserror::Error;

use crate::types::ValidationVerdict;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for the governance core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Tenant is not registered in the directory
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Tenant already registered
    #[error("Tenant already exists: {0}")]
    TenantAlreadyExists(String),

    /// The request was rejected by policy; the verdict carries every
    /// violation and recommendation collected across all checks
    #[error("Policy rejected request: {} violation(s)", verdict.violations.len())]
    PolicyRejected { verdict: ValidationVerdict },

    /// An hourly or concurrency budget would be exceeded
    #[error("Quota exceeded for tenant {tenant_id}: {reason}")]
    QuotaExceeded { tenant_id: String, reason: String },

    /// Per-user action ceiling reached
    #[error("Rate limit exceeded for {tenant_id}/{user_id}")]
    RateLimitExceeded { tenant_id: String, user_id: String },

    /// Audit persistence failure
    #[error("Audit error: {0}")]
    Audit(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
