//! Coderail Core - AI Request Governance
//!
//! Governance primitives for turning natural-language requests into
//! policy-checked, audited, quota-accounted LLM actions:
//!
//! - **TenantDirectory** - per-tenant limits, grants, isolation, compliance
//! - **UsageLedger** - hourly windowed quotas plus a per-user rate gate
//! - **PolicyEngine** - security + compliance + resource checks, one verdict
//! - **AuditLog** - append-only, queryable, JSONL-persisted trail
//!
//! The orchestration layer (interpreter, inference, retrieval, workflow)
//! lives in `coderail-agent` and treats everything here as the mandatory
//! choke point for LLM-backed actions.

pub mod audit;
pub mod config;
pub mod error;
pub mod policy;
pub mod tenant;
pub mod types;
pub mod usage;

pub use audit::{AuditFilter, AuditLog, AuditSummary, FAILURE_SUFFIX};
pub use config::{CoderailConfig, InferenceSettings, VectorStoreSettings};
pub use error::{CoreError, Result};
pub use policy::PolicyEngine;
pub use tenant::TenantDirectory;
pub use types::{
    estimate_tokens, ArtifactType, AuditEntry, CompliancePolicy, GenerationRequest,
    IsolationLevel, Permission, ResourceLimits, Severity, SeverityClass, Tenant, TenantId,
    UsageCounters, UserId, ValidationVerdict, Violation, ViolationKind, WorkflowRequest,
    WorkflowResult,
};
pub use usage::{UsageLedger, USER_ACTIONS_PER_HOUR};

/// Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
