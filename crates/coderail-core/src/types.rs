//! Shared domain types for the governance pipeline
//!
//! Everything that crosses a component seam lives here: tenants and their
//! limits, usage counters, generation requests, policy verdicts, workflow
//! requests/results and audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier, scoped to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-tenant resource ceilings, enforced by the usage ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_calls_per_hour: u64,
    pub max_tokens_per_hour: u64,
    pub max_storage_bytes: u64,
    pub max_concurrent_jobs: u64,
    pub max_users: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_calls_per_hour: 100,
            max_tokens_per_hour: 100_000,
            max_storage_bytes: 1024 * 1024 * 1024, // 1 GiB
            max_concurrent_jobs: 4,
            max_users: 25,
        }
    }
}

/// A permission grant: which actions a tenant may perform on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub actions: Vec<String>,
}

impl Permission {
    pub fn new(resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action || a == "*")
    }
}

/// Isolation level applied to a tenant's data and generated artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    None,
    Tenant,
    User,
    Session,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::Tenant
    }
}

/// Compliance flags recorded at onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompliancePolicy {
    /// How long audit records must be retained
    pub retention_days: u32,
    /// Whether governed actions are audited (always true in practice)
    pub audit_enabled: bool,
    /// Whether stored artifacts must be encrypted at rest
    pub encryption_required: bool,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            retention_days: 365,
            audit_enabled: true,
            encryption_required: false,
        }
    }
}

/// An isolated customer/organization boundary with its own quotas and grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub resource_limits: ResourceLimits,
    pub permissions: Vec<Permission>,
    pub isolation_level: IsolationLevel,
    pub compliance: CompliancePolicy,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant with default limits and a standard grant set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(id),
            resource_limits: ResourceLimits::default(),
            permissions: vec![
                Permission::new("generation", &["create"]),
                Permission::new("workflow", &["create", "execute"]),
                Permission::new("repository", &["index", "query"]),
            ],
            isolation_level: IsolationLevel::default(),
            compliance: CompliancePolicy::default(),
            created_at: Utc::now(),
        }
    }

    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.resource == resource && p.allows(action))
    }
}

/// Windowed usage counters, mutated only by the usage ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCounters {
    pub hourly_token_count: u64,
    pub hourly_request_count: u64,
    pub concurrent_jobs: u64,
    pub last_request_time: DateTime<Utc>,
}

impl Default for UsageCounters {
    fn default() -> Self {
        Self {
            hourly_token_count: 0,
            hourly_request_count: 0,
            concurrent_jobs: 0,
            last_request_time: Utc::now(),
        }
    }
}

/// Kind of artifact a generation request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Test,
    PageObject,
    StepDefinition,
    Feature,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::PageObject => "page_object",
            Self::StepDefinition => "step_definition",
            Self::Feature => "feature",
        }
    }
}

/// One generation request, created per call and never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user_input: String,
    pub artifact_type: ArtifactType,
    pub existing_code_context: Option<String>,
}

impl GenerationRequest {
    pub fn new(user_input: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            user_input: user_input.into(),
            artifact_type,
            existing_code_context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.existing_code_context = Some(context.into());
        self
    }
}

/// Severity of a single policy violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and Critical violations block execution; Medium/Low are advisory
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Classification of a policy violation, used for recommendation lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CredentialExposure,
    PiiDetected,
    InjectionPattern,
    UnsafeGeneratedCode,
    DataExfiltration,
    RetentionViolation,
    AuditBypass,
    PrivacyWeakening,
    MissingConsent,
    TokenBudgetExceeded,
    CallBudgetExceeded,
    StorageBudgetExceeded,
    ConcurrencyExceeded,
    PermissionDenied,
}

/// A single policy rule breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

/// Aggregated outcome of all policy checks for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
    pub recommendations: Vec<String>,
}

impl ValidationVerdict {
    /// Build a verdict from collected violations; any blocking severity
    /// forces `is_valid` to false
    pub fn from_violations(violations: Vec<Violation>, recommendations: Vec<String>) -> Self {
        let is_valid = !violations.iter().any(|v| v.severity.is_blocking());
        Self {
            is_valid,
            violations,
            recommendations,
        }
    }

    pub fn valid() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Derived once per workflow invocation, immutable thereafter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub branch_name: String,
    pub feature_description: String,
    pub files_to_generate: Vec<String>,
    pub commit_message: String,
}

/// Terminal value of the workflow state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub branch_name: String,
    pub files_generated: Vec<String>,
    pub commit_hash: String,
    pub error: Option<String>,
}

/// Severity class recorded on an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityClass {
    Info,
    Warning,
    Error,
}

/// Append-only record of one governed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: String,
    pub resource: String,
    pub details: String,
    pub severity_class: SeverityClass,
}

impl AuditEntry {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        action: impl Into<String>,
        resource: impl Into<String>,
        details: impl Into<String>,
        severity_class: SeverityClass,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tenant_id,
            user_id,
            action: action.into(),
            resource: resource.into(),
            details: details.into(),
            severity_class,
        }
    }
}

/// Estimate token cost of a text the way the resource check does:
/// roughly four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 + 3) / 4
}
