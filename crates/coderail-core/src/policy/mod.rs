//! Policy engine
//!
//! Three independent checks composed into one verdict: security (input and
//! generated-output scans), compliance (data-protection heuristics), and
//! tenant resource budgets. All three run even when an earlier one already
//! failed, so a caller receives the complete violation set in one round
//! trip. Only High/Critical violations block execution.

pub mod compliance;
pub mod resource;
pub mod security;

use std::sync::Arc;

use crate::types::{GenerationRequest, Tenant, ValidationVerdict, Violation, ViolationKind};
use crate::usage::UsageLedger;

/// Fixed per-violation-kind recommendation lookup
fn recommendation_for(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::CredentialExposure => {
            "Move credentials to a secret manager or environment variables"
        }
        ViolationKind::PiiDetected => "Redact or tokenize personal data before submitting",
        ViolationKind::InjectionPattern => "Remove script/eval constructs from the request",
        ViolationKind::UnsafeGeneratedCode => {
            "Review generated process and filesystem calls before committing"
        }
        ViolationKind::DataExfiltration => {
            "Remove dialog and navigation calls that can leak data"
        }
        ViolationKind::RetentionViolation => "Align the request with the tenant retention policy",
        ViolationKind::AuditBypass => "Audit logging cannot be disabled for governed actions",
        ViolationKind::PrivacyWeakening => "Keep encryption enabled and avoid public exposure",
        ViolationKind::MissingConsent => {
            "State the consent or authorization basis for processing PII"
        }
        ViolationKind::TokenBudgetExceeded => {
            "Wait for the hourly window to reset or raise the tenant token budget"
        }
        ViolationKind::CallBudgetExceeded => {
            "Wait for the hourly window to reset or raise the tenant call budget"
        }
        ViolationKind::StorageBudgetExceeded => {
            "Free indexed storage or raise the tenant storage budget"
        }
        ViolationKind::ConcurrencyExceeded => "Wait for running jobs to finish",
        ViolationKind::PermissionDenied => "Request the missing grant from a tenant admin",
    }
}

/// Deduplicated recommendation list in first-seen order
fn recommendations(violations: &[Violation]) -> Vec<String> {
    let mut seen = Vec::new();
    for violation in violations {
        let rec = recommendation_for(violation.kind);
        if !seen.iter().any(|s| s == rec) {
            seen.push(rec.to_string());
        }
    }
    seen
}

/// The composed policy engine
pub struct PolicyEngine {
    ledger: Arc<UsageLedger>,
}

impl PolicyEngine {
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }

    /// Validate one generation request against all three checks
    pub fn validate(&self, request: &GenerationRequest, tenant: &Tenant) -> ValidationVerdict {
        let mut violations = security::scan_input(&request.user_input);
        violations.extend(compliance::scan(&request.user_input));
        violations.extend(resource::check(&self.ledger, request, tenant));

        let recs = recommendations(&violations);
        let verdict = ValidationVerdict::from_violations(violations, recs);

        if !verdict.is_valid {
            tracing::warn!(
                "Policy rejected request for tenant {}: {} violation(s)",
                tenant.id,
                verdict.violations.len()
            );
        }
        verdict
    }

    /// Validate generated output before it is written anywhere
    pub fn validate_output(&self, output: &str) -> ValidationVerdict {
        let violations = security::scan_output(output);
        let recs = recommendations(&violations);
        ValidationVerdict::from_violations(violations, recs)
    }
}
