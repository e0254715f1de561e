//! Tenant resource check
//!
//! Estimates token cost and asks the usage ledger whether any tenant budget
//! would be exceeded, plus a permission check for the requested action.
//! This check never mutates usage; reservation happens only when the
//! governed action actually executes.

use crate::types::{
    estimate_tokens, GenerationRequest, Severity, Tenant, Violation, ViolationKind,
};
use crate::usage::UsageLedger;

/// Resource the policy engine checks generation grants against
pub const GENERATION_RESOURCE: &str = "generation";

/// Read-only budget and permission check for one generation request
pub fn check(ledger: &UsageLedger, request: &GenerationRequest, tenant: &Tenant) -> Vec<Violation> {
    let mut text_len_source = request.user_input.clone();
    if let Some(context) = &request.existing_code_context {
        text_len_source.push_str(context);
    }
    let estimate = estimate_tokens(&text_len_source);

    let mut violations = ledger.peek(&tenant.id, &tenant.resource_limits, estimate);

    if !tenant.has_permission(GENERATION_RESOURCE, "create") {
        violations.push(Violation::new(
            ViolationKind::PermissionDenied,
            Severity::High,
            format!(
                "tenant {} holds no '{}:create' grant",
                tenant.id, GENERATION_RESOURCE
            ),
        ));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactType, ResourceLimits};

    #[test]
    fn test_within_budget_and_permitted() {
        let ledger = UsageLedger::new();
        let tenant = Tenant::new("acme");
        let request = GenerationRequest::new("generate a login test", ArtifactType::Test);
        assert!(check(&ledger, &request, &tenant).is_empty());
    }

    #[test]
    fn test_token_budget_violation() {
        let ledger = UsageLedger::new();
        let mut tenant = Tenant::new("acme");
        tenant.resource_limits = ResourceLimits {
            max_tokens_per_hour: 2,
            ..ResourceLimits::default()
        };
        let request = GenerationRequest::new("a much longer request body", ArtifactType::Test);
        let violations = check(&ledger, &request, &tenant);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::TokenBudgetExceeded));
    }

    #[test]
    fn test_missing_grant() {
        let ledger = UsageLedger::new();
        let mut tenant = Tenant::new("acme");
        tenant.permissions.clear();
        let request = GenerationRequest::new("generate a test", ArtifactType::Test);
        let violations = check(&ledger, &request, &tenant);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::PermissionDenied));
    }

    #[test]
    fn test_context_counts_toward_estimate() {
        let ledger = UsageLedger::new();
        let mut tenant = Tenant::new("acme");
        tenant.resource_limits = ResourceLimits {
            max_tokens_per_hour: 10,
            ..ResourceLimits::default()
        };
        let request = GenerationRequest::new("short", ArtifactType::Test)
            .with_context("x".repeat(200));
        let violations = check(&ledger, &request, &tenant);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::TokenBudgetExceeded));
    }
}
