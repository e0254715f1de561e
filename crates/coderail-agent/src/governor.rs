//! Request governor
//!
//! The single choke point every generation passes through: policy
//! validation, per-user rate gate, tenant budget reservation, the model
//! call, an output rescan, and reservation settlement. Every call leaves
//! exactly one audit entry, success or failure, so the trail count equals
//! the call count.

use std::sync::Arc;

use coderail_core::{
    estimate_tokens, AuditEntry, AuditLog, CoreError, GenerationRequest, PolicyEngine,
    SeverityClass, Tenant, TenantDirectory, TenantId, UsageLedger, UserId, ValidationVerdict,
    FAILURE_SUFFIX,
};

use crate::error::{AgentError, Result};
use crate::inference::{GenerationOptions, TextGenerator};

/// Audit action tag for governed generations
pub const GENERATION_ACTION: &str = "GENERATION";

/// A governed generation that ran to completion
#[derive(Debug, Clone)]
pub struct GovernedOutput {
    pub text: String,
    pub tokens_used: u64,
    /// Advisory (non-blocking) violations found on input, surfaced so
    /// callers can warn without failing
    pub advisories: ValidationVerdict,
}

/// Governs every generation request end to end
pub struct RequestGovernor {
    policy: PolicyEngine,
    ledger: Arc<UsageLedger>,
    audit: Arc<AuditLog>,
    tenants: Arc<TenantDirectory>,
    generator: Arc<dyn TextGenerator>,
}

impl RequestGovernor {
    pub fn new(
        ledger: Arc<UsageLedger>,
        audit: Arc<AuditLog>,
        tenants: Arc<TenantDirectory>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            policy: PolicyEngine::new(ledger.clone()),
            ledger,
            audit,
            tenants,
            generator,
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    async fn audit_success(&self, tenant_id: &TenantId, user_id: &UserId, details: String) {
        let entry = AuditEntry::new(
            tenant_id.clone(),
            user_id.clone(),
            GENERATION_ACTION,
            "inference",
            details,
            SeverityClass::Info,
        );
        if let Err(e) = self.audit.record(entry).await {
            tracing::error!("Audit persistence failed: {}", e);
        }
    }

    async fn audit_failure(&self, tenant_id: &TenantId, user_id: &UserId, details: String) {
        let entry = AuditEntry::new(
            tenant_id.clone(),
            user_id.clone(),
            format!("{GENERATION_ACTION}{FAILURE_SUFFIX}"),
            "inference",
            details,
            SeverityClass::Warning,
        );
        if let Err(e) = self.audit.record(entry).await {
            tracing::error!("Audit persistence failed: {}", e);
        }
    }

    fn build_prompt(request: &GenerationRequest) -> String {
        match &request.existing_code_context {
            Some(context) if !context.is_empty() => format!(
                "You generate {} artifacts for a test-automation project.\n\
                 Relevant existing code:\n{}\n\nRequest: {}",
                request.artifact_type.as_str(),
                context,
                request.user_input
            ),
            _ => format!(
                "You generate {} artifacts for a test-automation project.\n\
                 Request: {}",
                request.artifact_type.as_str(),
                request.user_input
            ),
        }
    }

    fn summarize(verdict: &ValidationVerdict) -> String {
        verdict
            .violations
            .iter()
            .map(|v| format!("{:?}: {}", v.kind, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Run one generation under full governance.
    ///
    /// The estimate reserved up front is settled with the actual token
    /// count on success and released in full on any failure after the
    /// reservation.
    pub async fn generate(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        request: &GenerationRequest,
        overrides: Option<GenerationOptions>,
    ) -> Result<GovernedOutput> {
        let tenant = match self.tenants.get(tenant_id) {
            Ok(t) => t,
            Err(e) => {
                self.audit_failure(tenant_id, user_id, e.to_string()).await;
                return Err(AgentError::Governance(e));
            }
        };

        let verdict = self.policy.validate(request, &tenant);
        if !verdict.is_valid {
            self.audit_failure(tenant_id, user_id, Self::summarize(&verdict))
                .await;
            return Err(AgentError::Governance(CoreError::PolicyRejected { verdict }));
        }

        if let Err(e) = self.ledger.check_user_rate(tenant_id, user_id) {
            self.audit_failure(tenant_id, user_id, e.to_string()).await;
            return Err(AgentError::Governance(e));
        }

        let reserved = Self::estimate_request(request);
        if let Err(e) = self
            .ledger
            .check_and_reserve(tenant_id, &tenant.resource_limits, reserved)
        {
            self.audit_failure(tenant_id, user_id, e.to_string()).await;
            return Err(AgentError::Governance(e));
        }

        let prompt = Self::build_prompt(request);
        let output = match self.generator.generate(&prompt, overrides).await {
            Ok(o) => o,
            Err(e) => {
                // Failed actions release the whole reservation
                self.ledger.commit(tenant_id, reserved, 0);
                self.audit_failure(tenant_id, user_id, e.to_string()).await;
                return Err(e);
            }
        };

        let output_verdict = self.policy.validate_output(&output.text);
        if !output_verdict.is_valid {
            self.ledger.commit(tenant_id, reserved, 0);
            self.audit_failure(
                tenant_id,
                user_id,
                format!("generated output rejected: {}", Self::summarize(&output_verdict)),
            )
            .await;
            return Err(AgentError::Governance(CoreError::PolicyRejected {
                verdict: output_verdict,
            }));
        }

        let actual = if output.tokens_used > 0 {
            output.tokens_used
        } else {
            estimate_tokens(&output.text)
        };
        self.ledger.commit(tenant_id, reserved, actual);
        self.audit_success(
            tenant_id,
            user_id,
            format!(
                "{} artifact, {} tokens, {}ms",
                request.artifact_type.as_str(),
                actual,
                output.latency_ms
            ),
        )
        .await;

        tracing::info!(
            "Governed generation for {}/{}: {} tokens",
            tenant_id,
            user_id,
            actual
        );
        Ok(GovernedOutput {
            text: output.text,
            tokens_used: actual,
            advisories: verdict,
        })
    }

    /// Token estimate the reservation is based on: input plus any
    /// retrieved context
    fn estimate_request(request: &GenerationRequest) -> u64 {
        let mut estimate = estimate_tokens(&request.user_input);
        if let Some(context) = &request.existing_code_context {
            estimate += estimate_tokens(context);
        }
        estimate
    }

    /// Look up a tenant, for callers that need the record itself
    pub fn tenant(&self, tenant_id: &TenantId) -> coderail_core::Result<Tenant> {
        self.tenants.get(tenant_id)
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ScriptedGenerator;
    use coderail_core::{ArtifactType, AuditFilter};

    fn governor_with(gen: Arc<ScriptedGenerator>) -> RequestGovernor {
        let tenants = Arc::new(TenantDirectory::new());
        tenants.register(Tenant::new("acme")).unwrap();
        RequestGovernor::new(
            Arc::new(UsageLedger::new()),
            Arc::new(AuditLog::new()),
            tenants,
            gen,
        )
    }

    fn audit_actions(governor: &RequestGovernor) -> Vec<String> {
        governor
            .audit()
            .query(&AuditFilter::default())
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn test_successful_generation_settles_and_audits_once() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply("test('login', async ({ page }) => {});");
        let governor = governor_with(gen);

        let request = GenerationRequest::new("generate a login test", ArtifactType::Test);
        let out = governor
            .generate(
                &TenantId::new("acme"),
                &UserId::new("u1"),
                &request,
                None,
            )
            .await
            .unwrap();
        assert!(out.text.contains("login"));
        assert!(out.tokens_used > 0);

        assert_eq!(audit_actions(&governor), vec![GENERATION_ACTION.to_string()]);
        let usage = governor.ledger().current_usage(&TenantId::new("acme"));
        assert_eq!(usage.concurrent_jobs, 0);
        assert_eq!(usage.hourly_token_count, out.tokens_used);
    }

    #[tokio::test]
    async fn test_policy_rejection_is_governance_and_reserves_nothing() {
        let gen = Arc::new(ScriptedGenerator::new());
        let governor = governor_with(gen.clone());

        let request = GenerationRequest::new(
            "use password = hunter2secret to log in",
            ArtifactType::Test,
        );
        let err = governor
            .generate(&TenantId::new("acme"), &UserId::new("u1"), &request, None)
            .await
            .unwrap_err();
        assert!(err.is_governance_rejection());
        // The model was never consulted
        assert_eq!(gen.call_count(), 0);

        assert_eq!(audit_actions(&governor), vec!["GENERATION_FAILURE".to_string()]);
        let usage = governor.ledger().current_usage(&TenantId::new("acme"));
        assert_eq!(usage.hourly_token_count, 0);
        assert_eq!(usage.hourly_request_count, 0);
    }

    #[tokio::test]
    async fn test_generation_failure_releases_reservation() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_failure("inference down");
        let governor = governor_with(gen);

        let request = GenerationRequest::new("generate a login test", ArtifactType::Test);
        let err = governor
            .generate(&TenantId::new("acme"), &UserId::new("u1"), &request, None)
            .await
            .unwrap_err();
        assert!(!err.is_governance_rejection());
        assert!(matches!(err, AgentError::GenerationFailed(_)));

        assert_eq!(audit_actions(&governor), vec!["GENERATION_FAILURE".to_string()]);
        let usage = governor.ledger().current_usage(&TenantId::new("acme"));
        assert_eq!(usage.hourly_token_count, 0);
        assert_eq!(usage.concurrent_jobs, 0);
    }

    #[tokio::test]
    async fn test_unsafe_output_rejected_after_generation() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply("const { execSync } = require('child_process'); execSync(cmd);");
        let governor = governor_with(gen);

        let request = GenerationRequest::new("generate a cleanup helper", ArtifactType::Test);
        let err = governor
            .generate(&TenantId::new("acme"), &UserId::new("u1"), &request, None)
            .await
            .unwrap_err();
        assert!(err.is_governance_rejection());

        // Rejected output releases the reservation
        let usage = governor.ledger().current_usage(&TenantId::new("acme"));
        assert_eq!(usage.hourly_token_count, 0);
        assert_eq!(usage.concurrent_jobs, 0);
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let gen = Arc::new(ScriptedGenerator::new());
        let governor = governor_with(gen);

        let request = GenerationRequest::new("generate a test", ArtifactType::Test);
        let err = governor
            .generate(&TenantId::new("ghost"), &UserId::new("u1"), &request, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::Governance(CoreError::TenantNotFound(_))
        ));
        assert_eq!(audit_actions(&governor), vec!["GENERATION_FAILURE".to_string()]);
    }

    #[tokio::test]
    async fn test_context_counts_toward_reservation() {
        let gen = Arc::new(ScriptedGenerator::new());
        let governor = governor_with(gen.clone());

        // Context alone exceeds the default 100k token budget
        let request = GenerationRequest::new("small ask", ArtifactType::Test)
            .with_context("x".repeat(500_000));
        let err = governor
            .generate(&TenantId::new("acme"), &UserId::new("u1"), &request, None)
            .await
            .unwrap_err();
        assert!(err.is_governance_rejection());
        assert_eq!(gen.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exactly_one_audit_entry_per_call() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply("ok test body");
        gen.push_failure("down");
        let governor = governor_with(gen);

        let request = GenerationRequest::new("generate a test", ArtifactType::Test);
        let tenant = TenantId::new("acme");
        let user = UserId::new("u1");
        let _ = governor.generate(&tenant, &user, &request, None).await;
        let _ = governor.generate(&tenant, &user, &request, None).await;

        assert_eq!(audit_actions(&governor).len(), 2);
    }
}
