//! Workflow orchestration
//!
//! Drives one instruction through a fixed stage sequence: parse, branch,
//! generate, commit, push. Generation runs file by file under the request
//! governor; an execution failure for a file degrades to its built-in
//! template, while a governance rejection skips the file. A workflow with
//! zero written files fails before any commit is made. A push failure is
//! reported as a failed workflow but the branch and commit are kept; the
//! result carries everything that did happen.

pub mod parser;
pub mod templates;

use std::sync::Arc;

pub use parser::WorkflowParser;
pub use templates::{fallback_template, prompt_for, FileKind};

use coderail_core::{
    AuditEntry, GenerationRequest, SeverityClass, TenantId, UserId, WorkflowResult,
    FAILURE_SUFFIX,
};

use crate::git::GitOperations;
use crate::governor::RequestGovernor;
use crate::inference::TextGenerator;

/// Audit action tag for workflows
pub const WORKFLOW_ACTION: &str = "WORKFLOW";

/// Stage names used in failure reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Parse,
    Branch,
    Generate,
    Commit,
    Push,
}

impl WorkflowStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Branch => "branch",
            Self::Generate => "generate",
            Self::Commit => "commit",
            Self::Push => "push",
        }
    }
}

/// Branch, generate, commit, push - in that order, stopping at the first
/// stage that cannot proceed
pub struct WorkflowOrchestrator {
    governor: Arc<RequestGovernor>,
    git: Arc<dyn GitOperations>,
    parser: WorkflowParser,
}

impl WorkflowOrchestrator {
    pub fn new(
        governor: Arc<RequestGovernor>,
        git: Arc<dyn GitOperations>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            governor,
            git,
            parser: WorkflowParser::new(generator),
        }
    }

    async fn audit(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        success: bool,
        details: String,
    ) {
        let (action, class) = if success {
            (WORKFLOW_ACTION.to_string(), SeverityClass::Info)
        } else {
            (
                format!("{WORKFLOW_ACTION}{FAILURE_SUFFIX}"),
                SeverityClass::Warning,
            )
        };
        let entry = AuditEntry::new(
            tenant_id.clone(),
            user_id.clone(),
            action,
            "git",
            details,
            class,
        );
        if let Err(e) = self.governor.audit().record(entry).await {
            tracing::error!("Audit persistence failed: {}", e);
        }
    }

    fn failed(stage: WorkflowStage, branch: &str, files: Vec<String>, message: String) -> WorkflowResult {
        WorkflowResult {
            success: false,
            branch_name: branch.to_string(),
            files_generated: files,
            commit_hash: String::new(),
            error: Some(format!("{}: {}", stage.as_str(), message)),
        }
    }

    /// Run one workflow instruction end to end
    pub async fn execute(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        instruction: &str,
    ) -> WorkflowResult {
        let result = self.run(tenant_id, user_id, instruction).await;
        let details = match (result.success, &result.error) {
            (true, _) => format!(
                "branch {} with {} file(s), commit {}",
                result.branch_name,
                result.files_generated.len(),
                result.commit_hash
            ),
            (false, Some(error)) => error.clone(),
            (false, None) => "failed".to_string(),
        };
        self.audit(tenant_id, user_id, result.success, details).await;
        result
    }

    async fn run(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        instruction: &str,
    ) -> WorkflowResult {
        let tenant = match self.governor.tenant(tenant_id) {
            Ok(t) => t,
            Err(e) => return Self::failed(WorkflowStage::Parse, "", Vec::new(), e.to_string()),
        };
        if !tenant.has_permission("workflow", "execute") {
            return Self::failed(
                WorkflowStage::Parse,
                "",
                Vec::new(),
                "tenant lacks the workflow:execute grant".to_string(),
            );
        }

        let request = self.parser.parse(instruction).await;
        tracing::info!(
            "Workflow parsed: branch {} with {} file(s)",
            request.branch_name,
            request.files_to_generate.len()
        );

        if let Err(e) = self.git.create_branch(&request.branch_name) {
            return Self::failed(WorkflowStage::Branch, &request.branch_name, Vec::new(), e.to_string());
        }

        let mut written = Vec::new();
        for path in &request.files_to_generate {
            let kind = FileKind::classify(path);
            let prompt = prompt_for(kind, path, &request.feature_description);
            let generation =
                GenerationRequest::new(prompt, kind.artifact_type());

            let content = match self
                .governor
                .generate(tenant_id, user_id, &generation, None)
                .await
            {
                Ok(out) => out.text,
                Err(e) if e.is_governance_rejection() => {
                    // Governance said no; the file is skipped, not faked
                    tracing::warn!("Skipping {} after governance rejection: {}", path, e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Generation failed for {}, using template: {}", path, e);
                    fallback_template(kind, path, &request.feature_description)
                }
            };

            match self.git.write_file(path, &content) {
                Ok(()) => written.push(path.clone()),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path, e);
                }
            }
        }

        if written.is_empty() {
            return Self::failed(
                WorkflowStage::Generate,
                &request.branch_name,
                written,
                "no files were generated".to_string(),
            );
        }

        let commit_hash = match self.git.commit(&written, &request.commit_message) {
            Ok(hash) => hash,
            Err(e) => {
                return Self::failed(WorkflowStage::Commit, &request.branch_name, written, e.to_string())
            }
        };

        if let Err(e) = self.git.push(&request.branch_name) {
            // The branch and commit are kept; nothing is rolled back
            let mut result = Self::failed(
                WorkflowStage::Push,
                &request.branch_name,
                written,
                e.to_string(),
            );
            result.commit_hash = commit_hash;
            return result;
        }

        WorkflowResult {
            success: true,
            branch_name: request.branch_name,
            files_generated: written,
            commit_hash,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGit;
    use crate::inference::ScriptedGenerator;
    use coderail_core::{
        AuditFilter, AuditLog, ResourceLimits, Tenant, TenantDirectory, UsageLedger,
    };

    fn orchestrator(
        gen: Arc<ScriptedGenerator>,
        git: Arc<MockGit>,
        tenant: Tenant,
    ) -> (WorkflowOrchestrator, Arc<RequestGovernor>) {
        let tenants = Arc::new(TenantDirectory::new());
        tenants.register(tenant).unwrap();
        let governor = Arc::new(RequestGovernor::new(
            Arc::new(UsageLedger::new()),
            Arc::new(AuditLog::new()),
            tenants,
            gen.clone(),
        ));
        (
            WorkflowOrchestrator::new(governor.clone(), git, gen),
            governor,
        )
    }

    fn ids() -> (TenantId, UserId) {
        (TenantId::new("acme"), UserId::new("u1"))
    }

    #[tokio::test]
    async fn test_branch_collision_fails_cleanly() {
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new().with_existing_branch("AddCart"));
        let (orchestrator, _) = orchestrator(gen, git.clone(), Tenant::new("acme"));

        let (tenant, user) = ids();
        let result = orchestrator
            .execute(&tenant, &user, "create branch 'AddCart' for the cart")
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("branch:"));
        assert!(result.files_generated.is_empty());
        assert!(git.commit_messages().is_empty());
    }

    #[tokio::test]
    async fn test_all_generation_failures_still_commit_via_templates() {
        // No scripted replies: every model call fails, so parsing uses the
        // keyword fallback and every file uses its template
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new());
        let (orchestrator, _) = orchestrator(gen, git.clone(), Tenant::new("acme"));

        let (tenant, user) = ids();
        let result = orchestrator
            .execute(&tenant, &user, "create branch 'AddLogin' and add a login feature")
            .await;
        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.branch_name, "AddLogin");
        assert!(!result.files_generated.is_empty());
        assert!(!result.commit_hash.is_empty());

        let feature = git.file("features/login.feature").unwrap();
        assert!(feature.starts_with("Feature:"));
        // The commit stages exactly the files the workflow wrote
        assert_eq!(git.committed_files(), vec![result.files_generated.clone()]);
        assert_eq!(git.pushed_branches(), vec!["AddLogin".to_string()]);
    }

    #[tokio::test]
    async fn test_push_failure_keeps_commit() {
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new().with_failing_push());
        let (orchestrator, _) = orchestrator(gen, git.clone(), Tenant::new("acme"));

        let (tenant, user) = ids();
        let result = orchestrator
            .execute(&tenant, &user, "create branch 'AddCart' for the cart flow")
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("push:"));
        // Fail-forward: the commit survives the failed push
        assert!(!result.commit_hash.is_empty());
        assert!(!result.files_generated.is_empty());
        assert_eq!(git.commit_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_files_fails_before_commit() {
        // A one-token budget rejects every reservation, so every file is
        // skipped as a governance rejection
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new());
        let mut tenant = Tenant::new("acme");
        tenant.resource_limits = ResourceLimits {
            max_tokens_per_hour: 1,
            ..ResourceLimits::default()
        };
        let (orchestrator, _) = orchestrator(gen, git.clone(), tenant);

        let (tenant, user) = ids();
        let result = orchestrator
            .execute(&tenant, &user, "create branch 'AddCart' for the cart flow")
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("generate:"));
        assert!(result.commit_hash.is_empty());
        assert!(git.commit_messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_grant_rejected_before_any_git_work() {
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new());
        let mut tenant = Tenant::new("acme");
        tenant.permissions.retain(|p| p.resource != "workflow");
        let (orchestrator, _) = orchestrator(gen, git.clone(), tenant);

        let (tenant, user) = ids();
        let result = orchestrator
            .execute(&tenant, &user, "create branch 'AddCart'")
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("grant"));
        assert_eq!(git.current_branch().unwrap(), "main");
    }

    #[tokio::test]
    async fn test_workflow_audited_with_outcome_tag() {
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new().with_existing_branch("AddCart"));
        let (orchestrator, governor) = orchestrator(gen, git, Tenant::new("acme"));

        let (tenant, user) = ids();
        orchestrator
            .execute(&tenant, &user, "create branch 'AddCart'")
            .await;

        let filter = AuditFilter {
            action_contains: Some(WORKFLOW_ACTION.to_string()),
            ..AuditFilter::default()
        };
        let entries = governor.audit().query(&filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "WORKFLOW_FAILURE");
    }
}
