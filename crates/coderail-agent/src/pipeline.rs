//! Request pipeline
//!
//! The front door: free text in, one `PipelineResponse` out. The
//! interpreter decides whether the text is a catalogued command; commands
//! dispatch to the matching subsystem and everything else becomes a
//! retrieval-augmented chat generation. Every path that reaches the model
//! goes through the request governor, so a governance rejection and an
//! execution failure are never conflated in the response.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use coderail_core::{ArtifactType, CoreError, GenerationRequest, TenantId, UserId};

use crate::error::AgentError;
use crate::git::GitOperations;
use crate::governor::RequestGovernor;
use crate::inference::TextGenerator;
use crate::interpreter::{CommandInterpreter, CommandKind};
use crate::retrieval::{assemble_context, ContextRetriever};
use crate::workflow::WorkflowOrchestrator;

/// How many retrieval hits feed a generation prompt
const RETRIEVAL_TOP_K: usize = 5;

/// What kind of response a pipeline call produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Free-form chat answer
    Text,
    /// A catalogued command ran and returned information or an artifact
    Command,
    /// A workflow mutated repository state
    Action,
    /// The request was rejected or failed
    Error,
}

/// Terminal value of one pipeline call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub message: String,
    pub kind: ResponseKind,
    pub success: bool,
    pub suggestions: Vec<String>,
}

impl PipelineResponse {
    fn ok(kind: ResponseKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            success: true,
            suggestions: Vec::new(),
        }
    }

    fn error(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            message: message.into(),
            kind: ResponseKind::Error,
            success: false,
            suggestions,
        }
    }
}

/// Free text to governed response
pub struct RequestPipeline {
    interpreter: CommandInterpreter,
    governor: Arc<RequestGovernor>,
    orchestrator: WorkflowOrchestrator,
    git: Arc<dyn GitOperations>,
    retriever: Option<Arc<ContextRetriever>>,
    workspace_root: PathBuf,
}

impl RequestPipeline {
    pub fn new(
        governor: Arc<RequestGovernor>,
        generator: Arc<dyn TextGenerator>,
        git: Arc<dyn GitOperations>,
        retriever: Option<Arc<ContextRetriever>>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter: CommandInterpreter::new(generator.clone()),
            orchestrator: WorkflowOrchestrator::new(governor.clone(), git.clone(), generator),
            governor,
            git,
            retriever,
            workspace_root: workspace_root.into(),
        }
    }

    /// Handle one user message
    pub async fn handle(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> PipelineResponse {
        let parsed = self.interpreter.parse(text).await;
        match parsed.command {
            Some(CommandKind::CountTests) => self.count_tests(),
            Some(CommandKind::ShowStatus) => self.show_status(),
            Some(CommandKind::RunWorkflow) => self.run_workflow(tenant_id, user_id, text).await,
            Some(CommandKind::IndexRepository) => self.index_repository(tenant_id).await,
            Some(CommandKind::GenerateTest) => {
                self.generate(tenant_id, user_id, text, ArtifactType::Test).await
            }
            Some(CommandKind::GeneratePageObject) => {
                self.generate(tenant_id, user_id, text, ArtifactType::PageObject)
                    .await
            }
            Some(CommandKind::GenerateStepDefinition) => {
                self.generate(tenant_id, user_id, text, ArtifactType::StepDefinition)
                    .await
            }
            Some(CommandKind::GenerateFeature) => {
                self.generate(tenant_id, user_id, text, ArtifactType::Feature)
                    .await
            }
            None => self.chat(tenant_id, user_id, text).await,
        }
    }

    fn response_for_error(error: AgentError) -> PipelineResponse {
        let suggestions = match &error {
            AgentError::Governance(CoreError::PolicyRejected { verdict }) => {
                verdict.recommendations.clone()
            }
            _ => Vec::new(),
        };
        let prefix = if error.is_governance_rejection() {
            "Request rejected"
        } else {
            "Request failed"
        };
        PipelineResponse::error(format!("{prefix}: {error}"), suggestions)
    }

    /// Retrieved context for a prompt, when a retriever is configured.
    /// Retrieval failures degrade to no context rather than failing the
    /// request.
    async fn context_for(&self, tenant_id: &TenantId, text: &str) -> Option<String> {
        let retriever = self.retriever.as_ref()?;
        match retriever.query(tenant_id, text, RETRIEVAL_TOP_K).await {
            Ok(hits) if !hits.is_empty() => Some(assemble_context(&hits)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Retrieval failed, generating without context: {}", e);
                None
            }
        }
    }

    async fn generate(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
        artifact_type: ArtifactType,
    ) -> PipelineResponse {
        let mut request = GenerationRequest::new(text, artifact_type);
        if let Some(context) = self.context_for(tenant_id, text).await {
            request = request.with_context(context);
        }
        match self.governor.generate(tenant_id, user_id, &request, None).await {
            Ok(out) => {
                let mut response = PipelineResponse::ok(ResponseKind::Command, out.text);
                response.suggestions = out.advisories.recommendations;
                response
            }
            Err(e) => Self::response_for_error(e),
        }
    }

    async fn chat(&self, tenant_id: &TenantId, user_id: &UserId, text: &str) -> PipelineResponse {
        let mut request = GenerationRequest::new(text, ArtifactType::Test);
        if let Some(context) = self.context_for(tenant_id, text).await {
            request = request.with_context(context);
        }
        match self.governor.generate(tenant_id, user_id, &request, None).await {
            Ok(out) => PipelineResponse::ok(ResponseKind::Text, out.text),
            Err(e) => Self::response_for_error(e),
        }
    }

    async fn run_workflow(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> PipelineResponse {
        let result = self.orchestrator.execute(tenant_id, user_id, text).await;
        if result.success {
            PipelineResponse::ok(
                ResponseKind::Action,
                format!(
                    "Created branch {} with {} file(s), commit {}",
                    result.branch_name,
                    result.files_generated.len(),
                    result.commit_hash
                ),
            )
        } else {
            PipelineResponse::error(
                format!(
                    "Workflow failed: {}",
                    result.error.unwrap_or_else(|| "unknown".to_string())
                ),
                Vec::new(),
            )
        }
    }

    async fn index_repository(&self, tenant_id: &TenantId) -> PipelineResponse {
        let Some(retriever) = self.retriever.as_ref() else {
            return PipelineResponse::error("No vector store is configured", Vec::new());
        };
        match retriever.index(tenant_id, &self.workspace_root).await {
            Ok(count) => PipelineResponse::ok(
                ResponseKind::Command,
                format!("Indexed {count} chunk(s) from the workspace"),
            ),
            Err(e) => PipelineResponse::error(format!("Indexing failed: {e}"), Vec::new()),
        }
    }

    fn show_status(&self) -> PipelineResponse {
        let branch = match self.git.current_branch() {
            Ok(b) => b,
            Err(e) => return PipelineResponse::error(format!("Status failed: {e}"), Vec::new()),
        };
        let changed = match self.git.status() {
            Ok(paths) => paths,
            Err(e) => return PipelineResponse::error(format!("Status failed: {e}"), Vec::new()),
        };
        PipelineResponse::ok(
            ResponseKind::Command,
            format!("On branch {} with {} changed file(s)", branch, changed.len()),
        )
    }

    /// Count test-like files in the workspace without touching the model
    fn count_tests(&self) -> PipelineResponse {
        let mut count = 0usize;
        let walker = WalkDir::new(&self.workspace_root)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir()
                    && matches!(name.as_ref(), "node_modules" | "target" | ".git" | "dist"))
            });
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(".feature")
                || name.contains(".spec.")
                || name.contains(".test.")
                || name.starts_with("test_")
            {
                count += 1;
            }
        }
        PipelineResponse::ok(
            ResponseKind::Command,
            format!("Found {count} test file(s) in the workspace"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGit;
    use crate::inference::ScriptedGenerator;
    use coderail_core::{AuditLog, Tenant, TenantDirectory, UsageLedger};

    fn pipeline_over(
        gen: Arc<ScriptedGenerator>,
        git: Arc<MockGit>,
        root: impl Into<PathBuf>,
    ) -> RequestPipeline {
        let tenants = Arc::new(TenantDirectory::new());
        tenants.register(Tenant::new("acme")).unwrap();
        let governor = Arc::new(RequestGovernor::new(
            Arc::new(UsageLedger::new()),
            Arc::new(AuditLog::new()),
            tenants,
            gen.clone(),
        ));
        RequestPipeline::new(governor, gen, git, None, root)
    }

    fn ids() -> (TenantId, UserId) {
        (TenantId::new("acme"), UserId::new("u1"))
    }

    #[tokio::test]
    async fn test_count_tests_never_calls_the_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/login.spec.ts"), "test").unwrap();
        std::fs::write(dir.path().join("tests/cart.feature"), "Feature:").unwrap();
        std::fs::write(dir.path().join("tests/readme.md"), "docs").unwrap();

        let gen = Arc::new(ScriptedGenerator::new());
        let pipeline = pipeline_over(gen.clone(), Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline.handle(&tenant, &user, "count tests").await;
        assert_eq!(response.kind, ResponseKind::Command);
        assert!(response.message.contains("2 test file(s)"));
        assert_eq!(gen.call_count(), 0);
    }

    #[tokio::test]
    async fn test_workflow_command_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        let git = Arc::new(MockGit::new());
        let pipeline = pipeline_over(gen, git.clone(), dir.path());

        let (tenant, user) = ids();
        let response = pipeline
            .handle(
                &tenant,
                &user,
                "create branch 'AddCart' and add a cart feature, commit for review",
            )
            .await;
        assert_eq!(response.kind, ResponseKind::Action);
        assert!(response.success);
        assert!(response.message.contains("AddCart"));
        assert_eq!(git.pushed_branches(), vec!["AddCart".to_string()]);
    }

    #[tokio::test]
    async fn test_chat_policy_rejection_carries_recommendations() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        // The interpreter consults the model before the chat path rejects
        gen.push_failure("inference down");
        let pipeline = pipeline_over(gen, Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline
            .handle(&tenant, &user, "my password = hunter2secret please remember it")
            .await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(!response.success);
        assert!(response.message.starts_with("Request rejected"));
        assert!(!response.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_generate_command_returns_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply("test('login', async ({ page }) => {});");
        let pipeline = pipeline_over(gen, Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline
            .handle(&tenant, &user, "generate a test for the login page")
            .await;
        assert_eq!(response.kind, ResponseKind::Command);
        assert!(response.success);
        assert!(response.message.contains("login"));
    }

    #[tokio::test]
    async fn test_status_command() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        let pipeline = pipeline_over(gen, Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline.handle(&tenant, &user, "show status").await;
        assert_eq!(response.kind, ResponseKind::Command);
        assert!(response.message.contains("On branch main"));
    }

    #[tokio::test]
    async fn test_index_without_store_is_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        let pipeline = pipeline_over(gen, Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline.handle(&tenant, &user, "index the repository").await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(response.message.contains("vector store"));
    }

    #[tokio::test]
    async fn test_execution_failure_is_not_a_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_failure("inference down");
        let pipeline = pipeline_over(gen, Arc::new(MockGit::new()), dir.path());

        let (tenant, user) = ids();
        let response = pipeline
            .handle(&tenant, &user, "generate a test for the login page")
            .await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(response.message.starts_with("Request failed"));
        assert!(response.suggestions.is_empty());
    }
}
