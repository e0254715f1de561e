//! Coderail Agent - governed AI orchestration layer
//!
//! Turns free-text requests into governed actions over a locally hosted
//! inference service and a git workspace:
//!
//! - **Interpreter**: classifies text against a closed command catalogue
//! - **Governor**: the choke point every generation passes through
//!   (policy, rate gate, budget reservation, output rescan, audit)
//! - **Retrieval**: chunked, embedded, tenant-scoped code context
//! - **Workflow**: branch, generate, commit, push as a stage machine
//! - **Pipeline**: the front door composing all of the above
//!
//! Governance semantics live in `coderail-core`; this crate supplies the
//! side-effecting half: HTTP clients, git, filesystem walking.

pub mod error;
pub mod git;
pub mod governor;
pub mod inference;
pub mod interpreter;
pub mod pipeline;
pub mod retrieval;
pub mod workflow;

pub use error::{AgentError, Result};
pub use git::{Git2Workspace, GitOperations, MockGit};
pub use governor::{GovernedOutput, RequestGovernor, GENERATION_ACTION};
pub use inference::{
    EmbeddingClient, GenerationOptions, GenerationOutput, OllamaClient, SamplingProfile,
    ScriptedGenerator, TextGenerator,
};
pub use interpreter::{CommandInterpreter, CommandKind, Intent, ParsedCommand};
pub use pipeline::{PipelineResponse, RequestPipeline, ResponseKind};
pub use retrieval::{
    assemble_context, ContextRetriever, EmbeddingChunk, HttpVectorStore, InMemoryVectorStore,
    ScoredChunk, VectorStore, CHUNK_LINES, CONTEXT_CHAR_LIMIT, TRUNCATION_MARKER, UPSERT_BATCH,
};
pub use workflow::{WorkflowOrchestrator, WorkflowParser, WorkflowStage, WORKFLOW_ACTION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
