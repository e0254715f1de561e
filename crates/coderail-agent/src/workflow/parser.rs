//! Workflow request parsing
//!
//! Turns a free-text instruction into a `WorkflowRequest` by trying
//! strategies in order: model-assisted extraction (strict JSON), then a
//! deterministic keyword fallback. The fallback cannot fail and never
//! returns an empty file list, so a workflow request always materializes.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use coderail_core::WorkflowRequest;

use crate::inference::{GenerationOptions, TextGenerator};
use crate::interpreter::extract_json_object;

lazy_static! {
    /// Quoted branch name: create branch 'AddCart' / "feature/login"
    static ref QUOTED_NAME: Regex =
        Regex::new(r#"['"]([A-Za-z0-9][A-Za-z0-9_\-/]*)['"]"#).expect("quoted name regex");
    /// Unquoted form: branch AddCart
    static ref BRANCH_WORD: Regex =
        Regex::new(r"(?i)\bbranch\s+(?:named\s+|called\s+)?([A-Za-z0-9][A-Za-z0-9_\-/]*)")
            .expect("branch word regex");
}

/// Keep branch names within git's safe character set
fn sanitize_branch(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '/') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(['-', '/']).to_string();
    if cleaned.is_empty() {
        "generated-work".to_string()
    } else {
        cleaned
    }
}

/// Parses free text into workflow requests
pub struct WorkflowParser {
    generator: Arc<dyn TextGenerator>,
}

impl WorkflowParser {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Parse `text` into a workflow request. Strategy order is fixed:
    /// model extraction first, keyword fallback second. The result is
    /// always usable.
    pub async fn parse(&self, text: &str) -> WorkflowRequest {
        match self.model_extract(text).await {
            Some(request) => request,
            None => Self::keyword_fallback(text),
        }
    }

    async fn model_extract(&self, text: &str) -> Option<WorkflowRequest> {
        let prompt = format!(
            "Extract a git workflow request from the instruction below.\n\
             Reply with strict JSON only:\n\
             {{\"branch_name\": \"...\", \"feature_description\": \"...\", \
             \"files_to_generate\": [\"...\"], \"commit_message\": \"...\"}}\n\
             Instruction: {text}"
        );
        let overrides = GenerationOptions {
            temperature: Some(0.0),
            max_tokens: Some(512),
            ..GenerationOptions::default()
        };
        let output = match self.generator.generate(&prompt, Some(overrides)).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!("Workflow extraction failed, using keyword fallback: {}", e);
                return None;
            }
        };

        let json = extract_json_object(&output.text)?;
        let mut request: WorkflowRequest = serde_json::from_str(&json).ok()?;

        // A request the orchestrator cannot act on is treated as a miss
        request.branch_name = sanitize_branch(&request.branch_name);
        request.files_to_generate.retain(|f| !f.trim().is_empty());
        if request.files_to_generate.is_empty() {
            return None;
        }
        if request.commit_message.trim().is_empty() {
            request.commit_message = format!("Add {}", request.feature_description);
        }
        Some(request)
    }

    /// Deterministic extraction: branch name from quoting or the word
    /// following "branch", files from feature keywords. Never fails.
    fn keyword_fallback(text: &str) -> WorkflowRequest {
        let branch_name = QUOTED_NAME
            .captures(text)
            .or_else(|| BRANCH_WORD.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| sanitize_branch(m.as_str()))
            .unwrap_or_else(|| "generated-work".to_string());

        let lower = text.to_lowercase();
        let mut topics: Vec<&str> = Vec::new();
        for topic in ["login", "cart", "checkout", "search", "signup", "profile"] {
            if lower.contains(topic) {
                topics.push(topic);
            }
        }
        if topics.is_empty() {
            topics.push("feature");
        }

        let mut files = Vec::new();
        for topic in &topics {
            files.push(format!("features/{topic}.feature"));
            files.push(format!("steps/{topic}.steps.ts"));
        }

        let feature_description = if topics == ["feature"] {
            text.trim().to_string()
        } else {
            topics.join(" and ")
        };

        WorkflowRequest {
            branch_name,
            feature_description: feature_description.clone(),
            files_to_generate: files,
            commit_message: format!("Add {feature_description} artifacts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ScriptedGenerator;

    #[tokio::test]
    async fn test_model_extraction_preferred() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply(
            r#"{"branch_name": "feature/AddCart", "feature_description": "cart",
                "files_to_generate": ["features/cart.feature"],
                "commit_message": "Add cart feature"}"#,
        );
        let parser = WorkflowParser::new(gen);

        let request = parser.parse("add the cart feature on a new branch").await;
        assert_eq!(request.branch_name, "feature/AddCart");
        assert_eq!(request.files_to_generate, vec!["features/cart.feature"]);
    }

    #[tokio::test]
    async fn test_fallback_extracts_quoted_branch_and_topics() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_failure("inference down");
        let parser = WorkflowParser::new(gen);

        let request = parser
            .parse("create branch 'AddCart' and add a login and cart feature, commit for review")
            .await;
        assert_eq!(request.branch_name, "AddCart");
        assert!(request
            .files_to_generate
            .contains(&"features/login.feature".to_string()));
        assert!(request
            .files_to_generate
            .contains(&"features/cart.feature".to_string()));
        assert!(!request.commit_message.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_never_empty() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_failure("inference down");
        let parser = WorkflowParser::new(gen);

        let request = parser.parse("do something useful please").await;
        assert!(!request.branch_name.is_empty());
        assert!(!request.files_to_generate.is_empty());
        assert!(!request.commit_message.is_empty());
    }

    #[tokio::test]
    async fn test_model_reply_without_files_falls_back() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push_reply(
            r#"{"branch_name": "x", "feature_description": "y",
                "files_to_generate": [], "commit_message": "z"}"#,
        );
        let parser = WorkflowParser::new(gen);

        let request = parser.parse("create branch 'Login' for the login flow").await;
        assert_eq!(request.branch_name, "Login");
        assert!(!request.files_to_generate.is_empty());
    }

    #[test]
    fn test_branch_sanitization() {
        assert_eq!(sanitize_branch("Add Cart!"), "Add-Cart");
        assert_eq!(sanitize_branch("feature/login"), "feature/login");
        assert_eq!(sanitize_branch("///"), "generated-work");
    }
}
