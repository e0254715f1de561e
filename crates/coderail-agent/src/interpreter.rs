//! Command interpreter
//!
//! Turns free text into a typed intent over a closed command catalogue.
//! Three stages, in priority order: exact containment match against a
//! static phrase table (no model call), model-assisted classification
//! (strict JSON, accepted only above the confidence threshold and only for
//! catalogued actions), then fuzzy word-set matching as the degradation
//! path. Text that matches none of the stages is not a special command and
//! is routed to free-form chat by the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::inference::{GenerationOptions, TextGenerator};

/// Minimum confidence for a model-classified intent
pub const MODEL_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Minimum word-set score for a fuzzy match
pub const FUZZY_THRESHOLD: f64 = 0.8;

/// The closed command catalogue. Adding a variant forces every dispatch
/// site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CountTests,
    GenerateTest,
    GeneratePageObject,
    GenerateStepDefinition,
    GenerateFeature,
    RunWorkflow,
    IndexRepository,
    ShowStatus,
}

impl CommandKind {
    pub const ALL: [CommandKind; 8] = [
        CommandKind::CountTests,
        CommandKind::GenerateTest,
        CommandKind::GeneratePageObject,
        CommandKind::GenerateStepDefinition,
        CommandKind::GenerateFeature,
        CommandKind::RunWorkflow,
        CommandKind::IndexRepository,
        CommandKind::ShowStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountTests => "count_tests",
            Self::GenerateTest => "generate_test",
            Self::GeneratePageObject => "generate_page_object",
            Self::GenerateStepDefinition => "generate_step_definition",
            Self::GenerateFeature => "generate_feature",
            Self::RunWorkflow => "run_workflow",
            Self::IndexRepository => "index_repository",
            Self::ShowStatus => "show_status",
        }
    }

    /// Static action-name to command map used to vet model output
    pub fn from_action(action: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == action)
    }

    /// Known phrasings for the exact and fuzzy stages
    fn phrasings(&self) -> &'static [&'static str] {
        match self {
            Self::CountTests => &["count tests", "how many tests", "number of tests", "test count"],
            Self::GenerateTest => &["generate test", "generate a test", "create a test", "write a test"],
            Self::GeneratePageObject => &[
                "generate page object",
                "create page object",
                "generate a page object",
            ],
            Self::GenerateStepDefinition => &[
                "generate step definitions",
                "create step definitions",
                "generate step definition",
            ],
            Self::GenerateFeature => &[
                "generate feature file",
                "create feature file",
                "write a feature file",
            ],
            Self::RunWorkflow => &[
                "create branch",
                "create a branch",
                "commit for review",
                "run workflow",
            ],
            Self::IndexRepository => &[
                "index repository",
                "index the repository",
                "index the repo",
                "reindex",
            ],
            Self::ShowStatus => &["show status", "repo status", "git status", "current branch"],
        }
    }
}

/// Model-classified intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    pub confidence: f64,
}

/// Outcome of one parse
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub is_special: bool,
    pub command: Option<CommandKind>,
    pub intent: Option<Intent>,
}

impl ParsedCommand {
    fn special(command: CommandKind, intent: Intent) -> Self {
        Self {
            is_special: true,
            command: Some(command),
            intent: Some(intent),
        }
    }

    fn not_special() -> Self {
        Self {
            is_special: false,
            command: None,
            intent: None,
        }
    }
}

/// Free-text to intent interpreter
pub struct CommandInterpreter {
    generator: Arc<dyn TextGenerator>,
}

impl CommandInterpreter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Parse free text into a command, or decide it is free-form chat
    pub async fn parse(&self, text: &str) -> ParsedCommand {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return ParsedCommand::not_special();
        }

        // Stage 1: exact containment match, no model call
        if let Some(kind) = Self::exact_match(&normalized) {
            return ParsedCommand::special(
                kind,
                Intent {
                    action: kind.as_str().to_string(),
                    target: None,
                    confidence: 1.0,
                },
            );
        }

        // Stage 2: model-assisted classification; failure degrades to
        // stage 3, never aborts the parse
        match self.classify_with_model(text).await {
            Ok(Some((kind, intent))) => return ParsedCommand::special(kind, intent),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Model classification failed, falling back to fuzzy: {}", e);
            }
        }

        // Stage 3: fuzzy word-set matching
        if let Some((kind, score)) = Self::fuzzy_match(&normalized) {
            return ParsedCommand::special(
                kind,
                Intent {
                    action: kind.as_str().to_string(),
                    target: None,
                    confidence: score,
                },
            );
        }

        ParsedCommand::not_special()
    }

    fn exact_match(normalized: &str) -> Option<CommandKind> {
        CommandKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.phrasings().iter().any(|p| normalized.contains(p)))
    }

    async fn classify_with_model(
        &self,
        text: &str,
    ) -> crate::error::Result<Option<(CommandKind, Intent)>> {
        let catalogue = CommandKind::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "You classify user requests for a test-automation assistant.\n\
             Supported actions: {catalogue}.\n\
             Reply with strict JSON only: {{\"action\": \"<one of the actions>\", \
             \"target\": \"<optional subject>\", \"confidence\": <0.0-1.0>}}.\n\
             If the request matches no action, use confidence 0.0.\n\
             Request: {text}"
        );

        let overrides = GenerationOptions {
            temperature: Some(0.0),
            max_tokens: Some(128),
            ..GenerationOptions::default()
        };
        let output = self.generator.generate(&prompt, Some(overrides)).await?;

        let Some(json) = extract_json_object(&output.text) else {
            return Ok(None);
        };
        let Ok(intent) = serde_json::from_str::<Intent>(&json) else {
            return Ok(None);
        };
        if intent.confidence <= MODEL_CONFIDENCE_THRESHOLD {
            return Ok(None);
        }
        let Some(kind) = CommandKind::from_action(&intent.action) else {
            return Ok(None);
        };
        Ok(Some((kind, intent)))
    }

    fn fuzzy_match(normalized: &str) -> Option<(CommandKind, f64)> {
        let input_words: HashSet<&str> = normalized
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();
        if input_words.is_empty() {
            return None;
        }

        let mut best: Option<(CommandKind, f64)> = None;
        for kind in CommandKind::ALL {
            for phrasing in kind.phrasings() {
                let phrase_words: HashSet<&str> = phrasing.split_whitespace().collect();
                let intersection = input_words.intersection(&phrase_words).count() as f64;
                let denominator = input_words.len().max(phrase_words.len()) as f64;
                let score = intersection / denominator;
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((kind, score));
                }
            }
        }
        best.filter(|(_, score)| *score > FUZZY_THRESHOLD)
    }
}

/// Pull the first balanced JSON object out of model output that may wrap it
/// in prose or code fences
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
