//! Coderail configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration, shared by the governance core and the agent layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoderailConfig {
    /// Inference service settings
    pub inference: InferenceSettings,

    /// Vector store settings
    pub vector_store: VectorStoreSettings,

    /// Root of the linked working tree
    pub workspace_root: String,

    /// Directory for audit JSONL files; in-memory only when unset
    pub audit_dir: Option<String>,
}

impl Default for CoderailConfig {
    fn default() -> Self {
        Self {
            inference: InferenceSettings::default(),
            vector_store: VectorStoreSettings::default(),
            workspace_root: ".".to_string(),
            audit_dir: None,
        }
    }
}

impl CoderailConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working tree root
    pub fn with_workspace_root(mut self, root: impl Into<String>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Set the audit directory
    pub fn with_audit_dir(mut self, dir: impl Into<String>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Inference service settings (Ollama HTTP contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Base URL of the inference service
    pub base_url: String,

    /// Model used for text generation
    pub model: String,

    /// Model used for embeddings
    pub embed_model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retry cap for transient failures
    pub max_retries: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Vector store settings (Chroma HTTP contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    /// Base URL of the vector store service
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoderailConfig::default();
        assert!(config.inference.base_url.contains("11434"));
        assert!(config.audit_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let config = CoderailConfig::new()
            .with_workspace_root("/srv/repo")
            .with_audit_dir("/var/log/coderail");
        assert_eq!(config.workspace_root, "/srv/repo");
        assert_eq!(config.audit_dir.as_deref(), Some("/var/log/coderail"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = CoderailConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CoderailConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.inference.model, config.inference.model);
    }
}
