//! Source-tree chunking
//!
//! Walks a source tree, skips build/dependency directories, restricts to an
//! allow-listed set of text-like extensions, and splits each file into
//! fixed-size non-overlapping line windows. The window bounds the size of
//! each embedding request.

use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;

/// Lines per chunk window
pub const CHUNK_LINES: usize = 20;

/// Directories never walked into
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "dist",
    "build",
    ".venv",
    "venv",
    "__pycache__",
    "coverage",
    ".next",
];

/// Extensions treated as indexable text
const ALLOWED_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "java", "cs", "rb", "go", "feature", "md", "json",
    "yaml", "yml", "toml", "html", "css", "txt",
];

/// Per-chunk source location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A fixed-size slice of a source file, the unit of embedding and retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

fn is_allowed_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Split one file into non-overlapping line windows
pub fn chunk_file(rel_path: &str, content: &str) -> Vec<EmbeddingChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let mut chunks = Vec::new();

    for (index, window) in lines.chunks(CHUNK_LINES).enumerate() {
        let text = window.join("\n");
        if text.trim().is_empty() {
            continue;
        }
        let start_line = index * CHUNK_LINES + 1;
        let end_line = start_line + window.len() - 1;
        chunks.push(EmbeddingChunk {
            id: format!("{rel_path}:{start_line}-{end_line}"),
            text,
            metadata: ChunkMetadata {
                file_path: rel_path.to_string(),
                start_line,
                end_line,
            },
        });
    }
    chunks
}

/// Walk a source tree and chunk every indexable file
pub fn chunk_tree(root: &Path) -> Result<Vec<EmbeddingChunk>> {
    let mut chunks = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !(entry.file_type().is_dir() && is_excluded_dir(&name))
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_allowed_file(entry.path()) {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", rel_path, e);
                continue;
            }
        };
        chunks.extend(chunk_file(&rel_path, &content));
    }

    tracing::info!("Chunked {} window(s) under {}", chunks.len(), root.display());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_windows_are_fixed_and_non_overlapping() {
        let content = (1..=45).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_file("src/app.ts", &content);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].metadata.start_line, 1);
        assert_eq!(chunks[0].metadata.end_line, 20);
        assert_eq!(chunks[1].metadata.start_line, 21);
        assert_eq!(chunks[1].metadata.end_line, 40);
        assert_eq!(chunks[2].metadata.start_line, 41);
        assert_eq!(chunks[2].metadata.end_line, 45);
        assert!(chunks[0].text.starts_with("line 1\n"));
        assert!(chunks[2].text.ends_with("line 45"));
    }

    #[test]
    fn test_blank_windows_skipped() {
        let chunks = chunk_file("empty.md", "\n\n\n");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_tree_walk_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/main.ts"), "const a = 1;").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "junk").unwrap();
        std::fs::write(dir.path().join("image.png"), "binary").unwrap();

        let chunks = chunk_tree(dir.path()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.file_path, "src/main.ts");
    }
}
