//! Git boundary for the workflow engine
//!
//! `GitOperations` is the seam the orchestrator drives; `Git2Workspace`
//! implements it over libgit2 with a per-repository lock, and `MockGit`
//! implements it in memory for tests. Branch creation on an existing name
//! is an error, never a silent reuse.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use git2::{BranchType, Repository, Signature};
use parking_lot::Mutex;

use crate::error::{AgentError, Result};

/// The git operations the workflow engine needs
pub trait GitOperations: Send + Sync {
    /// Create `name` from the current HEAD and switch to it. Fails if the
    /// branch already exists.
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Shorthand name of the checked-out branch
    fn current_branch(&self) -> Result<String>;

    /// Paths with uncommitted changes
    fn status(&self) -> Result<Vec<String>>;

    /// Write a file under the repository root. The path must be relative
    /// and must not escape the root.
    fn write_file(&self, rel_path: &str, content: &str) -> Result<()>;

    /// Stage exactly `files` and commit; returns the commit hash.
    /// Unrelated dirty files in the working tree are left alone.
    fn commit(&self, files: &[String], message: &str) -> Result<String>;

    /// Push `branch` to origin
    fn push(&self, branch: &str) -> Result<()>;
}

fn validate_rel_path(rel_path: &str) -> Result<&Path> {
    let path = Path::new(rel_path);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes || path.as_os_str().is_empty() {
        return Err(AgentError::Git(format!(
            "refusing to write outside the repository: {rel_path}"
        )));
    }
    Ok(path)
}

/// libgit2-backed workspace. All repository access goes through one lock;
/// libgit2 handles are not safe to share across concurrent operations.
pub struct Git2Workspace {
    repo: Mutex<Repository>,
    root: PathBuf,
}

impl Git2Workspace {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let repo = Repository::open(&root)?;
        Ok(Self {
            repo: Mutex::new(repo),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>> {
        match repo.signature() {
            Ok(sig) => Ok(sig),
            // No user.name/user.email configured; fall back to a service
            // identity rather than failing the commit
            Err(_) => Ok(Signature::now("coderail", "coderail@localhost")?),
        }
    }
}

impl GitOperations for Git2Workspace {
    fn create_branch(&self, name: &str) -> Result<()> {
        let repo = self.repo.lock();
        if repo.find_branch(name, BranchType::Local).is_ok() {
            return Err(AgentError::Git(format!("branch already exists: {name}")));
        }
        let head = repo.head()?.peel_to_commit()?;
        repo.branch(name, &head, false)?;
        repo.set_head(&format!("refs/heads/{name}"))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().safe()))?;
        tracing::info!("Created and switched to branch {}", name);
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let repo = self.repo.lock();
        let head = repo.head()?;
        head.shorthand()
            .map(String::from)
            .ok_or_else(|| AgentError::Git("detached HEAD".to_string()))
    }

    fn status(&self) -> Result<Vec<String>> {
        let repo = self.repo.lock();
        let statuses = repo.statuses(None)?;
        Ok(statuses
            .iter()
            .filter_map(|e| e.path().map(String::from))
            .collect())
    }

    fn write_file(&self, rel_path: &str, content: &str) -> Result<()> {
        let path = validate_rel_path(rel_path)?;
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;
        Ok(())
    }

    fn commit(&self, files: &[String], message: &str) -> Result<String> {
        if files.is_empty() {
            return Err(AgentError::Git("nothing to commit".to_string()));
        }
        let repo = self.repo.lock();
        let mut index = repo.index()?;
        for file in files {
            index.add_path(validate_rel_path(file)?)?;
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Self::signature(&repo)?;
        let parent = repo.head()?.peel_to_commit()?;
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;

        tracing::info!("Committed {}", oid);
        Ok(oid.to_string())
    }

    fn push(&self, branch: &str) -> Result<()> {
        let repo = self.repo.lock();
        let mut remote = repo
            .find_remote("origin")
            .map_err(|_| AgentError::Git("no origin remote configured".to_string()))?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        remote.push(&[refspec.as_str()], None)?;
        tracing::info!("Pushed {} to origin", branch);
        Ok(())
    }
}

#[derive(Default)]
struct MockGitState {
    branches: HashSet<String>,
    current: String,
    files: HashMap<String, String>,
    commits: Vec<String>,
    committed_files: Vec<Vec<String>>,
    pushed: Vec<String>,
}

/// In-memory git double for orchestrator tests
pub struct MockGit {
    state: Mutex<MockGitState>,
    fail_push: bool,
}

impl MockGit {
    pub fn new() -> Self {
        let mut state = MockGitState::default();
        state.branches.insert("main".to_string());
        state.current = "main".to_string();
        Self {
            state: Mutex::new(state),
            fail_push: false,
        }
    }

    /// Make every push fail, for fail-forward tests
    pub fn with_failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Pre-seed a branch so creation collides
    pub fn with_existing_branch(self, name: &str) -> Self {
        self.state.lock().branches.insert(name.to_string());
        self
    }

    pub fn file(&self, rel_path: &str) -> Option<String> {
        self.state.lock().files.get(rel_path).cloned()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().commits.clone()
    }

    /// Paths staged for each commit, in commit order
    pub fn committed_files(&self) -> Vec<Vec<String>> {
        self.state.lock().committed_files.clone()
    }

    pub fn pushed_branches(&self) -> Vec<String> {
        self.state.lock().pushed.clone()
    }
}

impl Default for MockGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitOperations for MockGit {
    fn create_branch(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.branches.insert(name.to_string()) {
            return Err(AgentError::Git(format!("branch already exists: {name}")));
        }
        state.current = name.to_string();
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.state.lock().current.clone())
    }

    fn status(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().files.keys().cloned().collect())
    }

    fn write_file(&self, rel_path: &str, content: &str) -> Result<()> {
        validate_rel_path(rel_path)?;
        self.state
            .lock()
            .files
            .insert(rel_path.to_string(), content.to_string());
        Ok(())
    }

    fn commit(&self, files: &[String], message: &str) -> Result<String> {
        if files.is_empty() {
            return Err(AgentError::Git("nothing to commit".to_string()));
        }
        let mut state = self.state.lock();
        state.commits.push(message.to_string());
        state.committed_files.push(files.to_vec());
        Ok(format!("mock{:07}", state.commits.len()))
    }

    fn push(&self, branch: &str) -> Result<()> {
        if self.fail_push {
            return Err(AgentError::Git("remote rejected the push".to_string()));
        }
        self.state.lock().pushed.push(branch.to_string());
        Ok(())
    }
}
