//! Test fixtures and builders

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::git::{create_test_commit, setup_git_repo};

/// A plain directory tree with automatic cleanup
pub struct TestTree {
    pub temp_dir: TempDir,
}

impl TestTree {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Builds a tree from `(relative_path, content)` pairs, in the given order
    pub fn with_files(files: &[(&str, &str)]) -> Result<Self> {
        let tree = Self::new()?;
        for (name, content) in files {
            tree.create_file(name, content)?;
        }
        Ok(tree)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file, creating parent directories as needed
    pub fn create_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file_path, content)?;
        Ok(file_path)
    }

    pub fn remove_file(&self, name: &str) -> Result<()> {
        std::fs::remove_file(self.path().join(name))?;
        Ok(())
    }
}

/// A git work tree with automatic cleanup
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub name: String,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Commits a new file
    pub fn commit_file(&self, name: &str, content: &str, message: &str) -> Result<()> {
        create_test_commit(self.path(), name, content, message)
    }
}

/// Builder for creating test repositories
pub struct TestRepoBuilder {
    name: String,
    with_commits: usize,
}

impl TestRepoBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            with_commits: 1,
        }
    }

    pub fn with_commits(mut self, count: usize) -> Self {
        self.with_commits = count;
        self
    }

    pub fn build(self) -> Result<TestRepo> {
        let temp_dir = TempDir::new()?;
        setup_git_repo(temp_dir.path())?;

        for i in 0..self.with_commits {
            create_test_commit(
                temp_dir.path(),
                &format!("file-{}.txt", i + 1),
                &format!("content {}", i + 1),
                &format!("Commit {}", i + 1),
            )?;
        }

        Ok(TestRepo {
            temp_dir,
            name: self.name,
        })
    }
}
