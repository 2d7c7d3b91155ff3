use crate::init::PRIMER_DIR;
use anyhow::{Context, Result};
use git2::{Repository, StatusOptions};
use std::path::{Path, PathBuf};

/// Uncommitted changes in the working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    /// Repository-relative paths with staged, unstaged or untracked changes
    pub dirty_paths: Vec<String>,
}

impl WorkingTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.dirty_paths.is_empty()
    }
}

pub struct GitTracker {
    repo: Repository,
    /// `.primer/` relative to the repository root, always ignored
    primer_prefix: Option<PathBuf>,
}

impl GitTracker {
    /// Open the repository containing `project_dir`.
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(project_dir).context("Failed to open git repository")?;

        let primer_prefix = repo.workdir().and_then(|workdir| {
            let workdir = workdir.canonicalize().ok()?;
            let project = project_dir.canonicalize().ok()?;
            project
                .strip_prefix(&workdir)
                .ok()
                .map(|rel| rel.join(PRIMER_DIR))
        });

        Ok(Self {
            repo,
            primer_prefix,
        })
    }

    /// Whether `project_dir` is inside a git repository.
    pub fn is_repository(project_dir: &Path) -> bool {
        Repository::discover(project_dir).is_ok()
    }

    /// Report every changed path, untracked files included and ignored
    /// files excluded.
    pub fn working_tree_status(&self) -> Result<WorkingTreeStatus> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("Failed to read git status")?;

        let mut dirty_paths: Vec<String> = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(|p| p.to_string()))
            .filter(|path| !self.is_primer_path(path))
            .collect();
        dirty_paths.sort();

        Ok(WorkingTreeStatus { dirty_paths })
    }

    /// Get the current HEAD sha, or None for unborn branches
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }

    fn is_primer_path(&self, path: &str) -> bool {
        match &self.primer_prefix {
            Some(prefix) => Path::new(path).starts_with(prefix),
            None => Path::new(path).starts_with(PRIMER_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_repo() -> (GitTracker, TempDir) {
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        let tracker = GitTracker::new(dir.path()).unwrap();
        (tracker, dir)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    #[test]
    fn test_clean_after_commit() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "readme.txt", "hello", "init");

        let status = tracker.working_tree_status().unwrap();
        assert!(status.is_clean(), "unexpected: {:?}", status.dirty_paths);
        assert_eq!(tracker.head_sha().unwrap().len(), 40);
    }

    #[test]
    fn test_untracked_and_modified_are_dirty() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "readme.txt", "hello", "init");
        fs::write(dir.path().join("readme.txt"), "changed").unwrap();
        fs::write(dir.path().join("new.txt"), "new").unwrap();

        let status = tracker.working_tree_status().unwrap();
        assert_eq!(status.dirty_paths, vec!["new.txt", "readme.txt"]);
    }

    #[test]
    fn test_ignored_and_primer_files_do_not_count() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), ".gitignore", "target/\n", "init");
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/out.bin"), "x").unwrap();
        fs::create_dir_all(dir.path().join(".primer/runs")).unwrap();
        fs::write(dir.path().join(".primer/state.json"), "{}").unwrap();

        assert!(tracker.working_tree_status().unwrap().is_clean());
    }

    #[test]
    fn test_unborn_head() {
        let (tracker, _dir) = setup_repo();
        assert!(tracker.head_sha().is_none());
    }

    #[test]
    fn test_not_a_repository() {
        let dir = TempDir::new().unwrap();
        assert!(!GitTracker::is_repository(dir.path()));
        assert!(GitTracker::new(dir.path()).is_err());
    }
}
