//! Typed facade over the git CLI.
//!
//! Plumbing commands are preferred over porcelain; the only porcelain output
//! parsed is `status --porcelain` (emptiness check) and `branch
//! --show-current`. Every operation surfaces git's exit status to the caller.

use super::runner::GitRunner;
use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle on the repository containing the working directory.
#[derive(Debug, Clone)]
pub struct GitRepository {
    runner: GitRunner,
}

impl GitRepository {
    /// Open the repository containing the current directory. Fails when
    /// invoked outside a working tree.
    pub fn discover() -> Result<Self> {
        let repo = Self {
            runner: GitRunner::new(),
        };
        if !repo.is_inside_work_tree() {
            return Err(Error::state(
                "not a git repository (or any parent up to mount point /)",
            ));
        }
        Ok(repo)
    }

    /// Open a repository at a known path without discovery checks.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            runner: GitRunner::with_work_dir(path.into()),
        }
    }

    /// Path to the repository's `.git` directory.
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.runner.output(&["rev-parse", "--git-dir"])?;
        let path = PathBuf::from(out);
        if path.is_absolute() {
            return Ok(path);
        }
        // rev-parse answers relative to the working directory
        let base = match self.runner.work_dir() {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        Ok(base.join(path))
    }

    pub fn is_inside_work_tree(&self) -> bool {
        self.runner
            .output(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out == "true")
            .unwrap_or(false)
    }

    pub fn is_clean(&self) -> Result<bool> {
        let out = self.runner.output(&["status", "--porcelain"])?;
        Ok(out.is_empty())
    }

    /// Fail with a dedicated state error when the working tree is dirty.
    pub fn ensure_clean(&self) -> Result<()> {
        if self.is_clean()? {
            Ok(())
        } else {
            Err(Error::state(
                "working tree is not clean; commit or stash changes first",
            ))
        }
    }

    /// Name of the checked-out branch; empty when HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        self.runner.output(&["branch", "--show-current"])
    }

    /// Determine the default branch from the remote HEAD, falling back to
    /// probing `main` then `master`.
    pub fn default_branch(&self) -> Result<String> {
        if let Ok(out) = self.runner.output(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            return Ok(out.trim_start_matches("refs/remotes/origin/").to_string());
        }
        for name in ["main", "master"] {
            if self.branch_exists(name) {
                return Ok(name.to_string());
            }
        }
        Err(Error::state("could not determine default branch"))
    }

    /// Upstream of the current branch, e.g. `origin/main`.
    pub fn upstream_branch(&self) -> Result<String> {
        self.runner
            .output(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.runner.check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{name}"),
        ])
    }

    pub fn remote_branch_exists(&self, remote: &str, name: &str) -> bool {
        self.runner.check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/{remote}/{name}"),
        ])
    }

    pub fn sha(&self, rf: &str) -> Result<String> {
        self.runner.output(&["rev-parse", rf])
    }

    pub fn short_sha(&self, rf: &str) -> Result<String> {
        self.runner.output(&["rev-parse", "--short", rf])
    }

    /// Number of commits reachable from `head` but not from `base`.
    pub fn commit_count(&self, base: &str, head: &str) -> Result<usize> {
        let out = self
            .runner
            .output(&["rev-list", "--count", &format!("{base}..{head}")])?;
        out.parse()
            .map_err(|_| Error::git("rev-list --count", format!("unexpected output: {out}")))
    }

    pub fn is_ancestor(&self, a: &str, b: &str) -> bool {
        self.runner.check(&["merge-base", "--is-ancestor", a, b])
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        self.runner.run(&["checkout", name])
    }

    pub fn checkout_silent(&self, name: &str) -> Result<()> {
        self.runner.run_silent(&["checkout", name])
    }

    pub fn create_and_checkout(&self, name: &str) -> Result<()> {
        self.runner.run(&["checkout", "-b", name])
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.runner.run(&["branch", flag, name])
    }

    /// Checkout a branch and hard-reset it to a commit, both silently.
    pub fn reset_branch_to(&self, name: &str, sha: &str) -> Result<()> {
        self.checkout_silent(name)?;
        self.runner.run_silent(&["reset", "--hard", sha])
    }

    pub fn rebase(&self, onto: &str) -> Result<()> {
        self.runner.run(&["rebase", onto])
    }

    /// Interactive rebase; the terminal is handed straight to git.
    pub fn rebase_interactive(&self, onto: &str) -> Result<()> {
        self.runner.run(&["rebase", "-i", onto])
    }

    /// Best-effort abort of an in-flight rebase.
    pub fn rebase_abort(&self) {
        let _ = self.runner.run_silent(&["rebase", "--abort"]);
    }

    /// A rebase is in flight when git keeps `rebase-merge` or `rebase-apply`
    /// state in its directory.
    pub fn rebase_in_progress(&self) -> bool {
        match self.git_dir() {
            Ok(dir) => dir.join("rebase-merge").exists() || dir.join("rebase-apply").exists(),
            Err(_) => false,
        }
    }

    /// Checkout a branch and rebase it onto a target.
    pub fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<()> {
        debug!("rebasing {branch} onto {onto}");
        self.checkout(branch)?;
        self.rebase(onto)
    }

    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.runner.run(&["fetch", remote])
    }

    pub fn pull_rebase(&self, remote: &str, branch: &str) -> Result<()> {
        self.runner.run(&["pull", "--rebase", remote, branch])
    }

    /// Push a branch, setting the upstream. `force` appends
    /// `--force-with-lease`.
    pub fn push(&self, remote: &str, branch: &str, force: bool) -> Result<()> {
        let mut args = vec!["push", "-u", remote, branch];
        if force {
            args.push("--force-with-lease");
        }
        self.runner.run(&args)
    }

    pub fn remote_url(&self, name: &str) -> Result<String> {
        self.runner.output(&["remote", "get-url", name])
    }
}
