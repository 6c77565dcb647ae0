//! Low-level git process execution.
//!
//! Captures stdout/stderr for plumbing calls and hands the terminal to git
//! for porcelain calls the user should see (checkout, rebase, push).

use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Spawns `git` subprocesses, optionally pinned to a working directory.
#[derive(Debug, Clone, Default)]
pub struct GitRunner {
    work_dir: Option<PathBuf>,
}

impl GitRunner {
    /// Runner operating in the process working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner pinned to a specific working directory.
    pub fn with_work_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: Some(dir.into()),
        }
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run a git command with the user's terminal attached.
    pub fn run(&self, args: &[&str]) -> Result<()> {
        let status = self
            .command(args)
            .status()
            .map_err(|e| spawn_error(args, &e))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::git(args.join(" "), format!("exited with {status}")))
        }
    }

    /// Run a git command, discarding all output.
    pub fn run_silent(&self, args: &[&str]) -> Result<()> {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(args, &e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::git(
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Run a git command and return its trimmed stdout.
    pub fn output(&self, args: &[&str]) -> Result<String> {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(args, &e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::git(
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Exit-code probe for commands where failure is an answer, not an error.
    pub fn check(&self, args: &[&str]) -> bool {
        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

fn spawn_error(args: &[&str], err: &std::io::Error) -> Error {
    Error::git(args.join(" "), format!("failed to spawn git: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo(dir: &TempDir) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
            vec!["commit", "--allow-empty", "-m", "initial"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(dir.path())
                .output()
                .unwrap();
            assert!(status.status.success(), "git {args:?} failed");
        }
    }

    #[test]
    fn test_output_trims_stdout() {
        let tmp = TempDir::new().unwrap();
        init_repo(&tmp);

        let runner = GitRunner::with_work_dir(tmp.path());
        let branch = runner.output(&["branch", "--show-current"]).unwrap();
        assert_eq!(branch, "main");
    }

    #[test]
    fn test_failure_carries_stderr() {
        let tmp = TempDir::new().unwrap();
        init_repo(&tmp);

        let runner = GitRunner::with_work_dir(tmp.path());
        let err = runner
            .output(&["rev-parse", "--verify", "no-such-ref"])
            .unwrap_err();
        match err {
            Error::Git { command, stderr } => {
                assert!(command.starts_with("rev-parse"));
                assert!(!stderr.is_empty());
            }
            other => panic!("expected Git error, got {other:?}"),
        }
    }

    #[test]
    fn test_check_reports_exit_code() {
        let tmp = TempDir::new().unwrap();
        init_repo(&tmp);

        let runner = GitRunner::with_work_dir(tmp.path());
        assert!(runner.check(&["show-ref", "--verify", "--quiet", "refs/heads/main"]));
        assert!(!runner.check(&["show-ref", "--verify", "--quiet", "refs/heads/nope"]));
    }
}
