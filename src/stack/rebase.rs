//! Atomic rebase of a contiguous slice of the stack.
//!
//! The engine snapshots every branch, rebases each one onto its
//! predecessor in order, and on any failure rolls every branch back to its
//! captured commit. The base branch is exempt from rollback: sync may have
//! fast-forwarded it on purpose.

use super::manager::StackManager;
use super::stack::Stack;
use crate::cli::output::Output;
use crate::errors::{Error, Result};
use crate::git::GitRepository;
use tracing::{debug, warn};

/// Git operations the rebase engine needs. Implemented by
/// [`GitRepository`] and by simulated hosts in tests.
pub trait RebaseGit {
    fn sha(&self, rf: &str) -> Result<String>;
    fn current_branch(&self) -> Result<String>;
    fn checkout_silent(&self, name: &str) -> Result<()>;
    fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<()>;
    fn rebase_abort(&self);
    fn reset_branch_to(&self, name: &str, sha: &str) -> Result<()>;
    fn rebase_in_progress(&self) -> bool;
}

impl RebaseGit for GitRepository {
    fn sha(&self, rf: &str) -> Result<String> {
        GitRepository::sha(self, rf)
    }

    fn current_branch(&self) -> Result<String> {
        GitRepository::current_branch(self)
    }

    fn checkout_silent(&self, name: &str) -> Result<()> {
        GitRepository::checkout_silent(self, name)
    }

    fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<()> {
        GitRepository::rebase_branch_onto(self, branch, onto)
    }

    fn rebase_abort(&self) {
        GitRepository::rebase_abort(self)
    }

    fn reset_branch_to(&self, name: &str, sha: &str) -> Result<()> {
        GitRepository::reset_branch_to(self, name, sha)
    }

    fn rebase_in_progress(&self) -> bool {
        GitRepository::rebase_in_progress(self)
    }
}

/// Slice of the stack to rebase; defaults to the whole chain, atomically.
#[derive(Debug, Clone)]
pub struct RebaseOptions {
    pub from: Option<String>,
    pub to: Option<String>,
    pub atomic: bool,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            atomic: true,
        }
    }
}

/// Drives the snapshot/rebase/rollback state machine.
pub struct RebaseEngine<'a, G: RebaseGit> {
    manager: &'a StackManager,
    git: &'a G,
}

impl<'a, G: RebaseGit> RebaseEngine<'a, G> {
    pub fn new(manager: &'a StackManager, git: &'a G) -> Self {
        Self { manager, git }
    }

    /// Rebase branches `[from..=to]` of the stack, each onto its
    /// predecessor. With `atomic`, any failure restores every branch to its
    /// snapshotted commit before returning the error.
    pub fn rebase(&self, stack: &mut Stack, opts: &RebaseOptions) -> Result<()> {
        if stack.is_empty() {
            return Ok(());
        }

        if self.git.rebase_in_progress() {
            return Err(Error::state(
                "a git rebase is already in progress; resolve or abort it first",
            ));
        }
        if stack.snapshot.is_some() {
            return Err(Error::snapshot(
                "an earlier rebase left a snapshot behind; run 'stk doctor --clear-snapshot' once the branches are settled",
            ));
        }

        let start = match &opts.from {
            Some(name) => stack
                .find_branch(name)
                .ok_or_else(|| Error::not_found(format!("branch '{name}' not found in stack")))?,
            None => 0,
        };
        let end = match &opts.to {
            Some(name) => stack
                .find_branch(name)
                .ok_or_else(|| Error::not_found(format!("branch '{name}' not found in stack")))?,
            None => stack.len() - 1,
        };
        if start > end {
            return Err(Error::usage(
                "--from branch must come before --to branch in stack",
            ));
        }

        let origin_ref = self.git.current_branch().unwrap_or_default();

        if opts.atomic {
            debug!("taking snapshot of {} refs", stack.len() + 1);
            self.manager
                .take_snapshot(stack, |name| self.git.sha(name))?;
        }

        for i in start..=end {
            let branch = stack.branches[i].name.clone();
            let onto = if i == 0 {
                stack.base.clone()
            } else {
                stack.branches[i - 1].name.clone()
            };

            Output::progress(format!("Rebasing {branch} onto {onto}"));
            if let Err(err) = self.git.rebase_branch_onto(&branch, &onto) {
                Output::error("Rebase failed");
                if opts.atomic {
                    self.rollback(stack, &origin_ref);
                } else {
                    Output::note("Resolve conflicts, then run 'git rebase --continue'");
                    Output::note(format!("Afterwards continue with 'stk rebase --from {branch}'"));
                }
                return Err(err);
            }
        }

        if opts.atomic {
            self.manager.clear_snapshot(stack)?;
        }
        if !origin_ref.is_empty() {
            let _ = self.git.checkout_silent(&origin_ref);
        }
        Ok(())
    }

    /// Restore every snapshotted branch except the base, return to the
    /// original checkout, and drop the snapshot. Individual reset failures
    /// are reported but do not stop the rest of the rollback.
    fn rollback(&self, stack: &mut Stack, origin_ref: &str) {
        let Some(snapshot) = stack.snapshot.clone() else {
            warn!("no snapshot available for rollback");
            return;
        };

        Output::progress("Rolling back all branches...");
        self.git.rebase_abort();

        for (branch, sha) in &snapshot.refs {
            if *branch == stack.base {
                continue;
            }
            Output::sub_item(format!("Resetting {branch} to {}", &sha[..sha.len().min(8)]));
            if let Err(err) = self.git.reset_branch_to(branch, sha) {
                Output::warning(format!("Failed to reset {branch}: {err}"));
            }
        }

        if !origin_ref.is_empty() {
            let _ = self.git.checkout_silent(origin_ref);
        }
        if let Err(err) = self.manager.clear_snapshot(stack) {
            warn!("failed to clear snapshot: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Simulated git whose rebases succeed a configured number of times
    /// and then fail.
    struct SimGit {
        refs: RefCell<BTreeMap<String, String>>,
        current: RefCell<String>,
        succeed_count: Cell<usize>,
        rebases: RefCell<Vec<(String, String)>>,
    }

    impl SimGit {
        fn new(refs: &[(&str, &str)], current: &str, succeed_count: usize) -> Self {
            Self {
                refs: RefCell::new(
                    refs.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                current: RefCell::new(current.to_string()),
                succeed_count: Cell::new(succeed_count),
                rebases: RefCell::new(Vec::new()),
            }
        }

        fn sha_of(&self, name: &str) -> String {
            self.refs.borrow()[name].clone()
        }
    }

    impl RebaseGit for SimGit {
        fn sha(&self, rf: &str) -> Result<String> {
            self.refs
                .borrow()
                .get(rf)
                .cloned()
                .ok_or_else(|| Error::git("rev-parse", format!("unknown ref {rf}")))
        }

        fn current_branch(&self) -> Result<String> {
            Ok(self.current.borrow().clone())
        }

        fn checkout_silent(&self, name: &str) -> Result<()> {
            *self.current.borrow_mut() = name.to_string();
            Ok(())
        }

        fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<()> {
            *self.current.borrow_mut() = branch.to_string();
            if self.succeed_count.get() == 0 {
                return Err(Error::git(
                    format!("rebase {onto}"),
                    "could not apply; conflict",
                ));
            }
            self.succeed_count.set(self.succeed_count.get() - 1);
            self.rebases
                .borrow_mut()
                .push((branch.to_string(), onto.to_string()));
            let new_sha = format!("{branch}-on-{onto}");
            self.refs.borrow_mut().insert(branch.to_string(), new_sha);
            Ok(())
        }

        fn rebase_abort(&self) {}

        fn reset_branch_to(&self, name: &str, sha: &str) -> Result<()> {
            *self.current.borrow_mut() = name.to_string();
            self.refs
                .borrow_mut()
                .insert(name.to_string(), sha.to_string());
            Ok(())
        }

        fn rebase_in_progress(&self) -> bool {
            false
        }
    }

    fn fixture(succeed_count: usize) -> (TempDir, StackManager, Stack, SimGit) {
        let tmp = TempDir::new().unwrap();
        let manager = StackManager::new(tmp.path());
        let mut stack = manager.create("demo", "main").unwrap();
        for name in ["x", "y", "z"] {
            manager.append_branch(&mut stack, name).unwrap();
        }
        let git = SimGit::new(
            &[("main", "m0"), ("x", "x0"), ("y", "y0"), ("z", "z0")],
            "x",
            succeed_count,
        );
        (tmp, manager, stack, git)
    }

    #[test]
    fn test_full_success_clears_snapshot() {
        let (_tmp, manager, mut stack, git) = fixture(3);
        let engine = RebaseEngine::new(&manager, &git);

        engine.rebase(&mut stack, &RebaseOptions::default()).unwrap();

        assert_eq!(
            *git.rebases.borrow(),
            vec![
                ("x".to_string(), "main".to_string()),
                ("y".to_string(), "x".to_string()),
                ("z".to_string(), "y".to_string()),
            ]
        );
        assert!(stack.snapshot.is_none());
        assert!(manager.load("demo").unwrap().snapshot.is_none());
        // back on the branch we started from
        assert_eq!(*git.current.borrow(), "x");
    }

    #[test]
    fn test_failure_rolls_back_every_branch() {
        // y fails: x was already rebased and must be restored
        let (_tmp, manager, mut stack, git) = fixture(1);
        let engine = RebaseEngine::new(&manager, &git);

        let err = engine
            .rebase(&mut stack, &RebaseOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Git { .. }));

        assert_eq!(git.sha_of("x"), "x0");
        assert_eq!(git.sha_of("y"), "y0");
        assert_eq!(git.sha_of("z"), "z0");
        // base untouched by rollback
        assert_eq!(git.sha_of("main"), "m0");
        assert!(stack.snapshot.is_none());
        assert!(manager.load("demo").unwrap().snapshot.is_none());
        assert_eq!(*git.current.borrow(), "x");
    }

    #[test]
    fn test_immediate_failure_rolls_back() {
        let (_tmp, manager, mut stack, git) = fixture(0);
        let engine = RebaseEngine::new(&manager, &git);

        assert!(engine.rebase(&mut stack, &RebaseOptions::default()).is_err());
        for (name, sha) in [("x", "x0"), ("y", "y0"), ("z", "z0")] {
            assert_eq!(git.sha_of(name), sha);
        }
        assert!(stack.snapshot.is_none());
    }

    #[test]
    fn test_range_selection() {
        let (_tmp, manager, mut stack, git) = fixture(3);
        let engine = RebaseEngine::new(&manager, &git);

        let opts = RebaseOptions {
            from: Some("y".to_string()),
            to: Some("z".to_string()),
            atomic: true,
        };
        engine.rebase(&mut stack, &opts).unwrap();

        assert_eq!(
            *git.rebases.borrow(),
            vec![
                ("y".to_string(), "x".to_string()),
                ("z".to_string(), "y".to_string()),
            ]
        );
        assert_eq!(git.sha_of("x"), "x0");
    }

    #[test]
    fn test_inverted_range_is_usage_error() {
        let (_tmp, manager, mut stack, git) = fixture(3);
        let engine = RebaseEngine::new(&manager, &git);

        let opts = RebaseOptions {
            from: Some("z".to_string()),
            to: Some("x".to_string()),
            atomic: true,
        };
        let err = engine.rebase(&mut stack, &opts).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_leftover_snapshot_is_rejected() {
        let (_tmp, manager, mut stack, git) = fixture(3);
        manager
            .take_snapshot(&mut stack, |name| git.sha(name))
            .unwrap();

        let engine = RebaseEngine::new(&manager, &git);
        let err = engine
            .rebase(&mut stack, &RebaseOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
        assert!(git.rebases.borrow().is_empty());
    }

    #[test]
    fn test_in_progress_rebase_is_rejected() {
        struct Busy(SimGit);
        impl RebaseGit for Busy {
            fn sha(&self, rf: &str) -> Result<String> {
                self.0.sha(rf)
            }
            fn current_branch(&self) -> Result<String> {
                self.0.current_branch()
            }
            fn checkout_silent(&self, name: &str) -> Result<()> {
                self.0.checkout_silent(name)
            }
            fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<()> {
                self.0.rebase_branch_onto(branch, onto)
            }
            fn rebase_abort(&self) {}
            fn reset_branch_to(&self, name: &str, sha: &str) -> Result<()> {
                self.0.reset_branch_to(name, sha)
            }
            fn rebase_in_progress(&self) -> bool {
                true
            }
        }

        let (_tmp, manager, mut stack, git) = fixture(3);
        let busy = Busy(git);
        let engine = RebaseEngine::new(&manager, &busy);
        let err = engine
            .rebase(&mut stack, &RebaseOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn test_non_atomic_skips_snapshot_and_rollback() {
        let (_tmp, manager, mut stack, git) = fixture(1);
        let engine = RebaseEngine::new(&manager, &git);

        let opts = RebaseOptions {
            atomic: false,
            ..Default::default()
        };
        assert!(engine.rebase(&mut stack, &opts).is_err());

        // x keeps its rebased position; nothing was restored
        assert_eq!(git.sha_of("x"), "x-on-main");
        assert!(stack.snapshot.is_none());
    }
}
