//! High-level mutations on stacks.
//!
//! Every operation validates in memory first and persists through the store
//! on success, advancing the stack's `updated` timestamp. Snapshot
//! operations intentionally leave `updated` alone so a take/clear pair is a
//! true round trip.

use super::stack::{PrRecord, Snapshot, Stack, StackBranch, ValidationIssue};
use super::store::Store;
use crate::errors::{Error, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Stack operations bound to one repository's store.
#[derive(Debug, Clone)]
pub struct StackManager {
    store: Store,
}

impl StackManager {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: Store::new(git_dir),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create and save a new stack. Becomes current when no stack is.
    pub fn create(&self, name: &str, base: &str) -> Result<Stack> {
        if self.store.exists(name) {
            return Err(Error::conflict(format!("stack '{name}' already exists")));
        }

        let stack = Stack::new(name, base);
        self.store.save(&stack)?;

        if self.store.current_name()?.is_none() {
            self.store.set_current(name)?;
        }
        Ok(stack)
    }

    pub fn load(&self, name: &str) -> Result<Stack> {
        self.store.load(name)
    }

    pub fn load_current(&self) -> Result<Stack> {
        self.store.load_current()
    }

    /// Insert a branch after `after`. `None` or the base branch means the
    /// first position.
    pub fn add_branch(&self, stack: &mut Stack, name: &str, after: Option<&str>) -> Result<()> {
        if stack.has_branch(name) {
            return Err(Error::conflict(format!("branch '{name}' already in stack")));
        }

        let index = self.insert_index(stack, after)?;
        stack.branches.insert(index, StackBranch::new(name));
        stack.touch();
        self.store.save(stack)
    }

    /// Add a branch at the end of the stack.
    pub fn append_branch(&self, stack: &mut Stack, name: &str) -> Result<()> {
        if stack.has_branch(name) {
            return Err(Error::conflict(format!("branch '{name}' already in stack")));
        }

        stack.branches.push(StackBranch::new(name));
        stack.touch();
        self.store.save(stack)
    }

    pub fn remove_branch(&self, stack: &mut Stack, name: &str) -> Result<()> {
        let idx = stack
            .find_branch(name)
            .ok_or_else(|| Error::not_found(format!("branch '{name}' not found in stack")))?;

        stack.branches.remove(idx);
        stack.touch();
        self.store.save(stack)
    }

    /// Move a branch after `after`. Moving a branch after itself succeeds
    /// without changing anything.
    pub fn move_branch(&self, stack: &mut Stack, name: &str, after: Option<&str>) -> Result<()> {
        if after == Some(name) {
            return Ok(());
        }

        let idx = stack
            .find_branch(name)
            .ok_or_else(|| Error::not_found(format!("branch '{name}' not found in stack")))?;
        let branch = stack.branches.remove(idx);

        let index = match self.insert_index(stack, after) {
            Ok(index) => index,
            Err(err) => {
                stack.branches.insert(idx, branch);
                return Err(err);
            }
        };

        stack.branches.insert(index, branch);
        stack.touch();
        self.store.save(stack)
    }

    fn insert_index(&self, stack: &Stack, after: Option<&str>) -> Result<usize> {
        match after {
            None => Ok(0),
            Some(a) if a == stack.base => Ok(0),
            Some(a) => stack
                .find_branch(a)
                .map(|idx| idx + 1)
                .ok_or_else(|| Error::not_found(format!("branch '{a}' not found in stack"))),
        }
    }

    /// Set or clear the PR record for a branch.
    pub fn update_pr(&self, stack: &mut Stack, branch: &str, pr: Option<PrRecord>) -> Result<()> {
        let idx = stack
            .find_branch(branch)
            .ok_or_else(|| Error::not_found(format!("branch '{branch}' not found in stack")))?;

        stack.branches[idx].pr = pr;
        stack.touch();
        self.store.save(stack)
    }

    /// Capture the SHA of the base and every branch for rollback. All SHAs
    /// are resolved before the stack is modified, so a failed lookup leaves
    /// nothing behind.
    pub fn take_snapshot<F>(&self, stack: &mut Stack, sha_fn: F) -> Result<()>
    where
        F: Fn(&str) -> Result<String>,
    {
        let names: Vec<String> = stack.all_branches().iter().map(|s| s.to_string()).collect();

        let mut refs = BTreeMap::new();
        for name in names {
            let sha = sha_fn(&name)
                .map_err(|err| Error::snapshot(format!("failed to resolve {name}: {err}")))?;
            refs.insert(name, sha);
        }

        stack.snapshot = Some(Snapshot {
            taken_at: Utc::now(),
            refs,
        });
        self.store.save(stack)
    }

    pub fn clear_snapshot(&self, stack: &mut Stack) -> Result<()> {
        stack.snapshot = None;
        self.store.save(stack)
    }

    /// Report problems without modifying the stack: missing base, missing
    /// branches, duplicate names.
    pub fn validate<F>(&self, stack: &Stack, branch_exists: F) -> Vec<ValidationIssue>
    where
        F: Fn(&str) -> bool,
    {
        let mut issues = Vec::new();

        if !branch_exists(&stack.base) {
            issues.push(ValidationIssue {
                branch: stack.base.clone(),
                message: "base branch does not exist".to_string(),
            });
        }

        for branch in &stack.branches {
            if !branch_exists(&branch.name) {
                issues.push(ValidationIssue {
                    branch: branch.name.clone(),
                    message: "branch does not exist".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for branch in &stack.branches {
            if !seen.insert(branch.name.as_str()) {
                issues.push(ValidationIssue {
                    branch: branch.name.clone(),
                    message: "duplicate branch in stack".to_string(),
                });
            }
        }

        issues
    }
}
