//! The sync reconciler.
//!
//! Brings the local stack into consistency with remote PR state and rebases
//! it. Sync never pushes; `submit` is the only command that touches the
//! remote's branches.

use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::Result;
use crate::forge::Forge;
use crate::stack::{PrState, RebaseEngine, RebaseOptions, Stack};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub no_fetch: bool,
    pub no_update_base: bool,
    pub no_prs: bool,
    pub no_rebase: bool,
    pub delete_branches: bool,
}

pub fn run(opts: SyncOptions) -> Result<()> {
    let ctx = Context::discover()?;
    ctx.require_clean_tree()?;
    let stack = ctx.require_stack()?;

    // the forge is only needed when recorded PRs must be refreshed
    let needs_forge = !opts.no_prs && stack.branches.iter().any(|b| b.pr.is_some());
    let forge = if needs_forge {
        match ctx.forge() {
            Ok(forge) => Some(forge),
            Err(err) => {
                Output::warning(format!("PR provider unavailable: {err}"));
                None
            }
        }
    } else {
        None
    };

    sync_stack(&ctx, forge.as_deref(), &opts)
}

/// Full sync pass: fetch, update base, refresh PRs, drop merged branches,
/// clear closed PRs, rebase. Every step is individually skipable.
pub fn sync_stack(ctx: &Context, forge: Option<&dyn Forge>, opts: &SyncOptions) -> Result<()> {
    let mut stack = ctx.require_stack()?;
    let remote = ctx.remote();

    // 1. fetch; failure warns and continues
    if !opts.no_fetch {
        Output::progress(format!("Fetching from {remote}..."));
        if let Err(err) = ctx.git.fetch(remote) {
            Output::warning(format!("Failed to fetch: {err}"));
        }
    }

    // 2. pull the base branch, returning to the previous checkout
    if !opts.no_update_base && ctx.git.remote_branch_exists(remote, &stack.base) {
        Output::progress(format!("Updating base branch {}...", stack.base));
        let previous = ctx.git.current_branch().unwrap_or_default();
        ctx.git.checkout(&stack.base)?;
        if let Err(err) = ctx.git.pull_rebase(remote, &stack.base) {
            Output::warning(format!("Failed to update base branch: {err}"));
        }
        if !previous.is_empty() && previous != stack.base {
            let _ = ctx.git.checkout_silent(&previous);
        }
    }

    // 3-5. reconcile with remote PR state
    if !opts.no_prs {
        if let Some(forge) = forge {
            stack = reconcile_prs(ctx, forge, stack, opts)?;
        }
    }

    // 6. rebase what remains
    if !opts.no_rebase && !stack.is_empty() {
        let engine = RebaseEngine::new(&ctx.manager, &ctx.git);
        engine.rebase(&mut stack, &RebaseOptions::default())?;
    }

    Output::success("Sync complete");
    Ok(())
}

/// Refresh every recorded PR, then process merged and closed branches.
fn reconcile_prs(
    ctx: &Context,
    forge: &dyn Forge,
    mut stack: Stack,
    opts: &SyncOptions,
) -> Result<Stack> {
    let mut merged = Vec::new();
    let mut closed = Vec::new();

    for branch in stack.branches.clone() {
        let Some(pr) = branch.pr else { continue };
        match forge.get(pr.number) {
            Ok(remote_pr) => {
                ctx.manager
                    .update_pr(&mut stack, &branch.name, Some(remote_pr.to_record()))?;
                match remote_pr.state {
                    PrState::Merged => merged.push(branch.name.clone()),
                    PrState::Closed => closed.push(branch.name.clone()),
                    _ => {}
                }
            }
            Err(err) => Output::warning(format!(
                "Failed to refresh PR #{} ({}): {err}",
                pr.number, branch.name
            )),
        }
    }

    for name in merged {
        stack = process_merged(ctx, forge, stack, &name, opts)?;
    }

    // a closed PR only loses its record; the branch stays and a future
    // submit creates a fresh PR
    for name in closed {
        if stack.has_branch(&name) {
            Output::info(format!("PR for {name} was closed; clearing its record"));
            ctx.manager.update_pr(&mut stack, &name, None)?;
        }
    }

    Ok(stack)
}

/// Drop one merged branch: retarget its immediate child to the branch's
/// predecessor, remove it from the stack, optionally delete the local
/// branch, and reload so later indices are recomputed.
fn process_merged(
    ctx: &Context,
    forge: &dyn Forge,
    mut stack: Stack,
    name: &str,
    opts: &SyncOptions,
) -> Result<Stack> {
    let Some(idx) = stack.find_branch(name) else {
        return Ok(stack);
    };
    Output::progress(format!("{name} was merged; updating stack..."));

    // retarget before removal: the forge rejects the retarget once the
    // merged branch no longer owns its PR
    let new_base = if idx == 0 {
        stack.base.clone()
    } else {
        stack.branches[idx - 1].name.clone()
    };
    if let Some(child) = stack.branches.get(idx + 1) {
        if let Some(child_pr) = &child.pr {
            Output::sub_item(format!("Retargeting PR #{} to {new_base}", child_pr.number));
            if let Err(err) = forge.retarget(child_pr.number, &new_base) {
                Output::warning(format!(
                    "Failed to retarget PR #{}: {err}",
                    child_pr.number
                ));
            }
        }
    }

    ctx.manager.remove_branch(&mut stack, name)?;

    if opts.delete_branches {
        if ctx.git.current_branch().unwrap_or_default() == name {
            let _ = ctx.git.checkout_silent(&stack.base);
        }
        if let Err(err) = ctx.git.delete_branch(name, true) {
            Output::warning(format!("Failed to delete local branch {name}: {err}"));
        }
    }

    ctx.manager.load(&stack.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::testing::ScriptedForge;
    use crate::git::GitRepository;
    use crate::settings::Settings;
    use crate::stack::{PrRecord, StackManager};
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn commit_file(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), name).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-m", &format!("add {name}")]);
    }

    /// Repo with base `main` and stacked branches a -> b -> c, one commit
    /// each, PR records #1..#3.
    fn stacked_fixture() -> (TempDir, Context) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        git(dir, &["init", "-b", "main"]);
        git(dir, &["config", "user.name", "Test User"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        commit_file(dir, "base.txt");

        for name in ["a", "b", "c"] {
            git(dir, &["checkout", "-b", name]);
            commit_file(dir, &format!("{name}.txt"));
        }

        let repo = GitRepository::open(dir);
        let manager = StackManager::new(repo.git_dir().unwrap());
        let mut stack = manager.create("demo", "main").unwrap();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            manager.append_branch(&mut stack, name).unwrap();
            manager
                .update_pr(
                    &mut stack,
                    name,
                    Some(PrRecord {
                        number: (i + 1) as u64,
                        url: format!("https://forge.test/pr/{}", i + 1),
                        state: PrState::Open,
                        title: None,
                    }),
                )
                .unwrap();
        }

        let ctx = Context::new(repo, manager, Settings::default());
        (tmp, ctx)
    }

    #[test]
    fn test_sync_removes_merged_middle_of_chain() {
        let (_tmp, ctx) = stacked_fixture();
        // simulate main having advanced with a's merge commit
        git(ctx.git.git_dir().unwrap().parent().unwrap(), &["checkout", "main"]);

        let forge = ScriptedForge::new();
        forge.insert(1, "a", "main", PrState::Merged);
        forge.insert(2, "b", "a", PrState::Open);
        forge.insert(3, "c", "b", PrState::Open);

        let opts = SyncOptions {
            no_fetch: true,
            no_update_base: true,
            ..Default::default()
        };
        sync_stack(&ctx, Some(&forge), &opts).unwrap();

        // a is gone, b and c remain in order
        let stack = ctx.manager.load("demo").unwrap();
        let names: Vec<&str> = stack.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        // b's PR was retargeted to main; c's still points at b
        assert_eq!(*forge.retargets.borrow(), vec![(2, "main".to_string())]);
        assert_eq!(forge.prs.borrow()[&3].base, "b");

        // rebase ran and cleaned up after itself
        assert!(stack.snapshot.is_none());
        assert!(ctx.git.is_ancestor("main", "b"));
        assert!(ctx.git.is_ancestor("b", "c"));
    }

    #[test]
    fn test_sync_clears_closed_pr_records() {
        let (_tmp, ctx) = stacked_fixture();
        git(ctx.git.git_dir().unwrap().parent().unwrap(), &["checkout", "main"]);

        let forge = ScriptedForge::new();
        forge.insert(1, "a", "main", PrState::Open);
        forge.insert(2, "b", "a", PrState::Closed);
        forge.insert(3, "c", "b", PrState::Open);

        let opts = SyncOptions {
            no_fetch: true,
            no_update_base: true,
            ..Default::default()
        };
        sync_stack(&ctx, Some(&forge), &opts).unwrap();

        let stack = ctx.manager.load("demo").unwrap();
        let names: Vec<&str> = stack.branches.iter().map(|b| b.name.as_str()).collect();
        // the branch stays in the stack
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(stack.branches[0].pr.is_some());
        assert!(stack.branches[1].pr.is_none());
        assert!(stack.branches[2].pr.is_some());
    }

    #[test]
    fn test_sync_removes_merged_first_and_deletes_branch() {
        let (_tmp, ctx) = stacked_fixture();
        git(ctx.git.git_dir().unwrap().parent().unwrap(), &["checkout", "main"]);

        let forge = ScriptedForge::new();
        forge.insert(1, "a", "main", PrState::Merged);
        forge.insert(2, "b", "a", PrState::Merged);
        forge.insert(3, "c", "b", PrState::Open);

        let opts = SyncOptions {
            no_fetch: true,
            no_update_base: true,
            delete_branches: true,
            ..Default::default()
        };
        sync_stack(&ctx, Some(&forge), &opts).unwrap();

        let stack = ctx.manager.load("demo").unwrap();
        let names: Vec<&str> = stack.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);

        // each merged branch retargeted its immediate child first
        assert_eq!(
            *forge.retargets.borrow(),
            vec![(2, "main".to_string()), (3, "main".to_string())]
        );
        assert!(!ctx.git.branch_exists("a"));
        assert!(!ctx.git.branch_exists("b"));
        assert!(ctx.git.branch_exists("c"));
    }

    #[test]
    fn test_sync_warns_and_continues_on_refresh_failure() {
        let (_tmp, ctx) = stacked_fixture();
        git(ctx.git.git_dir().unwrap().parent().unwrap(), &["checkout", "main"]);

        // only PR #2 is known; #1 and #3 fail to refresh
        let forge = ScriptedForge::new();
        forge.insert(2, "b", "a", PrState::Open);

        let opts = SyncOptions {
            no_fetch: true,
            no_update_base: true,
            ..Default::default()
        };
        sync_stack(&ctx, Some(&forge), &opts).unwrap();

        let stack = ctx.manager.load("demo").unwrap();
        assert_eq!(stack.len(), 3);
    }
}
