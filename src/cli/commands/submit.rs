//! The submit reconciler.
//!
//! The only command that pushes or creates PRs. Pushes every branch in
//! stack order, adopts PRs the forge already has, creates the missing ones
//! bottom-up, and rewrites the stack section of every open PR.

use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::{Error, Result};
use crate::forge::{render_stack_section, CreatePullRequest, Forge, SectionEntry, UpdatePullRequest};
use crate::stack::Stack;

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub title: Option<String>,
    pub draft: bool,
    pub reviewers: Vec<String>,
    pub no_create: bool,
    pub no_update: bool,
    pub force: bool,
}

pub fn run(opts: SubmitOptions) -> Result<()> {
    let ctx = Context::discover()?;
    match ctx.forge() {
        Ok(forge) => submit_stack(&ctx, Some(forge.as_ref()), &opts),
        Err(err) => {
            Output::warning(format!("PR provider unavailable: {err}"));
            submit_stack(&ctx, None, &opts)
        }
    }
}

pub fn submit_stack(ctx: &Context, forge: Option<&dyn Forge>, opts: &SubmitOptions) -> Result<()> {
    let mut stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    if stack.is_empty() {
        Output::info("Stack has no branches to submit");
        return Ok(());
    }

    if !opts.force {
        check_base_synced(ctx, &stack)?;
    }

    // push failures are fatal: every later step assumes remote presence
    let remote = ctx.remote();
    Output::progress(format!("Pushing branches to {remote}..."));
    for branch in &stack.branches {
        Output::sub_item(format!("Pushing {}", branch.name));
        ctx.git.push(remote, &branch.name, true)?;
    }

    let Some(forge) = forge else {
        Output::info("Branches pushed; PR operations skipped");
        return Ok(());
    };

    if !opts.no_create {
        create_missing_prs(ctx, forge, &mut stack, opts)?;
    }

    if !opts.no_update {
        update_descriptions(ctx, forge, &mut stack)?;
    }

    Output::success("Submit complete");
    Ok(())
}

/// Refuse to submit when the local base is strictly behind its remote.
fn check_base_synced(ctx: &Context, stack: &Stack) -> Result<()> {
    let remote = ctx.remote();
    if !ctx.git.remote_branch_exists(remote, &stack.base) {
        return Ok(());
    }
    let local = match ctx.git.sha(&stack.base) {
        Ok(sha) => sha,
        Err(_) => return Ok(()),
    };
    let remote_sha = match ctx.git.sha(&format!("{remote}/{}", stack.base)) {
        Ok(sha) => sha,
        Err(_) => return Ok(()),
    };
    if local == remote_sha {
        return Ok(());
    }

    if ctx.git.is_ancestor(&local, &remote_sha) {
        let behind = ctx.git.commit_count(&local, &remote_sha).unwrap_or(0);
        return Err(Error::usage(format!(
            "base branch {} is {behind} commit(s) behind {remote}/{}; run 'stk sync' first (or pass --force)",
            stack.base, stack.base
        )));
    }
    Ok(())
}

fn section_entries(stack: &Stack) -> Vec<SectionEntry> {
    stack
        .branches
        .iter()
        .map(|b| SectionEntry {
            name: b.name.clone(),
            pr: b.pr.clone(),
        })
        .collect()
}

/// Create PRs for branches that lack one, adopting any open PR the forge
/// already has for the branch.
fn create_missing_prs(
    ctx: &Context,
    forge: &dyn Forge,
    stack: &mut Stack,
    opts: &SubmitOptions,
) -> Result<()> {
    Output::progress("Creating PRs...");
    let mut created_any = false;

    for i in 0..stack.branches.len() {
        let branch = stack.branches[i].clone();
        if branch.pr.is_some() {
            continue;
        }

        match forge.get_by_branch(&branch.name) {
            Ok(Some(existing)) => {
                Output::sub_item(format!(
                    "Found existing PR #{} for {}",
                    existing.number, branch.name
                ));
                ctx.manager
                    .update_pr(stack, &branch.name, Some(existing.to_record()))?;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                Output::warning(format!("Failed to look up PR for {}: {err}", branch.name))
            }
        }

        let base = if i == 0 {
            stack.base.clone()
        } else {
            stack.branches[i - 1].name.clone()
        };
        let title = opts.title.clone().unwrap_or_else(|| branch.name.clone());
        let body = render_stack_section(&stack.name, &section_entries(stack), &branch.name);

        Output::sub_item(format!("Creating PR for {} -> {base}", branch.name));
        let request = CreatePullRequest {
            title,
            body,
            head: branch.name.clone(),
            base,
            draft: opts.draft,
            reviewers: opts.reviewers.clone(),
            labels: Vec::new(),
        };
        match forge.create(&request) {
            Ok(pr) => {
                Output::success(format!("Created PR #{}: {}", pr.number, pr.url));
                ctx.manager
                    .update_pr(stack, &branch.name, Some(pr.to_record()))?;
                created_any = true;
            }
            Err(err) => {
                Output::warning(format!("Failed to create PR for {}: {err}", branch.name))
            }
        }
    }

    if !created_any {
        Output::sub_item("No new PRs to create");
    }
    Ok(())
}

/// Refresh recorded states, then rewrite the stack section of every PR
/// that is still open or draft. Individual failures warn and continue.
fn update_descriptions(ctx: &Context, forge: &dyn Forge, stack: &mut Stack) -> Result<()> {
    for branch in stack.branches.clone() {
        if let Some(pr) = branch.pr {
            if let Ok(remote_pr) = forge.get(pr.number) {
                ctx.manager
                    .update_pr(stack, &branch.name, Some(remote_pr.to_record()))?;
            }
        }
    }

    if !stack.branches.iter().any(|b| b.pr.is_some()) {
        return Ok(());
    }

    Output::progress("Updating PR descriptions...");
    let entries = section_entries(stack);
    for branch in &stack.branches {
        let Some(pr) = &branch.pr else { continue };
        if pr.state.is_terminal() {
            continue;
        }

        Output::sub_item(format!("Updating PR #{} ({})", pr.number, branch.name));
        let body = render_stack_section(&stack.name, &entries, &branch.name);
        let update = UpdatePullRequest {
            body: Some(body),
            ..Default::default()
        };
        if let Err(err) = forge.update(pr.number, &update) {
            Output::warning(format!("Failed to update PR #{}: {err}", pr.number));
        }
    }
    Ok(())
}
