//! The `pr` subcommands: status, view, create, update, close, merge.

use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::{Error, Result};
use crate::forge::{
    render_stack_section, CreatePullRequest, Forge, MergeMethod, MergeOptions, SectionEntry,
    UpdatePullRequest,
};
use crate::stack::{PrState, Stack};

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

/// Refresh every recorded PR from the forge, persisting the new states.
fn refresh_records(ctx: &Context, forge: &dyn Forge, stack: &mut Stack) {
    for branch in stack.branches.clone() {
        let Some(pr) = branch.pr else { continue };
        match forge.get(pr.number) {
            Ok(remote_pr) => {
                let _ = ctx
                    .manager
                    .update_pr(stack, &branch.name, Some(remote_pr.to_record()));
            }
            Err(err) => Output::warning(format!("Failed to refresh PR #{}: {err}", pr.number)),
        }
    }
}

pub fn status(refresh: bool) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    if refresh {
        let forge = ctx.forge()?;
        refresh_records(&ctx, forge.as_ref(), &mut stack);
    }

    println!("📚 Stack: {}\n", stack.name);
    println!("{:<30} {:<8} {:<10} URL", "BRANCH", "PR", "STATE");
    println!("{}", "-".repeat(72));

    for branch in &stack.branches {
        match &branch.pr {
            Some(pr) => println!(
                "{:<30} {:<8} {:<10} {}",
                branch.name,
                format!("#{}", pr.number),
                pr.state.to_string(),
                pr.url
            ),
            None => println!("{:<30} {:<8} {:<10} -", branch.name, "-", "none"),
        }
    }
    Ok(())
}

pub fn view(branch: Option<&str>) -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;

    let name = match branch {
        Some(name) => name.to_string(),
        None => ctx.git.current_branch()?,
    };
    let idx = stack
        .find_branch(&name)
        .ok_or_else(|| Error::not_found(format!("branch '{name}' not in stack")))?;

    let pr = stack.branches[idx]
        .pr
        .as_ref()
        .filter(|pr| !pr.url.is_empty())
        .ok_or_else(|| Error::not_found(format!("no PR found for {name}; run 'stk submit' first")))?;

    Output::progress(format!("Opening {}", pr.url));
    open_browser(&pr.url)
}

fn open_browser(url: &str) -> Result<()> {
    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/c", "start", url])
    } else {
        ("xdg-open", vec![url])
    };

    std::process::Command::new(program)
        .args(args)
        .spawn()
        .map_err(|err| Error::state(format!("could not open browser: {err}")))?;
    Ok(())
}

/// Create PRs for branches that lack one. Branches must already exist on
/// the remote; this command does not push.
pub fn create(
    branch: Option<&str>,
    draft: bool,
    reviewers: Vec<String>,
    title: Option<String>,
) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;
    let forge = ctx.forge()?;
    let remote = ctx.remote();

    Output::note(format!("Using {} provider", forge.name()));
    Output::spacing();

    let targets: Vec<String> = match branch {
        Some(name) => {
            if !stack.has_branch(name) {
                return Err(Error::not_found(format!("branch '{name}' not in stack")));
            }
            vec![name.to_string()]
        }
        None => stack.branches.iter().map(|b| b.name.clone()).collect(),
    };

    for name in targets {
        let idx = stack.find_branch(&name).expect("branch vetted above");
        if let Some(pr) = &stack.branches[idx].pr {
            Output::info(format!("Skipping {name} - PR #{} already exists", pr.number));
            continue;
        }

        if let Ok(Some(existing)) = forge.get_by_branch(&name) {
            Output::info(format!("Found existing PR #{} for {name}", existing.number));
            ctx.manager
                .update_pr(&mut stack, &name, Some(existing.to_record()))?;
            continue;
        }

        if !ctx.git.remote_branch_exists(remote, &name) {
            Output::warning(format!(
                "{name} has not been pushed to {remote}; run 'stk submit' first"
            ));
            continue;
        }

        let base = if idx == 0 {
            stack.base.clone()
        } else {
            stack.branches[idx - 1].name.clone()
        };
        let body = render_stack_section(&stack.name, &section_entries(&stack), &name);

        Output::progress(format!("Creating PR for {name} -> {base}"));
        let request = CreatePullRequest {
            title: title.clone().unwrap_or_else(|| name.clone()),
            body,
            head: name.clone(),
            base,
            draft,
            reviewers: reviewers.clone(),
            labels: Vec::new(),
        };
        match forge.create(&request) {
            Ok(pr) => {
                ctx.manager
                    .update_pr(&mut stack, &name, Some(pr.to_record()))?;
                Output::success(format!("Created PR #{}: {}", pr.number, pr.url));
            }
            Err(err) => Output::error(format!("Failed to create PR for {name}: {err}")),
        }
    }

    Ok(())
}

/// Rewrite PR descriptions with the current stack section.
pub fn update(branch: Option<&str>) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;
    let forge = ctx.forge()?;

    refresh_records(&ctx, forge.as_ref(), &mut stack);
    let entries = section_entries(&stack);

    let targets: Vec<_> = match branch {
        Some(name) => {
            if !stack.has_branch(name) {
                return Err(Error::not_found(format!("branch '{name}' not in stack")));
            }
            stack
                .branches
                .iter()
                .filter(|b| b.name == name)
                .cloned()
                .collect()
        }
        None => stack.branches.clone(),
    };

    for target in targets {
        let Some(pr) = &target.pr else {
            Output::info(format!("Skipping {} - no PR found", target.name));
            continue;
        };

        let body = render_stack_section(&stack.name, &entries, &target.name);
        Output::progress(format!("Updating PR #{} ({})", pr.number, target.name));
        let request = UpdatePullRequest {
            body: Some(body),
            ..Default::default()
        };
        match forge.update(pr.number, &request) {
            Ok(()) => Output::success(format!("Updated PR #{}", pr.number)),
            Err(err) => Output::error(format!("Failed to update PR #{}: {err}", pr.number)),
        }
    }

    Ok(())
}

pub fn close(branch: &str) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    let idx = stack
        .find_branch(branch)
        .ok_or_else(|| Error::not_found(format!("branch '{branch}' not in stack")))?;
    let pr = stack.branches[idx]
        .pr
        .clone()
        .ok_or_else(|| Error::not_found(format!("no PR found for {branch}")))?;

    let forge = ctx.forge()?;
    Output::progress(format!("Closing PR #{} ({branch})...", pr.number));
    forge.close(pr.number)?;

    let mut record = pr;
    record.state = PrState::Closed;
    ctx.manager.update_pr(&mut stack, branch, Some(record))?;

    Output::success("Closed PR");
    Ok(())
}

/// Merge a PR, retarget its child, and drop the branch from the stack.
pub fn merge(branch: Option<&str>, method: MergeMethod, delete: bool, keep_in_stack: bool) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;
    let forge = ctx.forge()?;

    // pick the named branch, or the first branch with an open PR
    let (idx, name, pr) = match branch {
        Some(name) => {
            let idx = stack
                .find_branch(name)
                .ok_or_else(|| Error::not_found(format!("branch '{name}' not in stack")))?;
            let pr = stack.branches[idx]
                .pr
                .clone()
                .ok_or_else(|| Error::not_found(format!("no PR found for {name}")))?;
            (idx, name.to_string(), pr)
        }
        None => {
            let mut found = None;
            for (idx, candidate) in stack.branches.iter().enumerate() {
                let Some(record) = &candidate.pr else { continue };
                if let Ok(remote_pr) = forge.get(record.number) {
                    if remote_pr.state == PrState::Open {
                        found = Some((idx, candidate.name.clone(), record.clone()));
                        break;
                    }
                }
            }
            found.ok_or_else(|| Error::not_found("no mergeable PR found in stack"))?
        }
    };

    Output::progress(format!("Merging PR #{} ({name})...", pr.number));
    forge.merge(
        pr.number,
        &MergeOptions {
            method,
            delete_branch: delete,
            ..Default::default()
        },
    )?;
    Output::success(format!("Merged PR #{}", pr.number));

    let mut record = pr;
    record.state = PrState::Merged;
    ctx.manager.update_pr(&mut stack, &name, Some(record))?;

    if delete {
        Output::progress(format!("Deleting remote branch {name}..."));
        if let Err(err) = forge.delete_branch(&name) {
            Output::warning(format!("Failed to delete remote branch: {err}"));
        }
    }

    // the immediate child now targets the merged branch's predecessor
    let new_base = if idx == 0 {
        stack.base.clone()
    } else {
        stack.branches[idx - 1].name.clone()
    };
    if let Some(child) = stack.branches.get(idx + 1) {
        if let Some(child_pr) = &child.pr {
            Output::progress(format!(
                "Retargeting PR #{} to {new_base}...",
                child_pr.number
            ));
            if let Err(err) = forge.retarget(child_pr.number, &new_base) {
                Output::warning(format!("Failed to retarget PR #{}: {err}", child_pr.number));
            }
        }
    }

    if !keep_in_stack {
        Output::progress(format!("Removing {name} from stack..."));
        ctx.manager.remove_branch(&mut stack, &name)?;
        stack = ctx.manager.load(&stack.name)?;
    }

    // remaining open PRs get a fresh stack section
    if !stack.is_empty() {
        refresh_records(&ctx, forge.as_ref(), &mut stack);
        let entries = section_entries(&stack);
        for remaining in &stack.branches {
            let Some(remaining_pr) = &remaining.pr else { continue };
            if remaining_pr.state.is_terminal() {
                continue;
            }
            let body = render_stack_section(&stack.name, &entries, &remaining.name);
            let request = UpdatePullRequest {
                body: Some(body),
                ..Default::default()
            };
            if let Err(err) = forge.update(remaining_pr.number, &request) {
                Output::warning(format!(
                    "Failed to update PR #{}: {err}",
                    remaining_pr.number
                ));
            }
        }
    }

    Output::success("Merge complete");
    Ok(())
}
