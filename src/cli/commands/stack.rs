//! Stack-level commands: status, list, switch, delete, rename, doctor, log.

use crate::cli::output::Output;
use crate::cli::tree::{render_list, render_tree, Styler, TreeOptions};
use crate::cli::Context;
use crate::errors::{Error, Result};
use dialoguer::Confirm;

pub fn status(show_sha: bool) -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    let current = ctx.git.current_branch().unwrap_or_default();

    let sha = |name: &str| ctx.git.short_sha(name).unwrap_or_default();
    let sha_fn: &dyn Fn(&str) -> String = &sha;
    let opts = TreeOptions {
        current_branch: &current,
        show_sha,
        sha: show_sha.then_some(sha_fn),
    };
    print!("{}", render_tree(&stack, &opts, &Styler::auto()));

    Output::spacing();
    Output::note(format!("Base: {}", stack.base));
    Output::note(format!("Branches: {}", stack.len()));
    if let Some(snapshot) = &stack.snapshot {
        Output::note(format!(
            "Snapshot: {}",
            snapshot.taken_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let ctx = Context::discover()?;
    let names = ctx.manager.store().list()?;
    let current = ctx.manager.store().current_name()?;
    print!(
        "{}",
        render_list(&names, current.as_deref(), &Styler::auto())
    );
    Ok(())
}

pub fn switch(name: &str) -> Result<()> {
    let ctx = Context::discover()?;
    ctx.manager.store().set_current(name)?;
    Output::success(format!("Switched to stack '{name}'"));
    Ok(())
}

pub fn delete(name: &str, force: bool) -> Result<()> {
    let ctx = Context::discover()?;
    if !ctx.manager.store().exists(name) {
        return Err(Error::not_found(format!("stack '{name}' not found")));
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete stack '{name}'?"))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            Output::info("Aborted");
            return Ok(());
        }
    }

    ctx.manager.store().delete(name)?;
    Output::success(format!("Deleted stack '{name}'"));
    Output::note("Note: git branches were not deleted");
    Ok(())
}

pub fn rename(old_name: &str, new_name: &str) -> Result<()> {
    let ctx = Context::discover()?;
    ctx.manager.store().rename(old_name, new_name)?;
    Output::success(format!("Renamed stack '{old_name}' to '{new_name}'"));
    Ok(())
}

pub fn doctor(clear_snapshot: bool) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    if let Some(snapshot) = stack.snapshot.clone() {
        if clear_snapshot {
            ctx.manager.clear_snapshot(&mut stack)?;
            Output::success("Cleared leftover rebase snapshot");
        } else {
            Output::warning(format!(
                "A rebase snapshot from {} is present; rerun with --clear-snapshot once the branches are settled",
                snapshot.taken_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }

    let issues = ctx.manager.validate(&stack, |name| ctx.git.branch_exists(name));
    if issues.is_empty() {
        Output::success(format!("Stack '{}' is healthy", stack.name));
        return Ok(());
    }

    Output::error(format!("Found {} issue(s):", issues.len()));
    for issue in &issues {
        Output::sub_item(format!("{}: {}", issue.branch, issue.message));
    }
    Err(Error::state("stack has validation errors"))
}

pub fn log() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    let current = ctx.git.current_branch().unwrap_or_default();

    let sha = |name: &str| ctx.git.short_sha(name).unwrap_or_default();
    let sha_fn: &dyn Fn(&str) -> String = &sha;
    let opts = TreeOptions {
        current_branch: &current,
        show_sha: true,
        sha: Some(sha_fn),
    };
    print!("{}", render_tree(&stack, &opts, &Styler::auto()));
    Ok(())
}
