//! Branch membership and navigation commands.

use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::{Error, Result};

/// Create a new branch at HEAD and insert it after the current branch.
pub fn branch(name: &str) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    if ctx.git.branch_exists(name) {
        return Err(Error::conflict(format!("branch '{name}' already exists")));
    }

    let current = ctx.git.current_branch()?;
    if current.is_empty() {
        return Err(Error::state(
            "could not determine current branch (detached HEAD?)",
        ));
    }
    if current != stack.base && !stack.has_branch(&current) {
        return Err(Error::state(format!(
            "current branch '{current}' is not in the stack"
        )));
    }

    ctx.git.create_and_checkout(name)?;

    if current == stack.base {
        ctx.manager.add_branch(&mut stack, name, None)?;
        Output::success(format!("Created branch '{name}'"));
        Output::sub_item("Added as first branch in stack");
    } else {
        ctx.manager.add_branch(&mut stack, name, Some(&current))?;
        Output::success(format!("Created branch '{name}'"));
        Output::sub_item(format!("Added after {current}"));
    }
    Ok(())
}

/// Add an existing branch, appending by default.
pub fn add(name: &str, after: Option<&str>) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    if !ctx.git.branch_exists(name) {
        return Err(Error::not_found(format!("branch '{name}' does not exist")));
    }

    match after {
        Some(after) => {
            ctx.manager.add_branch(&mut stack, name, Some(after))?;
            Output::success(format!("Added '{name}' after '{after}'"));
        }
        None => {
            ctx.manager.append_branch(&mut stack, name)?;
            Output::success(format!("Added '{name}' to stack"));
        }
    }
    Ok(())
}

pub fn remove(name: &str) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    ctx.manager.remove_branch(&mut stack, name)?;
    Output::success(format!("Removed '{name}' from stack"));
    Output::note("Note: the git branch was not deleted");
    Ok(())
}

pub fn move_branch(name: &str, after: &str) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;

    ctx.manager.move_branch(&mut stack, name, Some(after))?;
    Output::success(format!("Moved '{name}' after '{after}'"));
    Ok(())
}

/// Checkout the parent branch (toward the base).
pub fn up() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    let current = ctx.git.current_branch()?;
    if current == stack.base {
        return Err(Error::usage("already at base branch"));
    }

    let parent = stack.parent(&current).to_string();
    ctx.git.checkout(&parent)?;
    Output::success(format!("Checked out {parent}"));
    Ok(())
}

/// Checkout the child branch (away from the base).
pub fn down() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    let current = ctx.git.current_branch()?;
    let child = if current == stack.base {
        stack.branches.first().map(|b| b.name.clone())
    } else {
        stack.child(&current).map(|c| c.to_string())
    };

    let Some(child) = child else {
        return Err(Error::usage("no child branch to checkout"));
    };
    ctx.git.checkout(&child)?;
    Output::success(format!("Checked out {child}"));
    Ok(())
}

pub fn top() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    ctx.git.checkout(&stack.base)?;
    Output::success(format!("Checked out {} (base)", stack.base));
    Ok(())
}

pub fn bottom() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    let last = stack
        .branches
        .last()
        .ok_or_else(|| Error::usage("stack has no branches"))?
        .name
        .clone();
    ctx.git.checkout(&last)?;
    Output::success(format!("Checked out {last} (bottom)"));
    Ok(())
}

pub fn goto(position: usize) -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    let target = if position == 0 {
        stack.base.clone()
    } else if position <= stack.len() {
        stack.branches[position - 1].name.clone()
    } else {
        return Err(Error::usage(format!(
            "position {position} out of range (stack has {} branches)",
            stack.len()
        )));
    };

    ctx.git.checkout(&target)?;
    Output::success(format!("Checked out {target} (position {position})"));
    Ok(())
}

pub fn which() -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;

    let current = ctx.git.current_branch()?;
    if current == stack.base {
        println!("{current} (base, position 0)");
        return Ok(());
    }

    match stack.find_branch(&current) {
        Some(idx) => println!("{current} (position {} of {})", idx + 1, stack.len()),
        None => println!("{current} (not in stack)"),
    }
    Ok(())
}
