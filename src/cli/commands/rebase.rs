//! The `rebase` and `edit` commands.

use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::{Error, Result};
use crate::stack::{RebaseEngine, RebaseOptions};

pub fn rebase(from: Option<String>, to: Option<String>, no_atomic: bool) -> Result<()> {
    let ctx = Context::discover()?;
    let mut stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    if stack.is_empty() {
        Output::info("Stack has no branches to rebase");
        return Ok(());
    }

    let engine = RebaseEngine::new(&ctx.manager, &ctx.git);
    let opts = RebaseOptions {
        from,
        to,
        atomic: !no_atomic,
    };
    engine.rebase(&mut stack, &opts)?;

    Output::success("Stack rebase complete");
    Ok(())
}

/// Hand the terminal to `git rebase -i` for one branch's commits.
pub fn edit(branch: Option<&str>) -> Result<()> {
    let ctx = Context::discover()?;
    let stack = ctx.require_stack()?;
    ctx.require_clean_tree()?;

    let branch = match branch {
        Some(name) => {
            if !stack.has_branch(name) {
                return Err(Error::not_found(format!("branch '{name}' not in stack")));
            }
            name.to_string()
        }
        None => {
            let current = ctx.git.current_branch()?;
            if !stack.has_branch(&current) {
                return Err(Error::state(format!(
                    "current branch '{current}' not in stack"
                )));
            }
            current
        }
    };

    if ctx.git.current_branch()? != branch {
        ctx.git.checkout(&branch)?;
    }

    let parent = stack.parent(&branch).to_string();
    Output::progress(format!("Starting interactive rebase of {branch} onto {parent}"));
    Output::note("Afterwards run 'stk sync --no-fetch' to propagate changes through the stack");
    Output::spacing();

    ctx.git.rebase_interactive(&parent)
}
