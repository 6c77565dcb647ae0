use crate::cli::output::Output;
use crate::cli::Context;
use crate::errors::{Error, Result};
use crate::stack::Stack;

pub fn run(name: &str, base: Option<String>) -> Result<()> {
    let ctx = Context::discover()?;
    let stack = init_stack(&ctx, name, base)?;

    Output::success(format!("Initialized stack '{name}'"));
    Output::sub_item(format!("Base: {}", stack.base));
    if let Some(branch) = stack.branches.first() {
        Output::sub_item(format!("Branch: {}", branch.name));
    }
    Output::spacing();
    Output::note("Next: 'stk branch <name>' to grow the stack, 'stk status' to view it");
    Ok(())
}

/// Create a stack named `name` on `base` (auto-detected when omitted) and
/// make it current. The checked-out branch joins the stack unless it is the
/// base itself.
pub fn init_stack(ctx: &Context, name: &str, base: Option<String>) -> Result<Stack> {
    if ctx.manager.store().exists(name) {
        return Err(Error::conflict(format!("stack '{name}' already exists")));
    }

    let base = match base {
        Some(base) => base,
        None => ctx
            .git
            .default_branch()
            .or_else(|_| ctx.git.upstream_branch())
            .map_err(|_| Error::usage("could not determine base branch; use --base to specify"))?,
    };
    if !ctx.git.branch_exists(&base) {
        return Err(Error::state(format!("base branch '{base}' does not exist")));
    }

    let current = ctx.git.current_branch()?;
    if current.is_empty() {
        return Err(Error::state(
            "could not determine current branch (detached HEAD?)",
        ));
    }

    let mut stack = ctx.manager.create(name, &base)?;
    if current != base {
        ctx.manager.append_branch(&mut stack, &current)?;
    }
    ctx.manager.store().set_current(name)?;
    Ok(stack)
}
