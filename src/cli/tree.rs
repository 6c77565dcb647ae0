//! Tree rendering for `status` and `log`.
//!
//! Rendering is pure string building; ANSI styling goes through [`Styler`]
//! so tests can assert on plain output.

use crate::stack::{PrState, Stack};
use console::style;

/// Applies terminal styles, or nothing when disabled.
pub struct Styler {
    enabled: bool,
}

impl Styler {
    pub fn auto() -> Self {
        Self {
            enabled: console::colors_enabled(),
        }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn bold(&self, s: &str) -> String {
        if self.enabled {
            style(s).bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(&self, s: &str) -> String {
        if self.enabled {
            style(s).dim().to_string()
        } else {
            s.to_string()
        }
    }

    fn green(&self, s: &str) -> String {
        if self.enabled {
            style(s).green().to_string()
        } else {
            s.to_string()
        }
    }

    fn pr_badge(&self, number: u64, state: PrState) -> String {
        let badge = format!("#{number}");
        if !self.enabled {
            return badge;
        }
        match state {
            PrState::Open => style(badge).blue(),
            PrState::Draft => style(badge).dim(),
            PrState::Merged => style(badge).magenta(),
            PrState::Closed => style(badge).red(),
        }
        .to_string()
    }
}

/// Options controlling what the tree shows.
pub struct TreeOptions<'a> {
    pub current_branch: &'a str,
    pub show_sha: bool,
    /// Resolves a branch name to a short SHA when `show_sha` is set.
    pub sha: Option<&'a dyn Fn(&str) -> String>,
}

/// Render the stack as an indented tree, base first.
pub fn render_tree(stack: &Stack, opts: &TreeOptions, styler: &Styler) -> String {
    let mut out = String::new();
    out.push_str(&format!("📚 Stack: {}\n\n", styler.bold(&stack.name)));

    out.push_str(&branch_line(&stack.base, 0, false, opts, styler));
    out.push('\n');

    for (i, branch) in stack.branches.iter().enumerate() {
        let is_last = i == stack.branches.len() - 1;
        let mut line = branch_line(&branch.name, i + 1, is_last, opts, styler);
        if let Some(pr) = &branch.pr {
            line.push(' ');
            line.push_str(&styler.pr_badge(pr.number, pr.state));
        }
        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn branch_line(
    name: &str,
    depth: usize,
    is_last: bool,
    opts: &TreeOptions,
    styler: &Styler,
) -> String {
    let mut line = String::new();

    if depth > 0 {
        for _ in 0..depth - 1 {
            line.push_str("│   ");
        }
        line.push_str(if is_last { "└── " } else { "├── " });
    }

    let is_current = name == opts.current_branch;
    line.push_str(if is_current { "● " } else { "○ " });
    if is_current {
        line.push_str(&styler.bold(&styler.green(name)));
    } else {
        line.push_str(name);
    }

    if opts.show_sha {
        if let Some(sha) = opts.sha {
            let short = sha(name);
            if !short.is_empty() {
                line.push(' ');
                line.push_str(&styler.dim(&short));
            }
        }
    }

    line
}

/// Render the stack list with the current stack marked.
pub fn render_list(names: &[String], current: Option<&str>, styler: &Styler) -> String {
    if names.is_empty() {
        return format!(
            "{}\n",
            styler.dim("No stacks found. Run 'stk init <name>' to create one.")
        );
    }

    let mut out = String::new();
    for name in names {
        if Some(name.as_str()) == current {
            out.push_str(&format!("● {} (current)\n", styler.bold(name)));
        } else {
            out.push_str(&format!("  {name}\n"));
        }
    }
    out
}
