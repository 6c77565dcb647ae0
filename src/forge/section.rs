//! The stack section rendered into every pull request description.

use crate::stack::{PrRecord, PrState};
use std::fmt::Write;

/// One row of the rendered stack table.
#[derive(Debug, Clone)]
pub struct SectionEntry {
    pub name: String,
    pub pr: Option<PrRecord>,
}

/// Render the markdown stack section appended to PR bodies.
///
/// The focused branch's row is bolded and its status reads "This PR"
/// regardless of the recorded state. Pure and deterministic.
pub fn render_stack_section(stack_name: &str, entries: &[SectionEntry], focused: &str) -> String {
    let mut out = String::new();
    out.push_str("\n---\n\n");
    out.push_str("## 📚 Stack\n\n");
    let _ = writeln!(out, "This PR is part of the **{stack_name}** stack:\n");
    out.push_str("| # | Branch | PR | Status |\n");
    out.push_str("|---|--------|-----|--------|\n");

    for (i, entry) in entries.iter().enumerate() {
        let num = i + 1;
        let pr = entry
            .pr
            .as_ref()
            .map(|pr| format!("#{}", pr.number))
            .unwrap_or_else(|| "-".to_string());

        if entry.name == focused {
            let _ = writeln!(
                out,
                "| **{num}** | **`{}`** | **{pr}** | **🔄 This PR** |",
                entry.name
            );
        } else {
            let status = match entry.pr.as_ref().map(|pr| pr.state) {
                Some(PrState::Merged) => "✅ Merged",
                Some(PrState::Closed) => "❌ Closed",
                Some(PrState::Draft) => "📝 Draft",
                Some(PrState::Open) => "🔄 Open",
                None => "📝 Pending",
            };
            let _ = writeln!(out, "| {num} | `{}` | {pr} | {status} |", entry.name);
        }
    }

    out.push_str("\n---\n");
    out.push_str("*Managed by [stackline](https://github.com/stackline-dev/stackline)*\n");
    out
}
