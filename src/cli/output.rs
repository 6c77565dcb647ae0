use console::style;
use std::fmt::Display;

/// Formatting helpers for user-facing command output.
pub struct Output;

impl Output {
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error<T: Display>(message: T) {
        println!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Step marker for multi-stage operations.
    pub fn progress<T: Display>(message: T) {
        println!("{} {}", style("▶").cyan(), message);
    }

    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    /// Dimmed secondary text.
    pub fn note<T: Display>(message: T) {
        println!("{}", style(message).dim());
    }

    pub fn spacing() {
        println!();
    }
}
