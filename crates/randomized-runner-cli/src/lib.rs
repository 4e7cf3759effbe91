//! Worker CLI for the randomized test runner.
//!
//! Runs built-in suites by name, prints a text report and optionally
//! streams JSON-lines events for a supervising process.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
mod commands;
mod config;
mod error;
pub mod events;
mod output;
pub mod worker;

pub use commands::{Cli, ColorArg, Commands, ListArgs, RunArgs, SeedArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use events::{read_events, Event, EventWriter};
pub use output::{format_description, summary_line, ConsoleReporter};
pub use worker::{collect_suite_names, prepare, Worker};

use randomized_runner::Description;

/// Render a description tree, two spaces per level
#[must_use]
pub fn render_tree(description: &Description) -> String {
    fn walk(node: &Description, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(node.display_name());
        out.push('\n');
        for child in node.children() {
            walk(child, depth + 1, out);
        }
    }
    let mut out = String::new();
    walk(description, 0, &mut out);
    out
}
