use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::builders::substitution::Substitution;

pub const REPORT_TITLE: &str = "bundle-env";
const MASK_VISIBLE_CHARS: usize = 5;
const MASK_MARKER: &str = "*****";

/// A file that was rewritten during pre-build.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub substitutions: Vec<Substitution>,
}

/// What a pre-build run did. Built by the engine, handed to the reporter.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<ProcessedFile>,
    pub variables: BTreeSet<String>,
    /// Files skipped because of their extension.
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, file: ProcessedFile) {
        self.variables
            .extend(file.substitutions.iter().map(|s| s.name.clone()));
        self.files.push(file);
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Successfully processed {} file(s) containing {} variable(s)",
            self.file_count(),
            self.variable_count()
        )
    }
}

/// What a post-build run did.
#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub restored: Vec<PathBuf>,
    pub strategy: String,
}

impl RestoreSummary {
    pub fn summary_line(&self) -> String {
        format!(
            "Successfully restored {} file(s) from {}",
            self.restored.len(),
            self.strategy
        )
    }
}

/// The object handed to the host's status display.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub summary: String,
    pub title: String,
}

impl StatusMessage {
    pub fn new(summary: String) -> Self {
        Self {
            summary,
            title: REPORT_TITLE.to_string(),
        }
    }
}

/// Renders a reported value, keeping only the first five characters of
/// longer values when masking.
pub fn format_value(value: &str, mask: bool) -> String {
    if mask && value.chars().count() > MASK_VISIBLE_CHARS {
        let visible: String = value.chars().take(MASK_VISIBLE_CHARS).collect();
        format!("'{visible}{MASK_MARKER}'")
    } else {
        format!("'{value}'")
    }
}

pub trait StatusReporter {
    fn report_pre_build(&self, summary: &RunSummary) -> Result<()>;
    fn report_post_build(&self, summary: &RestoreSummary) -> Result<()>;
}

/// Prints the report to the console.
pub struct ConsoleReporter {
    mask: bool,
    quiet: bool,
    json: bool,
}

impl ConsoleReporter {
    pub fn new(mask: bool, quiet: bool, json: bool) -> Self {
        Self { mask, quiet, json }
    }

    /// Lines printed for one file, `undefined` entries flagged for a warning.
    fn format_file(&self, file: &ProcessedFile) -> Vec<(String, bool)> {
        let mut lines = vec![(format!("{} processed:", file.path.display()), false)];
        for substitution in &file.substitutions {
            match &substitution.value {
                Some(value) => lines.push((
                    format!("  {}: {}", substitution.key, format_value(value, self.mask)),
                    false,
                )),
                None => lines.push((format!("  {}: undefined", substitution.key), true)),
            }
        }
        lines
    }

    fn emit_status(&self, summary: String) -> Result<()> {
        if self.json {
            let status = StatusMessage::new(summary);
            let rendered =
                serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
            println!("{rendered}");
        } else {
            log::info!("{} {}", "✓".green().bold(), summary.green());
        }
        Ok(())
    }
}

impl StatusReporter for ConsoleReporter {
    fn report_pre_build(&self, summary: &RunSummary) -> Result<()> {
        if !self.quiet && !self.json {
            for file in &summary.files {
                for (line, is_warning) in self.format_file(file) {
                    if is_warning {
                        log::warn!("{line}");
                    } else {
                        println!("{line}");
                    }
                }
            }
        }
        self.emit_status(summary.summary_line())
    }

    fn report_post_build(&self, summary: &RestoreSummary) -> Result<()> {
        if !self.quiet && !self.json {
            for path in &summary.restored {
                println!("{} successfully processed and restored.", path.display());
            }
        }
        self.emit_status(summary.summary_line())
    }
}
