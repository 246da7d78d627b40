use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::builders::environment::Environment;
use crate::builders::reporter::{ConsoleReporter, StatusReporter};
use crate::core::config::{
    BundleEnvConfig, ConfigManager, ConfigProvider, SubstitutionStrategy,
};
use crate::core::engine::BundleEngine;

/// Command-line values that replace the configuration file's.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Directories to process
    #[arg(long = "dir", num_args = 1..)]
    pub directories: Vec<String>,

    /// Individual files to process
    #[arg(long = "file", num_args = 1..)]
    pub files: Vec<String>,

    /// Source directories used when no directory or file is configured
    #[arg(long = "default-dir", num_args = 1..)]
    pub default_directories: Vec<String>,

    /// Only these variables may be substituted
    #[arg(long, num_args = 1..)]
    pub include: Vec<String>,

    /// These variables are never substituted
    #[arg(long, num_args = 1..)]
    pub exclude: Vec<String>,

    /// File extensions to process, without the leading dot
    #[arg(long = "extension", num_args = 1..)]
    pub extensions: Vec<String>,

    /// Keep backups in this directory instead of next to each file
    #[arg(long)]
    pub backup_dir: Option<String>,

    /// Mask long values in the report
    #[arg(long)]
    pub mask: bool,

    /// How references are rewritten
    #[arg(long, value_enum)]
    pub strategy: Option<SubstitutionStrategy>,
}

impl Overrides {
    pub fn apply(self, config: &mut BundleEnvConfig) {
        if !self.directories.is_empty() {
            config.directories = self.directories;
        }
        if !self.files.is_empty() {
            config.files = self.files;
        }
        if !self.default_directories.is_empty() {
            config.default_directories = self.default_directories;
        }
        if !self.include.is_empty() {
            config.include = self.include;
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude;
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions;
        }
        if let Some(backup_dir) = self.backup_dir {
            config.backup_directory = backup_dir;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        config.mask |= self.mask;
    }
}

pub fn init_logger(debug: bool, quiet: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else if quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    // A second initialization (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

pub fn config_manager(cwd: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<ConfigManager> {
    let mut manager = match cwd {
        Some(cwd) => ConfigManager::new_at(
            std::path::absolute(&cwd)
                .with_context(|| format!("Failed to resolve {}", cwd.display()))?,
        ),
        None => ConfigManager::new()?,
    };
    if let Some(config_path) = config_path {
        manager.set_config_path(config_path);
    }
    Ok(manager)
}

/// Loads the configuration, applies the overrides and starts logging.
pub fn load_config(
    manager: &ConfigManager,
    overrides: Overrides,
    debug: bool,
    quiet: bool,
) -> Result<BundleEnvConfig> {
    let mut config = manager.load_config()?;
    overrides.apply(&mut config);
    config.debug |= debug;
    config.quiet |= quiet;
    init_logger(config.debug, config.quiet);
    log::debug!("Using configuration {}", manager.get_config_path()?.display());
    Ok(config)
}

pub fn initialize_config(manager: &ConfigManager) -> Result<()> {
    let path = manager.get_config_path()?;
    if manager.initialize()? {
        println!("✓ Created {}", path.display());
        println!("Run 'bundle-env pre-build' before the build and 'bundle-env post-build' after it");
    } else {
        println!("ℹ️  {} already exists", path.display());
    }
    Ok(())
}

pub fn validate_config(manager: &ConfigManager) -> Result<()> {
    manager.validate_config()
}

pub fn pre_build(working_dir: &Path, config: BundleEnvConfig, json: bool) -> Result<()> {
    let reporter = ConsoleReporter::new(config.mask, config.quiet, json);
    let mut engine =
        BundleEngine::with_config(config, working_dir.to_path_buf(), Environment::from_process())?;
    let summary = engine.process_pre_build()?;
    reporter.report_pre_build(&summary)
}

pub fn post_build(working_dir: &Path, config: BundleEnvConfig, json: bool) -> Result<()> {
    let reporter = ConsoleReporter::new(config.mask, config.quiet, json);
    let mut engine =
        BundleEngine::with_config(config, working_dir.to_path_buf(), Environment::from_process())?;
    let summary = engine.process_post_build()?;
    reporter.report_post_build(&summary)
}

/// Pre-build, the build command, then post-build regardless of how the build
/// went. Returns the build command's exit code.
pub fn run_build(working_dir: &Path, config: BundleEnvConfig, command: &[String]) -> Result<i32> {
    let (program, args) = command.split_first().context("No build command given")?;

    if let Err(err) = pre_build(working_dir, config.clone(), false) {
        // Whatever was rewritten before the failure already has a backup.
        if let Err(restore_err) = post_build(working_dir, config, false) {
            log::error!("Restoring after the failed pre-build also failed: {restore_err:#}");
        }
        return Err(err);
    }

    log::debug!("Running {}", command.join(" "));
    let status = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .status()
        .with_context(|| format!("Failed to run {program}"));

    let restored = post_build(working_dir, config, false);
    let status = status?;
    restored?;

    if !status.success() {
        log::warn!("{program} exited with {status}");
    }
    Ok(status.code().unwrap_or(1))
}

pub fn show_status(working_dir: &Path, config: BundleEnvConfig) -> Result<()> {
    let engine =
        BundleEngine::with_config(config, working_dir.to_path_buf(), Environment::from_process())?;
    let pending = engine.pending_restores()?;

    if pending.is_empty() {
        println!("✓ No files are waiting to be restored.");
        return Ok(());
    }

    println!("⚠️  {} file(s) are waiting to be restored:", pending.len());
    for path in pending {
        println!("  - {}", path.display());
    }
    println!("Run 'bundle-env post-build' to restore them");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let mut config = BundleEnvConfig {
            directories: vec!["functions".to_string()],
            include: vec!["A".to_string()],
            ..Default::default()
        };
        Overrides {
            files: vec!["main.js".to_string()],
            backup_dir: Some("backups".to_string()),
            strategy: Some(SubstitutionStrategy::Prepend),
            mask: true,
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.directories, vec!["functions"]);
        assert_eq!(config.files, vec!["main.js"]);
        assert_eq!(config.include, vec!["A"]);
        assert_eq!(config.backup_directory, "backups");
        assert_eq!(config.strategy, SubstitutionStrategy::Prepend);
        assert!(config.mask);
    }

    #[test]
    fn test_run_build_needs_a_command() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_build(dir.path(), BundleEnvConfig::default(), &[]).is_err());
    }
}
