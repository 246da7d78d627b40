use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::builders::validator::{ConfigValidator, StandardValidator};

pub const CONFIG_FILE_NAME: &str = "bundle-env.toml";

/// How references are turned into literals.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionStrategy {
    /// Rewrite each `process.env` reference (and destructuring) in place.
    #[default]
    Inline,
    /// Prepend one assignment per eligible variable to every file.
    Prepend,
}

impl fmt::Display for SubstitutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstitutionStrategy::Inline => write!(f, "inline"),
            SubstitutionStrategy::Prepend => write!(f, "prepend"),
        }
    }
}

/// The options supplied once per run.
///
/// An empty `backup_directory` selects sibling `.bak` backups.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BundleEnvConfig {
    #[serde(alias = "backupDirectory")]
    pub backup_directory: String,
    pub directories: Vec<String>,
    pub files: Vec<String>,
    /// Source directories used when neither `directories` nor `files` is set.
    #[serde(alias = "defaultDirectories")]
    pub default_directories: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub extensions: Vec<String>,
    pub mask: bool,
    pub debug: bool,
    pub quiet: bool,
    pub strategy: SubstitutionStrategy,
}

impl Default for BundleEnvConfig {
    fn default() -> Self {
        Self {
            backup_directory: String::new(),
            directories: Vec::new(),
            files: Vec::new(),
            default_directories: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            extensions: vec!["js".to_string(), "ts".to_string()],
            mask: false,
            debug: false,
            quiet: false,
            strategy: SubstitutionStrategy::Inline,
        }
    }
}

impl BundleEnvConfig {
    /// Resolved backup root, or `None` for the sibling strategy.
    pub fn backup_root(&self, working_dir: &Path) -> Option<PathBuf> {
        let trimmed = self.backup_directory.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(working_dir.join(trimmed))
        }
    }

    pub fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    working_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let working_dir = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self::new_at(working_dir))
    }

    pub fn new_at(working_dir: PathBuf) -> Self {
        let config_path = working_dir.join(CONFIG_FILE_NAME);
        Self {
            config_path,
            working_dir,
        }
    }

    pub fn set_config_path(&mut self, config_path: PathBuf) {
        self.config_path = if config_path.is_absolute() {
            config_path
        } else {
            self.working_dir.join(config_path)
        };
    }

    /// Writes the default configuration unless one already exists.
    /// Returns `true` when a file was created.
    pub fn initialize(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }

        let default_config = BundleEnvConfig::default();
        self.save_config(&default_config)?;
        Ok(true)
    }

    pub fn validate_config(&self) -> Result<()> {
        let mut config = self.load_config()?;
        let validator = StandardValidator::new();
        let mut issues = validator.normalize(&mut config);
        issues.extend(validator.validate_config(&config)?);

        if issues.is_empty() {
            println!("✓ Configuration is valid.");
        } else {
            println!("⚠️  Found issues in configuration:");
            for issue in issues {
                println!("  - {issue}");
            }
        }
        Ok(())
    }

    pub fn get_working_dir(&self) -> &Path {
        &self.working_dir
    }
}

pub trait ConfigProvider {
    fn load_config(&self) -> Result<BundleEnvConfig>;
    fn save_config(&self, config: &BundleEnvConfig) -> Result<()>;
    fn get_config_path(&self) -> Result<PathBuf>;
}

impl ConfigProvider for ConfigManager {
    fn load_config(&self) -> Result<BundleEnvConfig> {
        if !self.config_path.exists() {
            return Ok(BundleEnvConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file {}", self.config_path.display())
        })?;

        match config_format(&self.config_path) {
            "json" => serde_json::from_str(&content).context("Failed to parse JSON config file"),
            "yaml" => serde_yaml::from_str(&content).context("Failed to parse YAML config file"),
            _ => toml::from_str(&content).context("Failed to parse config file"),
        }
    }

    fn save_config(&self, config: &BundleEnvConfig) -> Result<()> {
        let content = match config_format(&self.config_path) {
            "json" => {
                serde_json::to_string_pretty(config).context("Failed to serialize to JSON")?
            }
            "yaml" => serde_yaml::to_string(config).context("Failed to serialize to YAML")?,
            _ => toml::to_string_pretty(config).context("Failed to serialize config")?,
        };

        fs::write(&self.config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn get_config_path(&self) -> Result<PathBuf> {
        Ok(self.config_path.clone())
    }
}

fn config_format(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "json",
        Some("yaml") | Some("yml") => "yaml",
        _ => "toml",
    }
}
