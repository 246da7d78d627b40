use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::builders::environment::Environment;
use crate::builders::policy::{Rejected, VariablePolicy};
use crate::builders::reporter::{ProcessedFile, RestoreSummary, RunSummary};
use crate::builders::storage::{DirectoryStorage, SiblingStorage, StorageProvider};
use crate::builders::substitution::{self, Substituter};
use crate::builders::validator::{ConfigValidator, StandardValidator};
use crate::core::config::{BundleEnvConfig, ConfigManager, ConfigProvider, SubstitutionStrategy};
use crate::core::error::BundleError;
use crate::core::walker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Directory,
    File,
}

enum FileVisit {
    Processed(ProcessedFile),
    Unchanged,
    NotText,
}

/// Runs the two lifecycle phases against one validated configuration.
pub struct BundleEngine {
    config: BundleEnvConfig,
    working_dir: PathBuf,
    env: Environment,
    policy: VariablePolicy,
}

impl BundleEngine {
    pub fn new(config_manager: &ConfigManager, env: Environment) -> Result<Self> {
        let config = config_manager.load_config()?;
        Self::with_config(config, config_manager.get_working_dir().to_path_buf(), env)
    }

    /// Normalizes and validates `config`. Non-fatal issues are logged.
    pub fn with_config(
        mut config: BundleEnvConfig,
        working_dir: PathBuf,
        env: Environment,
    ) -> Result<Self> {
        let validator = StandardValidator::new();
        let mut issues = validator.normalize(&mut config);
        issues.extend(validator.validate_config(&config)?);
        for issue in issues {
            log::warn!("{issue}");
        }

        let policy = VariablePolicy::new(&config.include, &config.exclude);
        Ok(Self {
            config,
            working_dir,
            env,
            policy,
        })
    }

    pub fn config(&self) -> &BundleEnvConfig {
        &self.config
    }

    fn configured_targets(&self) -> Result<Vec<(&str, TargetKind)>> {
        if self.config.directories.is_empty() && self.config.files.is_empty() {
            if self.config.default_directories.is_empty() {
                return Err(BundleError::NoSourceDirectory.into());
            }
            log::debug!("No targets configured, using the platform default directories.");
            return Ok(self
                .config
                .default_directories
                .iter()
                .map(|d| (d.as_str(), TargetKind::Directory))
                .collect());
        }

        Ok(self
            .config
            .directories
            .iter()
            .map(|d| (d.as_str(), TargetKind::Directory))
            .chain(self.config.files.iter().map(|f| (f.as_str(), TargetKind::File)))
            .collect())
    }

    /// Resolves every configured target against the working directory.
    /// Any target that is missing or of the wrong kind fails the build.
    pub fn resolve_targets(&self) -> Result<Vec<PathBuf>> {
        let mut resolved = Vec::new();
        for (entry, kind) in self.configured_targets()? {
            let path = self.working_dir.join(entry);
            if !path.exists() {
                return Err(BundleError::MissingTarget(entry.to_string()).into());
            }
            match kind {
                TargetKind::Directory if !path.is_dir() => {
                    return Err(BundleError::NotADirectory(entry.to_string()).into());
                }
                TargetKind::File if !path.is_file() => {
                    return Err(BundleError::NotAFile(entry.to_string()).into());
                }
                _ => resolved.push(path),
            }
        }
        Ok(resolved)
    }

    /// Same targets as pre-build, but a vanished target only warns: there is
    /// nothing left to restore under it.
    fn restore_targets(&self) -> Result<Vec<PathBuf>> {
        let mut resolved = Vec::new();
        for (entry, _) in self.configured_targets()? {
            let path = self.working_dir.join(entry);
            if path.exists() {
                resolved.push(path);
            } else {
                log::warn!("{entry} no longer exists, nothing to restore there.");
            }
        }
        Ok(resolved)
    }

    fn backup_storage(&self) -> Result<Box<dyn StorageProvider>> {
        Ok(match self.config.backup_root(&self.working_dir) {
            Some(root) => Box::new(DirectoryStorage::new(root, self.working_dir.clone())?),
            None => Box::new(SiblingStorage::new()),
        })
    }

    /// The directory strategy is used only if a backup directory is configured
    /// and holds something; otherwise sibling backups are looked for.
    fn restore_storage(&self) -> Result<Box<dyn StorageProvider>> {
        if let Some(root) = self.config.backup_root(&self.working_dir) {
            let storage = DirectoryStorage::new(root, self.working_dir.clone())?;
            if storage.has_backups()? {
                return Ok(Box::new(storage));
            }
            log::debug!(
                "{} is empty or missing, looking for sibling backups.",
                storage.backup_root().display()
            );
        }
        Ok(Box::new(SiblingStorage::new()))
    }

    /// Every file to visit, paired with the root it was found under. The whole
    /// tree is listed before any file is touched, and each file appears once.
    fn collect_work(&self, targets: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let backup_root = self.config.backup_root(&self.working_dir);
        let mut seen = HashSet::new();
        let mut work = Vec::new();

        for target in targets {
            for file in walker::collect_files(target)? {
                if backup_root.as_ref().is_some_and(|b| file.starts_with(b)) {
                    continue;
                }
                if seen.insert(file.clone()) {
                    work.push((target.clone(), file));
                }
            }
        }
        Ok(work)
    }

    pub fn process_pre_build(&mut self) -> Result<RunSummary> {
        let targets = self.resolve_targets()?;
        let work = self.collect_work(&targets)?;
        let substituter = substitution::for_strategy(self.config.strategy)?;
        let mut storage = self.backup_storage()?;
        log::debug!(
            "Processing {} file(s) with the {} strategy, backups in {}",
            work.len(),
            self.config.strategy,
            storage.describe()
        );

        if self.config.strategy == SubstitutionStrategy::Prepend {
            self.report_rejected_variables();
        }

        let mut summary = RunSummary::default();
        for (root, file) in work {
            if !self.config.has_extension(&file) {
                log::warn!(
                    "Skipping {} because its extension is not listed in \"extensions\".",
                    file.display()
                );
                summary.skipped += 1;
                continue;
            }
            match self.process_file(&root, &file, substituter.as_ref(), storage.as_mut())? {
                FileVisit::Processed(processed) => summary.record(processed),
                FileVisit::Unchanged => {}
                FileVisit::NotText => summary.skipped += 1,
            }
        }

        Ok(summary)
    }

    /// The prepend strategy consults the policy once per variable per file, so
    /// its rejections are reported here, once per run.
    fn report_rejected_variables(&self) -> Rejected<'_> {
        let rejected = self.policy.rejected(self.env.iter().map(|(name, _)| name));
        for name in &rejected.excluded {
            log::warn!("{name} will not be injected because it is in the exclude list.");
        }
        if !rejected.not_included.is_empty() {
            log::warn!(
                "{} variable(s) will not be injected because they are not in the include list.",
                rejected.not_included.len()
            );
            log::debug!("Not included: {}", rejected.not_included.join(", "));
        }
        rejected
    }

    fn process_file(
        &self,
        root: &Path,
        file: &Path,
        substituter: &dyn Substituter,
        storage: &mut dyn StorageProvider,
    ) -> Result<FileVisit> {
        let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let Ok(original) = String::from_utf8(bytes) else {
            log::warn!("Skipping {} because it is not valid UTF-8 text.", file.display());
            return Ok(FileVisit::NotText);
        };
        let outcome = substituter.substitute(&original, &self.env, &self.policy);
        if !outcome.is_modified() {
            log::debug!("{} has nothing to substitute.", file.display());
            return Ok(FileVisit::Unchanged);
        }

        // The original must be safe on disk before it is overwritten.
        storage.store_backup(root, file, original.as_bytes())?;
        fs::write(file, &outcome.content)
            .with_context(|| format!("Failed to write {}", file.display()))?;

        Ok(FileVisit::Processed(ProcessedFile {
            path: file.to_path_buf(),
            substitutions: outcome.substitutions,
        }))
    }

    pub fn process_post_build(&mut self) -> Result<RestoreSummary> {
        let targets = self.restore_targets()?;
        let mut storage = self.restore_storage()?;
        let restored = storage.restore_all(&targets)?;
        for path in &restored {
            log::debug!("Restored {}", path.display());
        }
        Ok(RestoreSummary {
            restored,
            strategy: storage.describe(),
        })
    }

    /// Files that currently have a live backup.
    pub fn pending_restores(&self) -> Result<Vec<PathBuf>> {
        let targets = self.restore_targets()?;
        self.restore_storage()?.pending(&targets)
    }
}
