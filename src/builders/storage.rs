use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::error::BundleError;
use crate::core::walker;

pub const SIBLING_SUFFIX: &str = ".bak";
pub const SIDECAR_SUFFIX: &str = ".path";

/// Keeps pre-build originals so that post-build can put them back.
///
/// `store_backup` runs before the rewritten content is written, and refuses
/// to overwrite a live backup: that would replace the real original with
/// rewritten text.
pub trait StorageProvider {
    fn store_backup(&mut self, root: &Path, file_path: &Path, original: &[u8]) -> Result<()>;
    /// Restores every backup reachable from `roots` and removes the artifacts.
    /// Returns the restored paths.
    fn restore_all(&mut self, roots: &[PathBuf]) -> Result<Vec<PathBuf>>;
    /// Original paths that currently have a live backup.
    fn pending(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>>;
    fn describe(&self) -> String;
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `path` minus `suffix`, if its file name carries it (and is not only the suffix).
fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

/// Resolves `.` and `..` without touching the file system. A `..` above the
/// root of an absolute path stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// `<file>.bak` next to each rewritten file.
pub struct SiblingStorage;

impl SiblingStorage {
    pub fn new() -> Self {
        Self
    }

    fn backups_under(&self, roots: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut backups = Vec::new();
        for root in roots {
            if root.is_dir() {
                for file in walker::collect_files(root)? {
                    if let Some(original) = strip_suffix(&file, SIBLING_SUFFIX) {
                        backups.push((file, original));
                    }
                }
            } else {
                let backup = with_suffix(root, SIBLING_SUFFIX);
                if backup.is_file() {
                    backups.push((backup, root.clone()));
                }
            }
        }
        Ok(backups)
    }
}

impl StorageProvider for SiblingStorage {
    fn store_backup(&mut self, _root: &Path, file_path: &Path, original: &[u8]) -> Result<()> {
        let backup_path = with_suffix(file_path, SIBLING_SUFFIX);
        if backup_path.exists() {
            anyhow::bail!(
                "Backup {} already exists; run post-build to restore it first",
                backup_path.display()
            );
        }
        fs::write(&backup_path, original)
            .with_context(|| format!("Failed to write backup file {}", backup_path.display()))?;
        log::debug!("Backed up {} to {}", file_path.display(), backup_path.display());
        Ok(())
    }

    fn restore_all(&mut self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut restored = Vec::new();
        for (backup, original) in self.backups_under(roots)? {
            let content = fs::read(&backup)
                .with_context(|| format!("Failed to read backup file {}", backup.display()))?;
            fs::write(&original, content)
                .with_context(|| format!("Failed to restore {}", original.display()))?;
            // Clean up the backup file after restoring it
            fs::remove_file(&backup).with_context(|| {
                format!("Failed to remove backup file {} after restore", backup.display())
            })?;
            restored.push(original);
        }
        Ok(restored)
    }

    fn pending(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        Ok(self
            .backups_under(roots)?
            .into_iter()
            .map(|(_, original)| original)
            .collect())
    }

    fn describe(&self) -> String {
        format!("sibling {SIBLING_SUFFIX} files")
    }
}

/// Mirrors each original under a backup root, with a `.path` sidecar holding
/// the absolute original location.
pub struct DirectoryStorage {
    backup_root: PathBuf,
    working_dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(backup_root: PathBuf, working_dir: PathBuf) -> Result<Self> {
        if backup_root.is_file() {
            return Err(BundleError::InvalidBackupDirectory(backup_root).into());
        }
        Ok(Self {
            backup_root,
            working_dir,
        })
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Whether a previous pre-build left anything to restore.
    pub fn has_backups(&self) -> Result<bool> {
        if !self.backup_root.is_dir() {
            return Ok(false);
        }
        let mut entries = fs::read_dir(&self.backup_root)
            .with_context(|| format!("Failed to list {}", self.backup_root.display()))?;
        Ok(entries.next().is_some())
    }

    /// Position of `file_path` inside the backup root. Files under the working
    /// directory keep their path relative to it; others are placed under the
    /// name of the root they were found in. Both sides are normalized first so
    /// a `..` in a target never leads out of the backup root.
    fn mirrored_path(&self, root: &Path, file_path: &Path) -> PathBuf {
        let file = normalize_lexically(file_path);
        if let Ok(relative) = file.strip_prefix(normalize_lexically(&self.working_dir))
            && !relative.as_os_str().is_empty()
        {
            return self.backup_root.join(relative);
        }

        let root = normalize_lexically(root);
        let mut mirrored = self.backup_root.clone();
        if let Some(name) = root.file_name() {
            mirrored.push(name);
        }
        match file.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => mirrored.push(relative),
            Ok(_) => {}
            Err(_) => {
                if let Some(name) = file.file_name() {
                    mirrored.push(name);
                }
            }
        }
        mirrored
    }

    fn sidecars(&self) -> Result<Vec<(PathBuf, PathBuf)>> {
        if !self.backup_root.is_dir() {
            return Ok(Vec::new());
        }
        let mut sidecars = Vec::new();
        for file in walker::collect_files(&self.backup_root)? {
            if let Some(content) = strip_suffix(&file, SIDECAR_SUFFIX) {
                sidecars.push((file, content));
            }
        }
        Ok(sidecars)
    }

    fn read_sidecar(sidecar: &Path) -> Result<PathBuf> {
        let original = fs::read_to_string(sidecar)
            .with_context(|| format!("Failed to read sidecar {}", sidecar.display()))?;
        Ok(PathBuf::from(original))
    }
}

impl StorageProvider for DirectoryStorage {
    fn store_backup(&mut self, root: &Path, file_path: &Path, original: &[u8]) -> Result<()> {
        let absolute = std::path::absolute(file_path)
            .with_context(|| format!("Failed to resolve {}", file_path.display()))?;
        let absolute_str = absolute
            .to_str()
            .with_context(|| format!("{} is not valid UTF-8", absolute.display()))?;

        let mirrored = self.mirrored_path(root, &absolute);
        if !mirrored.starts_with(&self.backup_root) || mirrored == self.backup_root {
            anyhow::bail!(
                "Cannot place a backup of {} inside {}",
                absolute.display(),
                self.backup_root.display()
            );
        }
        let sidecar = with_suffix(&mirrored, SIDECAR_SUFFIX);
        if mirrored.exists() || sidecar.exists() {
            anyhow::bail!(
                "Backup {} already exists; run post-build to restore it first",
                mirrored.display()
            );
        }

        let parent = mirrored.parent().unwrap_or(&self.backup_root);
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create backup directory {}", parent.display()))?;
        fs::write(&mirrored, original)
            .with_context(|| format!("Failed to write backup file {}", mirrored.display()))?;
        fs::write(&sidecar, absolute_str)
            .with_context(|| format!("Failed to write sidecar {}", sidecar.display()))?;

        log::debug!("Backed up {} to {}", absolute.display(), mirrored.display());
        Ok(())
    }

    fn restore_all(&mut self, _roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut restored = Vec::new();
        for (sidecar, content_path) in self.sidecars()? {
            let original = Self::read_sidecar(&sidecar)?;
            let content = fs::read(&content_path)
                .with_context(|| format!("Failed to read backup file {}", content_path.display()))?;
            fs::write(&original, content)
                .with_context(|| format!("Failed to restore {}", original.display()))?;
            restored.push(original);
        }

        if self.backup_root.exists() {
            fs::remove_dir_all(&self.backup_root).with_context(|| {
                format!("Failed to remove backup directory {}", self.backup_root.display())
            })?;
        }
        Ok(restored)
    }

    fn pending(&self, _roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        self.sidecars()?
            .iter()
            .map(|(sidecar, _)| Self::read_sidecar(sidecar))
            .collect()
    }

    fn describe(&self) -> String {
        format!("backup directory {}", self.backup_root.display())
    }
}
