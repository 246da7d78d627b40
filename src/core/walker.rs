use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::error::BundleError;

/// Calls `visitor` for every regular file under `root`.
///
/// A file root is visited once. Directories are descended into but never
/// visited themselves. Symlinks are followed, so a link to a directory is
/// walked like a directory. Sibling order is whatever the listing yields.
///
/// Any listing or metadata error aborts the walk.
pub fn walk<F>(root: &Path, visitor: &mut F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry
            .map_err(BundleError::from)
            .with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        visitor(entry.path())?;
    }

    Ok(())
}

/// Collects every file under `root` before anything is touched.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, &mut |path| {
        files.push(path.to_path_buf());
        Ok(())
    })?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_single_file_root_is_visited_once() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.js");
        fs::write(&file, "x").unwrap();

        let files = collect_files(&file).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_nested_directories_yield_only_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("top.js"), "").unwrap();
        fs::write(dir.path().join("a/b/mid.ts"), "").unwrap();
        fs::write(dir.path().join("a/b/c/deep.js"), "").unwrap();

        let mut files = collect_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![
                dir.path().join("a/b/c/deep.js"),
                dir.path().join("a/b/mid.ts"),
                dir.path().join("top.js"),
            ]
        );
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = collect_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::WalkDir(_))
        ));
    }

    #[test]
    fn test_visitor_error_stops_the_walk() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "").unwrap();
        fs::write(dir.path().join("b.js"), "").unwrap();

        let mut seen = 0;
        let result = walk(dir.path(), &mut |_| {
            seen += 1;
            anyhow::bail!("stop")
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_followed() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("inner.js"), "").unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&real, root.join("link")).unwrap();

        let files = collect_files(&root).unwrap();
        assert_eq!(files, vec![root.join("link").join("inner.js")]);
    }
}
