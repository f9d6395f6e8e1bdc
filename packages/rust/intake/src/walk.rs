//! Recursive input discovery.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use xnatkit_shared::{Result, XnatKitError};

use crate::classify::find_images;

/// Every directory under `root` (inclusive) holding at least one file with
/// one of `extensions`, paired with those file names. Directories are
/// visited in sorted order.
pub fn image_dirs(root: &Path, extensions: &[&str]) -> Result<Vec<(PathBuf, Vec<String>)>> {
    ensure_dir(root)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let files = find_images(entry.path(), extensions)?;
        if !files.is_empty() {
            debug!(dir = %entry.path().display(), files = files.len(), "image directory");
            found.push((entry.into_path(), files));
        }
    }
    Ok(found)
}

/// Every `.PAR` file (any case) under `root`, sorted by path.
pub fn par_files(root: &Path) -> Result<Vec<PathBuf>> {
    ensure_dir(root)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let is_par = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("par"));
        if entry.file_type().is_file() && is_par {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

fn ensure_dir(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(XnatKitError::validation(format!(
            "input directory not found: {}",
            root.display()
        )))
    }
}

fn walk_error(root: &Path, e: walkdir::Error) -> XnatKitError {
    let path = e.path().unwrap_or(root).to_path_buf();
    match e.into_io_error() {
        Some(io) => XnatKitError::io(path, io),
        None => XnatKitError::validation(format!("filesystem loop at {}", path.display())),
    }
}
