//! Locating the two halves of a PAR/REC recording.

use std::path::{Path, PathBuf};

use xnatkit_shared::{Result, XnatKitError};

/// A PAR header and its REC pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParRecPair {
    pub par: PathBuf,
    pub rec: PathBuf,
}

impl ParRecPair {
    /// File stem shared by both halves (`scan01` for `scan01.PAR`).
    pub fn stem(&self) -> String {
        self.par
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Given either half of a pair (`.PAR` or `.REC`, any case), find the other.
///
/// The companion is looked up with an upper-case extension first, then
/// lower-case.
pub fn locate_parrec_pair(path: &Path) -> Result<ParRecPair> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_uppercase())
        .unwrap_or_default();

    let (companion_ext, is_par) = match ext.as_str() {
        "PAR" => ("REC", true),
        "REC" => ("PAR", false),
        _ => {
            return Err(XnatKitError::validation(format!(
                "not a PAR/REC file: {}",
                path.display()
            )));
        }
    };

    if !path.is_file() {
        return Err(XnatKitError::validation(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let companion = [companion_ext.to_string(), companion_ext.to_lowercase()]
        .into_iter()
        .map(|e| path.with_extension(e))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            XnatKitError::validation(format!(
                "missing .{companion_ext} companion for {}",
                path.display()
            ))
        })?;

    let (par, rec) = if is_par {
        (path.to_path_buf(), companion)
    } else {
        (companion, path.to_path_buf())
    };
    Ok(ParRecPair { par, rec })
}
