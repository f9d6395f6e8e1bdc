//! File-role classification for NIfTI session directories.
//!
//! NIfTI exports carry no usable provenance, so the role of each file is
//! read off its name: `*T1*.nii`, `*DTI*.nii`, `*.bvec`, `*.bval`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;
use xnatkit_shared::{Result, ScanRole, XnatKitError};

/// Extensions picked up when scanning a directory for NIfTI sessions.
pub const NIFTI_EXTENSIONS: [&str; 3] = [".nii", ".bvec", ".bval"];

// ---------------------------------------------------------------------------
// SessionFiles
// ---------------------------------------------------------------------------

/// The classified files of one session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFiles {
    /// Directory holding the files.
    pub root: PathBuf,
    /// Role -> file name (relative to `root`).
    pub roles: BTreeMap<ScanRole, String>,
}

impl SessionFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            roles: BTreeMap::new(),
        }
    }

    pub fn has(&self, role: ScanRole) -> bool {
        self.roles.contains_key(&role)
    }

    pub fn file_name(&self, role: ScanRole) -> Option<&str> {
        self.roles.get(&role).map(String::as_str)
    }

    /// Full path of the file holding `role`.
    pub fn path(&self, role: ScanRole) -> Option<PathBuf> {
        self.file_name(role).map(|name| self.root.join(name))
    }

    /// Claim `role` for `file` unless already taken. Returns whether it was claimed.
    fn claim(&mut self, role: ScanRole, file: &str) -> bool {
        if self.has(role) {
            warn!(
                dir = %self.root.display(),
                %file,
                %role,
                "duplicate file for role, ignoring"
            );
            return false;
        }
        self.roles.insert(role, file.to_string());
        true
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// List regular files directly inside `dir` whose lower-cased name ends
/// with one of `extensions`. Sorted by name.
pub fn find_images(dir: &Path, extensions: &[&str]) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| XnatKitError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| XnatKitError::io(dir, e))?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let lower = name.to_lowercase();
        if extensions.iter().any(|ext| lower.ends_with(ext)) {
            files.push(name);
        }
    }

    files.sort();
    Ok(files)
}

/// Assign a [`ScanRole`] to every file of one session directory.
///
/// Fails on a `.nii` whose name names neither T1 nor DTI, on any other
/// extension, and on diffusion side files without their DTI image.
pub fn classify_session(root: &Path, files: &[String]) -> Result<SessionFiles> {
    let mut session = SessionFiles::new(root);

    for file in files {
        let upper = file.to_uppercase();
        match extension(file).as_deref() {
            Some("nii") => {
                let role = if upper.contains("T1") {
                    ScanRole::T1
                } else if upper.contains("DTI") {
                    ScanRole::Dti
                } else {
                    return Err(XnatKitError::validation(format!(
                        "unknown NIfTI subtype (expected T1 or DTI in the name): {}",
                        root.join(file).display()
                    )));
                };
                session.claim(role, file);
            }
            Some("bvec") => {
                session.claim(ScanRole::Bvec, file);
            }
            Some("bval") => {
                session.claim(ScanRole::Bval, file);
            }
            _ => {
                return Err(XnatKitError::validation(format!(
                    "unexpected file in session directory: {}",
                    root.join(file).display()
                )));
            }
        }
    }

    let has_side_files = session.has(ScanRole::Bvec) || session.has(ScanRole::Bval);
    if has_side_files && !session.has(ScanRole::Dti) {
        return Err(XnatKitError::validation(format!(
            "BVEC/BVAL files present without a DTI scan in {}",
            root.display()
        )));
    }
    if session.has(ScanRole::Dti) && !(session.has(ScanRole::Bvec) && session.has(ScanRole::Bval)) {
        warn!(dir = %root.display(), "DTI scan without BVEC/BVAL files");
    }

    Ok(session)
}

/// Lower-cased extension without the dot.
fn extension(file: &str) -> Option<String> {
    Path::new(file)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}
