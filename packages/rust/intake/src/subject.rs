//! Subject label inference for NIfTI sessions.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use xnatkit_shared::{Result, ScanRole, XnatKitError, normalize_name};

use crate::classify::SessionFiles;

/// Where the subject label of a NIfTI session comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubjectSource {
    /// The session directory name, spaces normalized.
    #[default]
    Directory,
    /// The image file name with the role marker and underscores removed.
    FileName,
}

/// Derive the subject label for a classified session.
pub fn infer_subject_name(files: &SessionFiles, source: SubjectSource) -> Result<String> {
    let name = match source {
        SubjectSource::Directory => {
            let base = files
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            normalize_name(&base)
        }
        SubjectSource::FileName => {
            let (role, file) = [ScanRole::Dti, ScanRole::T1]
                .into_iter()
                .find_map(|role| files.file_name(role).map(|f| (role, f)))
                .ok_or_else(|| {
                    XnatKitError::validation(format!(
                        "no T1 or DTI image to derive a subject name from in {}",
                        files.root.display()
                    ))
                })?;
            strip_role(file, role)
        }
    };

    if name.is_empty() {
        return Err(XnatKitError::validation(format!(
            "subject name could not be derived for {}",
            files.root.display()
        )));
    }
    Ok(name)
}

/// `SUBJ01_DTI.nii` -> `SUBJ01`.
fn strip_role(file: &str, role: ScanRole) -> String {
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    static T1: LazyLock<Regex> = LazyLock::new(|| Regex::new("(?i)T1").expect("valid regex"));
    static DTI: LazyLock<Regex> = LazyLock::new(|| Regex::new("(?i)DTI").expect("valid regex"));

    let stripped = match role {
        ScanRole::T1 => T1.replace_all(&stem, ""),
        ScanRole::Dti => DTI.replace_all(&stem, ""),
        // Side files never name a subject.
        ScanRole::Bvec | ScanRole::Bval => stem.as_str().into(),
    };
    stripped.replace('_', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_session;

    fn session(root: &str, files: &[&str]) -> SessionFiles {
        let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
        classify_session(Path::new(root), &files).unwrap()
    }

    #[test]
    fn directory_name_is_normalized() {
        let files = session("/data/John Doe", &["scan_T1.nii"]);
        assert_eq!(
            infer_subject_name(&files, SubjectSource::Directory).unwrap(),
            "John_Doe"
        );
    }

    #[test]
    fn file_name_prefers_dti() {
        let files = session("/data/x", &["SUBJ_01_T1.nii", "SUBJ_02_dti.nii"]);
        assert_eq!(
            infer_subject_name(&files, SubjectSource::FileName).unwrap(),
            "SUBJ02"
        );
    }

    #[test]
    fn file_name_falls_back_to_t1() {
        let files = session("/data/x", &["AB_T1.nii"]);
        assert_eq!(infer_subject_name(&files, SubjectSource::FileName).unwrap(), "AB");
    }

    #[test]
    fn role_marker_is_removed_in_any_case() {
        assert_eq!(strip_role("p01_Dti_run2.nii", ScanRole::Dti), "p01run2");
        assert_eq!(strip_role("p01_t1.nii", ScanRole::T1), "p01");
        assert_eq!(strip_role("p01_T1_DTI.nii", ScanRole::T1), "p01DTI");
    }

    #[test]
    fn empty_name_is_an_error() {
        let files = session("/data/x", &["_T1_.nii"]);
        assert!(infer_subject_name(&files, SubjectSource::FileName).is_err());
    }
}
