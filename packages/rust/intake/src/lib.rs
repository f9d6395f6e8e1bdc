//! Local input discovery for xnatkit.
//!
//! Everything that happens before the first HTTP request: walking input
//! trees, deciding which files form a NIfTI session, deriving subject
//! labels, and reading session lists from CSV.

pub mod classify;
pub mod sessions_csv;
pub mod subject;
pub mod walk;

pub use classify::{NIFTI_EXTENSIONS, SessionFiles, classify_session, find_images};
pub use sessions_csv::{read_session_column, sniff_delimiter};
pub use subject::{SubjectSource, infer_subject_name};
pub use walk::{image_dirs, par_files};
