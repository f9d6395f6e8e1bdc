//! REST path builders for the XNAT `/data` hierarchy.
//!
//! All functions return host-relative paths; [`crate::XnatClient`] joins them
//! onto the configured host. Every label, id and file name is percent-encoded
//! as one segment, so `#`, `?`, `%` and `/` never leave it.

use url::form_urlencoded::byte_serialize;
use xnatkit_shared::EntityType;

/// Percent-encode `value` as a single path segment.
///
/// Form encoding writes a space as `+`, which a path would keep literally.
pub fn segment(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}

/// Comma-separated id list with each id encoded on its own.
fn id_list(ids: &str) -> String {
    ids.split(',').map(segment).collect::<Vec<_>>().join(",")
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session token endpoint (`POST` opens, `DELETE` closes).
pub const JSESSION: &str = "/data/JSESSION";

// ---------------------------------------------------------------------------
// Project hierarchy
// ---------------------------------------------------------------------------

pub fn projects() -> String {
    "/data/projects".to_string()
}

pub fn project(project: &str) -> String {
    format!("/data/projects/{}", segment(project))
}

pub fn subjects(project: &str) -> String {
    format!("{}/subjects", self::project(project))
}

pub fn subject(project: &str, subject: &str) -> String {
    format!("{}/subjects/{}", self::project(project), segment(subject))
}

pub fn subject_experiments(project: &str, subject: &str) -> String {
    format!("{}/experiments", self::subject(project, subject))
}

pub fn session(project: &str, subject: &str, session: &str) -> String {
    format!("{}/experiments/{}", self::subject(project, subject), segment(session))
}

pub fn scan(project: &str, subject: &str, session: &str, scan_id: &str) -> String {
    format!("{}/scans/{}", self::session(project, subject, session), segment(scan_id))
}

/// Resource collection of a scan.
pub fn scan_resource(
    project: &str,
    subject: &str,
    session: &str,
    scan_id: &str,
    label: &str,
) -> String {
    format!(
        "{}/resources/{}",
        self::scan(project, subject, session, scan_id),
        segment(label)
    )
}

/// A single file inside a scan resource collection.
pub fn scan_file(
    project: &str,
    subject: &str,
    session: &str,
    scan_id: &str,
    label: &str,
    name: &str,
) -> String {
    format!(
        "{}/files/{}",
        scan_resource(project, subject, session, scan_id, label),
        segment(name)
    )
}

// ---------------------------------------------------------------------------
// Flat entity addressing
// ---------------------------------------------------------------------------

/// `/data/{projects|subjects|experiments}/{id}`.
pub fn entity(kind: EntityType, id: &str) -> String {
    format!("/data/{kind}/{}", segment(id))
}

pub fn entity_resources(kind: EntityType, id: &str) -> String {
    format!("{}/resources", entity(kind, id))
}

pub fn entity_resource(kind: EntityType, id: &str, label: &str) -> String {
    format!("{}/{}", entity_resources(kind, id), segment(label))
}

/// Root of a resource collection's files, addressed by label or numeric id.
pub fn entity_resource_files(kind: EntityType, id: &str, collection: &str) -> String {
    format!("{}/files", entity_resource(kind, id, collection))
}

pub fn entity_resource_file(kind: EntityType, id: &str, collection: &str, name: &str) -> String {
    format!("{}/{}", entity_resource_files(kind, id, collection), segment(name))
}

/// A file put straight under an entity, left to its default collection.
pub fn entity_file(kind: EntityType, id: &str, name: &str) -> String {
    format!("{}/files/{}", entity(kind, id), segment(name))
}

// ---------------------------------------------------------------------------
// Experiments
// ---------------------------------------------------------------------------

pub fn project_experiments(project: &str) -> String {
    format!("{}/experiments", self::project(project))
}

pub fn experiment_scans(experiment: &str) -> String {
    format!("/data/experiments/{}/scans", segment(experiment))
}

pub fn experiment_reconstructions(experiment: &str) -> String {
    format!("/data/experiments/{}/reconstructions", segment(experiment))
}

pub fn reconstruction(experiment: &str, reconstruction: &str) -> String {
    format!(
        "{}/{}",
        experiment_reconstructions(experiment),
        segment(reconstruction)
    )
}

/// Zip archive of the files of `ids` (comma-separated, or `ALL`).
pub fn scan_files_zip(experiment: &str, ids: &str) -> String {
    format!("{}/{}/files", experiment_scans(experiment), id_list(ids))
}

pub fn reconstruction_files_zip(experiment: &str, ids: &str) -> String {
    format!("{}/{}/files", experiment_reconstructions(experiment), id_list(ids))
}

/// Deletion address of an experiment inside the project archive.
pub fn archive_session(project: &str, subject: &str, session: &str) -> String {
    format!(
        "{}/experiments/{}",
        archive_subject(project, subject),
        segment(session)
    )
}

/// Deletion address of a subject inside the project archive.
pub fn archive_subject(project: &str, subject: &str) -> String {
    format!(
        "/data/archive/projects/{}/subjects/{}",
        segment(project),
        segment(subject)
    )
}

pub fn archive_experiment(experiment: &str) -> String {
    format!("/data/archive/experiments/{}", segment(experiment))
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

pub fn project_pipelines(project: &str) -> String {
    format!("{}/pipelines", self::project(project))
}

pub fn archive_spec(project: &str) -> String {
    format!("{}/archive_spec", self::project(project))
}

pub fn launch_pipeline(project: &str, alias: &str, experiment: &str) -> String {
    format!(
        "{}/{}/experiments/{}",
        project_pipelines(project),
        segment(alias),
        segment(experiment)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_file_path() {
        assert_eq!(
            scan_file("P1", "S1", "S1", "101", "NIFTI", "101_T1.nii"),
            "/data/projects/P1/subjects/S1/experiments/S1/scans/101/resources/NIFTI/files/101_T1.nii"
        );
    }

    #[test]
    fn entity_paths() {
        assert_eq!(
            entity_resource(EntityType::Experiments, "E1", "QC"),
            "/data/experiments/E1/resources/QC"
        );
        assert_eq!(
            entity_resource_file(EntityType::Projects, "P1", "42", "a.zip"),
            "/data/projects/P1/resources/42/files/a.zip"
        );
    }

    #[test]
    fn cleanup_and_launch_paths() {
        assert_eq!(reconstruction("E1", "R1"), "/data/experiments/E1/reconstructions/R1");
        assert_eq!(
            archive_session("P1", "S1", "E1"),
            "/data/archive/projects/P1/subjects/S1/experiments/E1"
        );
        assert_eq!(
            launch_pipeline("P1", "step1", "E1"),
            "/data/projects/P1/pipelines/step1/experiments/E1"
        );
        assert_eq!(scan_files_zip("E1", "1,2"), "/data/experiments/E1/scans/1,2/files");
    }

    #[test]
    fn reserved_characters_stay_inside_their_segment() {
        assert_eq!(segment("Subj#7"), "Subj%237");
        assert_eq!(segment("a?b%c/d e"), "a%3Fb%25c%2Fd%20e");
        assert_eq!(segment("101_T1.nii"), "101_T1.nii");
        assert_eq!(
            session("P1", "Subj#7", "Subj#7"),
            "/data/projects/P1/subjects/Subj%237/experiments/Subj%237"
        );
        assert_eq!(
            entity_file(EntityType::Subjects, "S?1", "50%.zip"),
            "/data/subjects/S%3F1/files/50%25.zip"
        );
        assert_eq!(scan_files_zip("E#1", "1,2#"), "/data/experiments/E%231/scans/1,2%23/files");
    }
}
