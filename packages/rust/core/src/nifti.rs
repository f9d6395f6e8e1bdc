//! `nifti` procedure: upload a tree of NIfTI session directories.

use std::path::PathBuf;

use tracing::{info, instrument};
use xnatkit_client::{ScanFields, XnatClient, paths};
use xnatkit_intake::{
    NIFTI_EXTENSIONS, SessionFiles, SubjectSource, classify_session, image_dirs,
    infer_subject_name,
};
use xnatkit_shared::{Result, ScanRole};

use crate::progress::ProgressReporter;
use crate::session::{require, tolerate};
use crate::upload::{
    OnExisting, ScanFile, ScanTarget, UploadSummary, ensure_scan, ensure_session, fields,
    upload_scan_file,
};

#[derive(Debug, Clone)]
pub struct NiftiUploadOptions {
    pub project: String,
    /// Root of the tree holding one directory per session.
    pub input: PathBuf,
    pub subject_source: SubjectSource,
    /// Scan resource receiving the files.
    pub resource: String,
}

/// One scan to create and the files it receives.
#[derive(Debug, Clone)]
struct PlannedScan {
    scan_id: String,
    role: ScanRole,
    files: Vec<ScanFile>,
}

/// Upload every session directory found under `opts.input`.
#[instrument(skip_all, fields(project = %opts.project, input = %opts.input.display()))]
pub async fn upload_nifti(
    client: &XnatClient,
    opts: &NiftiUploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<UploadSummary> {
    progress.phase("Scanning input tree");
    let dirs = image_dirs(&opts.input, &NIFTI_EXTENSIONS)?;
    require(
        client,
        &paths::project(&opts.project),
        &format!("project {}", opts.project),
    )
    .await?;
    info!(sessions = dirs.len(), "session directories found");

    progress.phase("Uploading sessions");
    let mut summary = UploadSummary::default();
    for (index, (dir, files)) in dirs.iter().enumerate() {
        progress.item(&dir.display().to_string(), index + 1, dirs.len());

        let session = classify_session(dir, files)?;
        let subject = infer_subject_name(&session, opts.subject_source)?;
        let mut target = ScanTarget {
            project: opts.project.clone(),
            subject: subject.clone(),
            // One session per subject, labelled after it.
            session: subject,
            scan_id: String::new(),
        };

        ensure_session(
            client,
            &target,
            &fields([("xnat:mrSessionData/modality", "MR".to_string())]),
        )
        .await?;

        for scan in plan_scans(&session, &opts.resource) {
            target.scan_id = scan.scan_id.clone();
            ensure_scan(client, &target, &scan_fields(&scan)).await?;

            for file in &scan.files {
                match tolerate(
                    upload_scan_file(client, &target, file, OnExisting::Skip).await,
                    "upload file",
                )? {
                    Some(true) => summary.uploaded += 1,
                    _ => summary.skipped += 1,
                }
            }
        }
        summary.sessions += 1;
    }

    progress.done(&format!(
        "{} sessions, {} files uploaded, {} skipped",
        summary.sessions, summary.uploaded, summary.skipped
    ));
    Ok(summary)
}

/// T1 becomes scan 101; DTI is 101 too, or 201 next to a T1. BVEC and BVAL
/// go with the DTI scan.
fn plan_scans(session: &SessionFiles, resource: &str) -> Vec<PlannedScan> {
    let mut scans = Vec::new();

    if session.has(ScanRole::T1) {
        let scan_id = "101".to_string();
        let files = scan_files(session, &scan_id, ScanRole::T1, &[ScanRole::T1], resource);
        scans.push(PlannedScan {
            scan_id,
            role: ScanRole::T1,
            files,
        });
    }

    if session.has(ScanRole::Dti) {
        let scan_id = if session.has(ScanRole::T1) { "201" } else { "101" }.to_string();
        let files = scan_files(
            session,
            &scan_id,
            ScanRole::Dti,
            &[ScanRole::Dti, ScanRole::Bvec, ScanRole::Bval],
            resource,
        );
        scans.push(PlannedScan {
            scan_id,
            role: ScanRole::Dti,
            files,
        });
    }

    scans
}

/// Files of `roles` renamed `{scan_id}_{SCAN_ROLE}.{ext}`.
fn scan_files(
    session: &SessionFiles,
    scan_id: &str,
    scan_role: ScanRole,
    roles: &[ScanRole],
    resource: &str,
) -> Vec<ScanFile> {
    roles
        .iter()
        .filter_map(|&role| {
            let local = session.path(role)?;
            let ext = local
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let format = if role.is_image() { "NIFTI" } else { role.as_str() };
            Some(ScanFile {
                local,
                name: format!("{scan_id}_{}.{ext}", scan_role.as_str()),
                resource: resource.to_string(),
                format: format.to_string(),
                content: "RAW".to_string(),
            })
        })
        .collect()
}

fn scan_fields(scan: &PlannedScan) -> ScanFields {
    let role = scan.role.as_str().to_string();
    fields([
        ("xnat:mrScanData/series_description", role.clone()),
        ("xnat:mrScanData/type", role),
        ("xnat:mrScanData/ID", scan.scan_id.clone()),
        ("xnat:mrScanData/modality", "MR".to_string()),
        ("quality", "usable".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xnatkit_client::ClientOptions;

    const SCAN: &str = "/data/projects/P1/subjects/John_Doe/experiments/John_Doe/scans/101";

    fn session_tree(names: &[&str]) -> tempfile::TempDir {
        session_tree_named("John Doe", names)
    }

    fn session_tree_named(dir_name: &str, names: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(dir_name);
        std::fs::create_dir(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), b"nifti").unwrap();
        }
        root
    }

    fn options(root: &tempfile::TempDir) -> NiftiUploadOptions {
        NiftiUploadOptions {
            project: "P1".into(),
            input: root.path().to_path_buf(),
            subject_source: SubjectSource::Directory,
            resource: "NIFTI".into(),
        }
    }

    async fn mount_project(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/data/projects/P1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    async fn mount_hierarchy(server: &MockServer) {
        mount_project(server).await;
        Mock::given(method("PUT"))
            .and(path("/data/projects/P1/subjects/John_Doe"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/data/projects/P1/subjects/John_Doe/experiments/John_Doe"))
            .and(query_param("xnat:mrSessionData/modality", "MR"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path(SCAN))
            .and(query_param("xnat:mrScanData/type", "T1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer) -> XnatClient {
        XnatClient::new(&ClientOptions::new(server.uri(), "jdoe", "secret")).unwrap()
    }

    #[tokio::test]
    async fn existing_file_is_not_uploaded_again() {
        let server = MockServer::start().await;
        mount_hierarchy(&server).await;
        let file = format!("{SCAN}/resources/NIFTI/files/101_T1.nii");
        Mock::given(method("GET"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let root = session_tree(&["JD_T1.nii"]);
        let summary = upload_nifti(&client_for(&server), &options(&root), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn missing_file_is_uploaded_with_format() {
        let server = MockServer::start().await;
        mount_hierarchy(&server).await;
        let file = format!("{SCAN}/resources/NIFTI/files/101_T1.nii");
        Mock::given(method("GET"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(file.as_str()))
            .and(query_param("format", "NIFTI"))
            .and(query_param("content", "RAW"))
            .and(query_param("inbody", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let root = session_tree(&["JD_T1.nii"]);
        let summary = upload_nifti(&client_for(&server), &options(&root), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 1);
    }

    #[tokio::test]
    async fn server_errors_on_creation_do_not_stop_the_upload() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        Mock::given(method("PUT"))
            .and(path("/data/projects/P1/subjects/John_Doe"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let file = format!("{SCAN}/resources/NIFTI/files/101_T1.nii");
        Mock::given(method("PUT"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // Session and scan PUTs hit no mock and get 404; both are warnings.
        let root = session_tree(&["JD_T1.nii"]);
        let summary = upload_nifti(&client_for(&server), &options(&root), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 1);
    }

    #[tokio::test]
    async fn orphan_bvec_aborts_the_run() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        let root = session_tree(&["JD.bvec"]);
        let err = upload_nifti(&client_for(&server), &options(&root), &SilentProgress)
            .await
            .unwrap_err();
        assert!(!err.is_xnat());
    }

    #[tokio::test]
    async fn unknown_project_aborts_before_any_put() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/projects/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let root = session_tree(&["JD_T1.nii"]);
        let mut opts = options(&root);
        opts.project = "NOPE".into();
        let err = upload_nifti(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.is_xnat());
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn reserved_characters_in_labels_are_escaped() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        let session = "/data/projects/P1/subjects/Subj%237/experiments/Subj%237";
        let scan = format!("{session}/scans/101");
        for (url, status) in [
            ("/data/projects/P1/subjects/Subj%237", 201),
            (session, 201),
            (scan.as_str(), 200),
        ] {
            Mock::given(method("PUT"))
                .and(path(url))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;
        }
        let file = format!("{scan}/resources/NIFTI/files/101_T1.nii");
        Mock::given(method("GET"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(file.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/data/projects/P1/subjects/Subj"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let root = session_tree_named("Subj#7", &["S7_T1.nii"]);
        let summary = upload_nifti(&client_for(&server), &options(&root), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 1);
    }

    #[test]
    fn dti_next_to_t1_becomes_scan_201() {
        let mut session = SessionFiles::new("/data/s1");
        session.roles.insert(ScanRole::T1, "s1_T1.nii".into());
        session.roles.insert(ScanRole::Dti, "s1_DTI.nii".into());
        session.roles.insert(ScanRole::Bvec, "s1_DTI.bvec".into());
        session.roles.insert(ScanRole::Bval, "s1_DTI.bval".into());

        let scans = plan_scans(&session, "NIFTI");
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].scan_id, "101");
        assert_eq!(scans[1].scan_id, "201");

        let names: Vec<_> = scans[1].files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["201_DTI.nii", "201_DTI.bvec", "201_DTI.bval"]);
        let formats: Vec<_> = scans[1].files.iter().map(|f| f.format.as_str()).collect();
        assert_eq!(formats, ["NIFTI", "BVEC", "BVAL"]);
    }

    #[test]
    fn lone_dti_is_scan_101() {
        let mut session = SessionFiles::new("/data/s1");
        session.roles.insert(ScanRole::Dti, "s1_DTI.nii".into());
        let scans = plan_scans(&session, "NIFTI");
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_id, "101");
        assert_eq!(scans[0].files[0].name, "101_DTI.nii");
    }
}
