//! `download` procedure: fetch scan and reconstruction files of every MR
//! session in a project.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use xnatkit_client::{XnatClient, paths};
use xnatkit_shared::{ExperimentRecord, Result, XnatKitError};

use crate::progress::ProgressReporter;
use crate::session::tolerate;

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub project: String,
    /// Existing directory receiving the files.
    pub outdir: PathBuf,
    pub scans: bool,
    pub recons: bool,
    /// Case-insensitive substring a scan type must contain.
    pub filter: Option<String>,
    /// Put each session under `<outdir>/<subject_label>/`.
    pub rich_filepath: bool,
}

impl DownloadOptions {
    /// Neither scans nor reconstructions were asked for.
    pub fn requests_nothing(&self) -> bool {
        !self.scans && !self.recons
    }
}

/// Counters of a download run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub sessions: usize,
    /// Archives fetched and extracted.
    pub archives: usize,
    /// Downloads the server refused.
    pub failed: usize,
}

/// Which collection of an experiment an archive comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Scans,
    Reconstructions,
}

impl Collection {
    fn path(self, experiment: &str, ids: &str) -> String {
        match self {
            Self::Scans => paths::scan_files_zip(experiment, ids),
            Self::Reconstructions => paths::reconstruction_files_zip(experiment, ids),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Scans => "scans",
            Self::Reconstructions => "reconstructions",
        }
    }
}

/// Download the requested collections of every MR session of `opts.project`.
#[instrument(skip_all, fields(project = %opts.project, outdir = %opts.outdir.display()))]
pub async fn download_project(
    client: &XnatClient,
    opts: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<DownloadSummary> {
    let mut summary = DownloadSummary::default();
    if opts.requests_nothing() {
        info!("nothing to download");
        return Ok(summary);
    }
    if !opts.outdir.is_dir() {
        return Err(XnatKitError::validation(format!(
            "output directory not found: {}",
            opts.outdir.display()
        )));
    }

    progress.phase("Listing sessions");
    let experiments = client.mr_sessions(&opts.project).await?;
    info!(sessions = experiments.len(), "MR sessions listed");

    progress.phase("Downloading");
    for (index, experiment) in experiments.iter().enumerate() {
        progress.item(&experiment.label, index + 1, experiments.len());
        let dest = session_dir(opts, experiment)?;

        if opts.scans {
            if let Some(ids) = tolerate(scan_ids(client, experiment, opts).await, "list scans")? {
                match ids {
                    Some(ids) => {
                        fetch(client, experiment, Collection::Scans, &ids, &dest, &mut summary)
                            .await?
                    }
                    None => info!(session = %experiment.label, "no scan matches the filter"),
                }
            } else {
                summary.failed += 1;
            }
        }
        if opts.recons {
            fetch(client, experiment, Collection::Reconstructions, "ALL", &dest, &mut summary).await?;
        }
        summary.sessions += 1;
    }

    progress.done(&format!(
        "{} sessions, {} archives extracted, {} failed",
        summary.sessions, summary.archives, summary.failed
    ));
    Ok(summary)
}

fn session_dir(opts: &DownloadOptions, experiment: &ExperimentRecord) -> Result<PathBuf> {
    if !opts.rich_filepath {
        return Ok(opts.outdir.clone());
    }
    let dir = opts.outdir.join(&experiment.subject_label);
    std::fs::create_dir_all(&dir).map_err(|e| XnatKitError::io(&dir, e))?;
    Ok(dir)
}

/// Scan ids to fetch: `ALL` without a filter, the matching ids joined by
/// commas with one, `None` when the filter matches nothing.
async fn scan_ids(
    client: &XnatClient,
    experiment: &ExperimentRecord,
    opts: &DownloadOptions,
) -> Result<Option<String>> {
    let Some(filter) = &opts.filter else {
        return Ok(Some("ALL".into()));
    };
    let filter = filter.to_lowercase();
    let ids: Vec<String> = client
        .scans(&experiment.id)
        .await?
        .into_iter()
        .filter(|s| s.kind.to_lowercase().contains(&filter))
        .map(|s| s.id)
        .collect();
    Ok((!ids.is_empty()).then(|| ids.join(",")))
}

async fn fetch(
    client: &XnatClient,
    experiment: &ExperimentRecord,
    collection: Collection,
    ids: &str,
    dest: &Path,
    summary: &mut DownloadSummary,
) -> Result<()> {
    let temp = tempfile::NamedTempFile::new()
        .map_err(|e| XnatKitError::io(std::env::temp_dir(), e))?;
    let path = collection.path(&experiment.id, ids);

    let downloaded = tolerate(
        client.download(&path, &[("format", "zip")], temp.path()).await,
        "download archive",
    )?;
    let Some(bytes) = downloaded else {
        warn!(session = %experiment.label, collection = collection.as_str(), "download failed");
        summary.failed += 1;
        return Ok(());
    };
    debug!(bytes, "archive received");

    extract_zip(temp.path(), dest)?;
    info!(session = %experiment.label, collection = collection.as_str(), dest = %dest.display(), "archive extracted");
    summary.archives += 1;
    Ok(())
}

/// Unpack `archive` into `dest`, keeping its directory structure.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| XnatKitError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| XnatKitError::parse(format!("{} is not a zip archive: {e}", archive.display())))?;
    zip.extract(dest)
        .map_err(|e| XnatKitError::parse(format!("extracting into {}: {e}", dest.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xnatkit_client::ClientOptions;
    use zip::write::SimpleFileOptions;

    fn client_for(server: &MockServer) -> XnatClient {
        XnatClient::new(&ClientOptions::new(server.uri(), "jdoe", "secret")).unwrap()
    }

    fn zip_bytes(name: &str, content: &[u8]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
        zip.finish().unwrap().into_inner()
    }

    async fn mount_sessions(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/data/projects/P1/experiments"))
            .and(query_param("xsiType", "xnat:mrSessionData"))
            .and(query_param("columns", "subject_label,label"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultSet": { "Result": [
                    { "xnat:mrsessiondata/id": "E1", "label": "s1_mr", "subject_label": "s1" },
                ] }
            })))
            .mount(server)
            .await;
    }

    fn options(outdir: &Path) -> DownloadOptions {
        DownloadOptions {
            project: "P1".into(),
            outdir: outdir.to_path_buf(),
            scans: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn nothing_requested_sends_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let opts = DownloadOptions {
            project: "P1".into(),
            outdir: PathBuf::from("/does/not/matter"),
            ..Default::default()
        };
        let summary = download_project(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary, DownloadSummary::default());
    }

    #[tokio::test]
    async fn filtered_scans_land_under_the_subject() {
        let server = MockServer::start().await;
        mount_sessions(&server).await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/scans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultSet": { "Result": [
                    { "ID": "101", "type": "T1W_3D" },
                    { "ID": "201", "type": "DTI_32dir" },
                    { "ID": "301", "type": "t1w_post" },
                ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/scans/101,301/files"))
            .and(query_param("format", "zip"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(zip_bytes("101/t1.nii", b"nifti")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let out = tempfile::tempdir().unwrap();
        let mut opts = options(out.path());
        opts.filter = Some("T1w".into());
        opts.rich_filepath = true;
        let summary = download_project(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.archives, 1);
        assert_eq!(
            std::fs::read(out.path().join("s1/101/t1.nii")).unwrap(),
            b"nifti"
        );
    }

    #[tokio::test]
    async fn empty_filter_result_skips_the_session() {
        let server = MockServer::start().await;
        mount_sessions(&server).await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/scans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultSet": { "Result": [{ "ID": "101", "type": "T1W_3D" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/scans/ALL/files"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let out = tempfile::tempdir().unwrap();
        let mut opts = options(out.path());
        opts.filter = Some("flair".into());
        let summary = download_project(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.archives, 0);
    }

    #[tokio::test]
    async fn refused_reconstructions_are_counted_not_fatal() {
        let server = MockServer::start().await;
        mount_sessions(&server).await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/scans/ALL/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(zip_bytes("101/raw.dcm", b"dicom")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/experiments/E1/reconstructions/ALL/files"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let out = tempfile::tempdir().unwrap();
        let mut opts = options(out.path());
        opts.recons = true;
        let summary = download_project(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.archives, 1);
        assert_eq!(summary.failed, 1);
        assert!(out.path().join("101/raw.dcm").is_file());
    }

    #[tokio::test]
    async fn missing_output_directory_is_rejected() {
        let server = MockServer::start().await;
        let out = tempfile::tempdir().unwrap();
        let opts = options(&out.path().join("missing"));
        let err = download_project(&client_for(&server), &opts, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, XnatKitError::Validation { .. }));
    }
}
