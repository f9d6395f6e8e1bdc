//! Scan-level building blocks shared by the NIfTI and PAR/REC uploads.

use std::path::PathBuf;

use tracing::{info, warn};
use xnatkit_client::{ScanFields, XnatClient, paths};
use xnatkit_shared::{Result, XnatKitError};

use crate::session::{require, tolerate};

/// Counters of an upload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Session directories or PAR files processed.
    pub sessions: usize,
    pub uploaded: usize,
    /// Files already on the server, or whose upload failed on the server side.
    pub skipped: usize,
}

/// Address of one scan inside a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub project: String,
    pub subject: String,
    pub session: String,
    pub scan_id: String,
}

impl ScanTarget {
    pub fn scan_path(&self) -> String {
        paths::scan(&self.project, &self.subject, &self.session, &self.scan_id)
    }

    pub fn resource_path(&self, resource: &str) -> String {
        paths::scan_resource(
            &self.project,
            &self.subject,
            &self.session,
            &self.scan_id,
            resource,
        )
    }

    pub fn file_path(&self, resource: &str, name: &str) -> String {
        paths::scan_file(
            &self.project,
            &self.subject,
            &self.session,
            &self.scan_id,
            resource,
            name,
        )
    }
}

/// A local file and where it goes inside a scan.
#[derive(Debug, Clone)]
pub struct ScanFile {
    pub local: PathBuf,
    /// Name on the server.
    pub name: String,
    pub resource: String,
    pub format: String,
    pub content: String,
}

/// What to do when the target file already exists on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExisting {
    /// Log a warning and leave the server copy alone.
    Skip,
    /// Fail with an XNAT error.
    Fail,
}

/// Upload one file unless it already exists. Returns whether a `PUT` was sent.
pub async fn upload_scan_file(
    client: &XnatClient,
    target: &ScanTarget,
    file: &ScanFile,
    on_existing: OnExisting,
) -> Result<bool> {
    let path = target.file_path(&file.resource, &file.name);
    if client.exists(&path).await? {
        return match on_existing {
            OnExisting::Skip => {
                warn!(name = %file.name, scan = %target.scan_id, "file already exists in XNAT, skipping");
                Ok(false)
            }
            OnExisting::Fail => Err(XnatKitError::xnat(format!(
                "file {} already exists in scan {}",
                file.name, target.scan_id
            ))),
        };
    }

    client
        .put_file(
            &path,
            &file.local,
            &[("format", file.format.as_str()), ("content", file.content.as_str())],
        )
        .await?;
    info!(name = %file.name, scan = %target.scan_id, "file uploaded");
    Ok(true)
}

/// Fail unless the scan answers 200.
pub async fn require_scan(client: &XnatClient, target: &ScanTarget) -> Result<()> {
    require(client, &target.scan_path(), &format!("scan {}", target.scan_id)).await
}

/// Best-effort creation of the subject, then the session of `target`.
///
/// Each step only warns on XNAT errors so a later step still gets its try.
pub async fn ensure_session(
    client: &XnatClient,
    target: &ScanTarget,
    session_fields: &[(String, String)],
) -> Result<()> {
    let created = tolerate(
        client.add_subject(&target.project, &target.subject).await,
        "create subject",
    )?;
    if created == Some(201) {
        info!(subject = %target.subject, "subject created");
    }

    let created = tolerate(
        client
            .add_session(&target.project, &target.subject, &target.session, session_fields)
            .await,
        "create session",
    )?;
    if created == Some(201) {
        info!(session = %target.session, "session created");
    }
    Ok(())
}

/// Best-effort creation of one scan.
pub async fn ensure_scan(client: &XnatClient, target: &ScanTarget, fields: &ScanFields) -> Result<()> {
    let created = tolerate(
        client
            .add_scan(
                &target.project,
                &target.subject,
                &target.session,
                &target.scan_id,
                fields,
            )
            .await,
        "create scan",
    )?;
    if created.is_some() {
        info!(scan = %target.scan_id, "scan created");
    }
    Ok(())
}

/// `(key, value)` pairs as owned strings.
pub(crate) fn fields<const N: usize>(pairs: [(&str, String); N]) -> ScanFields {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
