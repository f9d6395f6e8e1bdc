//! `launch` procedure: queue a project pipeline for a list of sessions.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, instrument, warn};
use xnatkit_client::{XnatClient, paths};
use xnatkit_intake::read_session_column;
use xnatkit_shared::{Result, XnatKitError};

use crate::progress::ProgressReporter;
use crate::session::tolerate;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub project: String,
    /// Pipeline name as listed under the project.
    pub pipeline: String,
    /// CSV file listing the sessions.
    pub sessions_csv: PathBuf,
    /// Header of the CSV column holding session ids.
    pub column: String,
    /// Pause between two launches, to spare the pipeline engine.
    pub delay: Duration,
}

/// Counters of a launch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchSummary {
    pub launched: usize,
    /// Sessions absent from the archive.
    pub missing: usize,
    /// Launch requests the server rejected.
    pub failed: usize,
}

/// Launch `opts.pipeline` on every session of the CSV that exists in XNAT.
#[instrument(skip_all, fields(project = %opts.project, pipeline = %opts.pipeline))]
pub async fn launch_pipelines(
    client: &XnatClient,
    opts: &LaunchOptions,
    progress: &dyn ProgressReporter,
) -> Result<LaunchSummary> {
    if !opts.sessions_csv.is_file() {
        return Err(XnatKitError::validation(format!(
            "CSV file not found: {}",
            opts.sessions_csv.display()
        )));
    }

    progress.phase("Resolving pipeline");
    let projects = client.projects().await?;
    if !projects.iter().any(|p| p.id == opts.project) {
        return Err(XnatKitError::validation(format!(
            "project {} not found or not accessible",
            opts.project
        )));
    }
    let pipelines = client.project_pipelines(&opts.project).await?;
    if !pipelines.iter().any(|p| p.name == opts.pipeline) {
        return Err(XnatKitError::validation(format!(
            "pipeline {} not found in project {}",
            opts.pipeline, opts.project
        )));
    }
    let alias = client.pipeline_alias(&opts.project, &opts.pipeline).await?;
    info!(%alias, "pipeline alias resolved");

    let sessions = read_session_column(&opts.sessions_csv, &opts.column)?;
    info!(sessions = sessions.len(), "sessions listed");

    progress.phase("Launching");
    let mut summary = LaunchSummary::default();
    let mut pending_delay = false;
    for (index, session) in sessions.iter().enumerate() {
        progress.item(session, index + 1, sessions.len());

        if !client.exists(&paths::archive_experiment(session)).await? {
            warn!(session, "image session not found");
            summary.missing += 1;
            continue;
        }

        if pending_delay && !opts.delay.is_zero() {
            info!(secs = opts.delay.as_secs(), "waiting before the next launch");
            tokio::time::sleep(opts.delay).await;
        }
        match tolerate(
            client.launch_pipeline(&opts.project, &alias, session).await,
            "launch pipeline",
        )? {
            Some(_) => {
                info!(session, "pipeline launched");
                summary.launched += 1;
            }
            None => summary.failed += 1,
        }
        pending_delay = true;
    }

    progress.done(&format!(
        "{} launched, {} missing, {} failed",
        summary.launched, summary.missing, summary.failed
    ));
    Ok(summary)
}
