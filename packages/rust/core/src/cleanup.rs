//! `cleanup` procedure: sweep reconstructions, sessions and subjects out of
//! a project, optionally sparing recent entries.

use chrono::{Duration, Local, NaiveDateTime};
use tracing::{info, instrument, warn};
use xnatkit_client::{XnatClient, paths};
use xnatkit_shared::{Result, SessionRecord, SubjectRecord, parse_insert_date};

use crate::progress::ProgressReporter;
use crate::session::{require, tolerate};

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub project: String,
    /// Entries inserted within this many days are left alone.
    pub days_preserved: Option<u32>,
    /// Only delete reconstructions; sessions and subjects stay.
    pub keep_originals: bool,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub reconstructions: usize,
    pub sessions: usize,
    pub subjects: usize,
    /// Sessions spared by the age filter.
    pub preserved: usize,
}

/// Delete derived and original data of `opts.project`.
///
/// There is no dry run: everything not preserved is removed.
#[instrument(skip_all, fields(project = %opts.project))]
pub async fn cleanup_project(
    client: &XnatClient,
    opts: &CleanupOptions,
    progress: &dyn ProgressReporter,
) -> Result<CleanupSummary> {
    let threshold = opts
        .days_preserved
        .map(|days| Local::now().naive_local() - Duration::days(i64::from(days)));
    if let Some(threshold) = threshold {
        info!(%threshold, "entries inserted after the threshold are preserved");
    }

    require(
        client,
        &paths::project(&opts.project),
        &format!("project {}", opts.project),
    )
    .await?;

    progress.phase("Listing subjects");
    let subjects = client.subjects(&opts.project).await?;

    progress.phase("Deleting");
    let mut summary = CleanupSummary::default();
    for (index, subject) in subjects.iter().enumerate() {
        progress.item(&subject.label, index + 1, subjects.len());
        sweep_subject(client, opts, subject, threshold, &mut summary).await?;
    }

    progress.done(&format!(
        "{} reconstructions, {} sessions and {} subjects deleted, {} sessions preserved",
        summary.reconstructions, summary.sessions, summary.subjects, summary.preserved
    ));
    Ok(summary)
}

async fn sweep_subject(
    client: &XnatClient,
    opts: &CleanupOptions,
    subject: &SubjectRecord,
    threshold: Option<NaiveDateTime>,
    summary: &mut CleanupSummary,
) -> Result<()> {
    let Some(sessions) = tolerate(
        client.image_sessions(&opts.project, &subject.id).await,
        "list sessions",
    )?
    else {
        return Ok(());
    };

    let mut remaining = 0;
    for session in &sessions {
        if is_preserved(session.insert_date.as_deref(), threshold) {
            info!(session = %session.label, "session preserved");
            summary.preserved += 1;
            remaining += 1;
            continue;
        }
        if !sweep_session(client, opts, subject, session, summary).await? {
            remaining += 1;
        }
    }

    if opts.keep_originals || remaining > 0 {
        return Ok(());
    }
    if is_preserved(subject.insert_date.as_deref(), threshold) {
        info!(subject = %subject.label, "subject preserved");
        return Ok(());
    }
    if tolerate(
        client.delete_subject(&opts.project, &subject.id).await,
        "delete subject",
    )?
    .is_some()
    {
        info!(subject = %subject.label, "subject deleted");
        summary.subjects += 1;
    }
    Ok(())
}

/// Delete the reconstructions of a session, then the session itself unless
/// originals are kept. Returns whether the session is gone.
async fn sweep_session(
    client: &XnatClient,
    opts: &CleanupOptions,
    subject: &SubjectRecord,
    session: &SessionRecord,
    summary: &mut CleanupSummary,
) -> Result<bool> {
    if let Some(recons) = tolerate(
        client.reconstructions(&session.id).await,
        "list reconstructions",
    )? {
        for recon in recons {
            if tolerate(
                client.delete_reconstruction(&session.id, &recon.id).await,
                "delete reconstruction",
            )?
            .is_some()
            {
                info!(session = %session.label, reconstruction = %recon.id, "reconstruction deleted");
                summary.reconstructions += 1;
            }
        }
    }

    if opts.keep_originals {
        return Ok(false);
    }
    let deleted = tolerate(
        client
            .delete_session(&opts.project, &subject.id, &session.id)
            .await,
        "delete session",
    )?
    .is_some();
    if deleted {
        info!(session = %session.label, "session deleted");
        summary.sessions += 1;
    }
    Ok(deleted)
}

/// Whether an entry inserted at `insert_date` is spared by `threshold`.
///
/// Without a threshold nothing is preserved. With one, entries inserted at
/// or after it are preserved, and so are entries whose date is missing or
/// unreadable.
pub fn is_preserved(insert_date: Option<&str>, threshold: Option<NaiveDateTime>) -> bool {
    let Some(threshold) = threshold else {
        return false;
    };
    match insert_date.map(parse_insert_date) {
        Some(Ok(inserted)) => inserted >= threshold,
        Some(Err(e)) => {
            warn!(error = %e, "unreadable insert date, preserving");
            true
        }
        None => true,
    }
}
