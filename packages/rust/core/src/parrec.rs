//! `parrec` procedure: upload Philips PAR/REC recordings with optional
//! NIfTI conversion and QC snapshots.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use xnatkit_client::{ScanFields, XnatClient, paths};
use xnatkit_intake::par_files;
use xnatkit_mosaic::{MosaicFiles, MosaicOptions, load_volume, write_mosaic};
use xnatkit_parrec::{ConvertOptions, ConvertedFiles, ParHeader, convert, locate_parrec_pair};
use xnatkit_shared::{Result, UploadConfig, XnatKitError, normalize_parrec_name};

use crate::progress::ProgressReporter;
use crate::session::{require, tolerate};
use crate::upload::{
    OnExisting, ScanFile, ScanTarget, UploadSummary, ensure_scan, ensure_session, fields,
    require_scan, upload_scan_file,
};

#[derive(Debug, Clone)]
pub struct ParrecUploadOptions {
    pub project: String,
    /// Root of the tree searched for `.PAR` files.
    pub input: PathBuf,
    /// Also convert to NIfTI and upload the result.
    pub nifti: bool,
    /// Also build and upload mosaic snapshots.
    pub snapshots: bool,
    pub resources: UploadConfig,
}

/// Upload every PAR/REC pair found under `opts.input`.
#[instrument(skip_all, fields(project = %opts.project, input = %opts.input.display()))]
pub async fn upload_parrec(
    client: &XnatClient,
    opts: &ParrecUploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<UploadSummary> {
    progress.phase("Scanning input tree");
    let pars = par_files(&opts.input)?;
    require(
        client,
        &paths::project(&opts.project),
        &format!("project {}", opts.project),
    )
    .await?;
    info!(files = pars.len(), "PAR files found");

    progress.phase("Uploading PAR/REC scans");
    let mut summary = UploadSummary::default();
    for (index, par) in pars.iter().enumerate() {
        progress.item(&par.display().to_string(), index + 1, pars.len());
        upload_one(client, opts, par, &mut summary).await?;
        summary.sessions += 1;
    }

    progress.done(&format!(
        "{} PAR files, {} files uploaded, {} skipped",
        summary.sessions, summary.uploaded, summary.skipped
    ));
    Ok(summary)
}

async fn upload_one(
    client: &XnatClient,
    opts: &ParrecUploadOptions,
    par: &Path,
    summary: &mut UploadSummary,
) -> Result<()> {
    let header = ParHeader::from_file(par)?;
    let patient = header.patient_name().ok_or_else(|| {
        XnatKitError::validation(format!("no patient name in {}", par.display()))
    })?;
    let subject = normalize_parrec_name(patient);
    if subject.is_empty() {
        return Err(XnatKitError::validation(format!(
            "empty patient name in {}",
            par.display()
        )));
    }

    if !header.series_type().is_some_and(|s| s.contains("MR")) {
        return Err(XnatKitError::validation(format!(
            "{} is not an MR series",
            par.display()
        )));
    }
    let (date, time) = header.exam_date()?;
    let exam = header.exam_name().ok_or_else(|| {
        XnatKitError::validation(format!("no examination name in {}", par.display()))
    })?;
    let (scan_id, scan_fields) = scan_metadata(&header)?;

    let target = ScanTarget {
        project: opts.project.clone(),
        subject,
        session: normalize_parrec_name(exam),
        scan_id,
    };
    ensure_session(
        client,
        &target,
        &fields([
            ("xnat:mrSessionData/modality", "MR".to_string()),
            ("xnat:mrSessionData/date", date),
            ("xnat:mrSessionData/time", time),
        ]),
    )
    .await?;
    ensure_scan(client, &target, &scan_fields).await?;

    let uploaded = tolerate(
        upload_parrec_files(client, &target, par, &opts.resources.parrec_resource).await,
        "upload PAR/REC files",
    )?;
    tally(summary, uploaded);

    if opts.snapshots {
        let dir = temp_dir()?;
        match build_snapshot(par, dir.path()) {
            Ok(files) => {
                let uploaded = tolerate(
                    upload_snapshots(client, &target, &files, &opts.resources.snapshot_resource).await,
                    "upload snapshots",
                )?;
                tally(summary, uploaded);
            }
            Err(e) => warn!(par = %par.display(), error = %e, "snapshot not created"),
        }
    }

    if opts.nifti {
        let dir = temp_dir()?;
        let mut convert_opts = ConvertOptions::new(dir.path());
        convert_opts.overwrite = true;
        match convert(par, &convert_opts) {
            Ok(files) => {
                let uploaded = tolerate(
                    upload_converted(client, &target, &files, &opts.resources.nifti_resource).await,
                    "upload NIfTI files",
                )?;
                tally(summary, uploaded);
            }
            Err(e) => warn!(par = %par.display(), error = %e, "NIfTI conversion failed"),
        }
    }

    Ok(())
}

fn tally(summary: &mut UploadSummary, uploaded: Option<usize>) {
    match uploaded {
        Some(n) => summary.uploaded += n,
        None => summary.skipped += 1,
    }
}

fn temp_dir() -> Result<tempfile::TempDir> {
    tempfile::tempdir().map_err(|e| XnatKitError::io(std::env::temp_dir(), e))
}

// ---------------------------------------------------------------------------
// Scan metadata
// ---------------------------------------------------------------------------

/// Scan id (`acq_nr * 100 + 1`) and the `xnat:mrScanData` fields of a header.
pub fn scan_metadata(header: &ParHeader) -> Result<(String, ScanFields)> {
    let scan_id = (header.acq_nr()? * 100 + 1).to_string();
    let protocol = header
        .protocol_name()
        .ok_or_else(|| XnatKitError::parse("missing general info 'protocol_name'"))?;
    let fov = header.fov()?;
    let first = header.first_image()?;

    let mut scan = fields([
        ("xnat:mrScanData/modality", "MR".to_string()),
        ("xnat:mrScanData/series_description", protocol.to_string()),
        ("xnat:mrScanData/ID", scan_id.clone()),
        ("xnat:mrScanData/frames", header.images.len().to_string()),
        ("xnat:mrScanData/type", scan_type(protocol).to_string()),
        ("xnat:mrScanData/parameters/fov/x", (fov[0] as i64).to_string()),
        ("xnat:mrScanData/parameters/fov/y", (fov[1] as i64).to_string()),
        ("xnat:mrScanData/parameters/tr", header.repetition_time()?.to_string()),
        ("xnat:mrScanData/parameters/te", first.echo_time.to_string()),
        ("xnat:mrScanData/parameters/ti", first.inversion_delay.to_string()),
        ("xnat:mrScanData/parameters/flip", (first.flip_angle as i64).to_string()),
        ("quality", "usable".to_string()),
    ]);

    if let Some(orientations) = header.max_gradient_orient() {
        scan.push((
            "xnat:mrScanData/parameters/diffusion/orientations".into(),
            orientations.to_string(),
        ));
    }
    match header.voxel_size() {
        Ok([x, y, z]) => {
            for (axis, value) in [("x", x), ("y", y), ("z", z)] {
                scan.push((
                    format!("xnat:mrScanData/parameters/voxelRes/{axis}"),
                    value.to_string(),
                ));
            }
        }
        Err(e) => warn!(error = %e, "voxel resolution not available"),
    }

    Ok((scan_id, scan))
}

/// Scan type from a protocol name: the text after the first `WIP` marker
/// (up to a second one), else the whole name.
fn scan_type(protocol: &str) -> &str {
    let mut parts = protocol.split("WIP");
    let head = parts.next().unwrap_or_default();
    parts.next().unwrap_or(head).trim()
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// `{scan}.PAR` and `{scan}.REC` into the PAR/REC resource.
async fn upload_parrec_files(
    client: &XnatClient,
    target: &ScanTarget,
    par: &Path,
    resource: &str,
) -> Result<usize> {
    let pair = locate_parrec_pair(par)?;
    require_scan(client, target).await?;

    let mut uploaded = 0;
    for (local, ext) in [(pair.par, "PAR"), (pair.rec, "REC")] {
        let file = ScanFile {
            local,
            name: format!("{}.{ext}", target.scan_id),
            resource: resource.to_string(),
            format: "PARREC".into(),
            content: "RAW".into(),
        };
        if upload_scan_file(client, target, &file, OnExisting::Fail).await? {
            uploaded += 1;
        }
    }
    Ok(uploaded)
}

/// `{scan}.nii`, `{scan}.bval` and `{scan}.bvec` into the NIfTI resource.
async fn upload_converted(
    client: &XnatClient,
    target: &ScanTarget,
    files: &ConvertedFiles,
    resource: &str,
) -> Result<usize> {
    require_scan(client, target).await?;

    let outputs = [
        (Some(&files.nii), "nii"),
        (files.bval.as_ref(), "bval"),
        (files.bvec.as_ref(), "bvec"),
    ];
    let mut uploaded = 0;
    for (local, ext) in outputs {
        let Some(local) = local else { continue };
        let file = ScanFile {
            local: local.clone(),
            name: format!("{}.{ext}", target.scan_id),
            resource: resource.to_string(),
            format: "NIFTI".into(),
            content: "RAW".into(),
        };
        if upload_scan_file(client, target, &file, OnExisting::Fail).await? {
            uploaded += 1;
        }
    }
    Ok(uploaded)
}

/// Mosaic and thumbnail of the first volume, named after the PAR file.
fn build_snapshot(par: &Path, dir: &Path) -> Result<MosaicFiles> {
    let stem = par
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".into());
    let volume = load_volume(par)?;
    write_mosaic(
        &volume,
        &dir.join(format!("{stem}.png")),
        &MosaicOptions {
            columns: None,
            thumbnail: true,
        },
    )
}

/// `{scan}.png` and `{scan}_thumb.png` into the snapshot resource, created
/// on first use.
async fn upload_snapshots(
    client: &XnatClient,
    target: &ScanTarget,
    files: &MosaicFiles,
    resource: &str,
) -> Result<usize> {
    if client.resource_status(&target.scan_path()).await? == 404 {
        return Err(XnatKitError::xnat_status(
            404,
            format!("scan {} not found", target.scan_id),
        ));
    }

    let collection = target.resource_path(resource);
    if client.resource_status(&collection).await? == 404 {
        client
            .put(&collection, &[("format", "PNG"), ("content", resource)])
            .await?;
        info!(resource, scan = %target.scan_id, "snapshot collection created");
    }

    let mut images = vec![(files.original.clone(), format!("{}.png", target.scan_id), "ORIGINAL")];
    if let Some(thumbnail) = &files.thumbnail {
        images.push((
            thumbnail.clone(),
            format!("{}_thumb.png", target.scan_id),
            "THUMBNAIL",
        ));
    }

    let mut uploaded = 0;
    for (local, name, content) in images {
        let file = ScanFile {
            local,
            name,
            resource: resource.to_string(),
            format: "PNG".into(),
            content: content.into(),
        };
        if upload_scan_file(client, target, &file, OnExisting::Fail).await? {
            uploaded += 1;
        }
    }
    Ok(uploaded)
}
