//! PAR/REC -> NIfTI-1 conversion.

use std::path::{Path, PathBuf};

use ndarray::{Array4, Axis};
use nifti::NiftiHeader;
use nifti::writer::WriterOptions;
use tracing::{debug, info, instrument, warn};
use xnatkit_shared::{Result, XnatKitError};

use crate::affine::{self, Affine};
use crate::header::ParHeader;
use crate::pair::locate_parrec_pair;
use crate::rec::read_rec;

pub use crate::affine::Origin;

/// Gyromagnetic ratio of hydrogen in MHz/T.
const GYROMAGNETIC_RATIO: f64 = 42.576;

/// Water-fat chemical shift in ppm.
const PROTON_WATER_FAT_SHIFT: f64 = 3.4;

/// NIfTI `xyzt_units`: millimetres and seconds.
const UNITS_MM_SEC: u8 = 2 | 8;

/// NIfTI `sform_code` for scanner-based coordinates.
const XFORM_SCANNER_ANAT: i16 = 1;

// ---------------------------------------------------------------------------
// Options and outputs
// ---------------------------------------------------------------------------

/// Conversion settings.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory the outputs are written to.
    pub outdir: PathBuf,
    /// Write `.nii.gz` instead of `.nii`.
    pub compressed: bool,
    pub origin: Origin,
    /// Write `.bval` / `.bvec` for diffusion series.
    pub write_bvs: bool,
    /// Keep the scanner-computed isotropic trace volume of DTI series.
    pub keep_trace: bool,
    /// Main field strength in tesla; the dwell time is written only when set.
    pub field_strength: Option<f64>,
    /// Replace existing outputs.
    pub overwrite: bool,
}

impl ConvertOptions {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
            compressed: false,
            origin: Origin::Scanner,
            write_bvs: true,
            keep_trace: false,
            field_strength: None,
            overwrite: false,
        }
    }
}

/// Files produced by [`convert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFiles {
    pub nii: PathBuf,
    pub bval: Option<PathBuf>,
    pub bvec: Option<PathBuf>,
    pub dwell_time: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a PAR/REC pair to NIfTI.
///
/// Stored values are written unscaled (`scl_slope = 1`, `scl_inter = 0`)
/// and the volume is reoriented to LAS+ when needed.
#[instrument(skip_all, fields(par = %par.display()))]
pub fn convert(par: &Path, opts: &ConvertOptions) -> Result<ConvertedFiles> {
    let pair = locate_parrec_pair(par)?;
    let base = opts.outdir.join(pair.stem());

    let nii = with_suffix(&base, if opts.compressed { ".nii.gz" } else { ".nii" });
    ensure_writable(&nii, opts.overwrite)?;

    let header = ParHeader::from_file(&pair.par)?;
    let layout = header.layout()?;
    let mut data = read_rec(&header, &layout, &pair.rec)?;
    let shape = [layout.columns, layout.rows, layout.n_slices];

    let mut aff = affine::par_affine(&header, shape, opts.origin)?;

    // Reorient to LAS+ when the stored axes disagree.
    let ornt = affine::io_orientation(&affine::flip_x(&aff));
    let mut reorient = affine::identity();
    if !affine::is_identity(&ornt) {
        reorient = affine::inv_ornt_aff(&ornt, shape);
        aff = affine::matmul(&aff, &reorient);
        data = apply_orientation(data, &ornt);
        debug!(?ornt, "reoriented to LAS+");
    }

    let mut diffusion = match header.bvals_bvecs(&layout) {
        Some((bvals, bvecs)) => {
            let orientation = header.slice_orientation()?;
            let bvecs = bvecs
                .into_iter()
                .map(|v| {
                    affine::psl_to_voxel(orientation, v).map(|v| rotate_back(&reorient, v))
                })
                .collect::<Result<Vec<_>>>()?;
            Some((bvals, bvecs))
        }
        None => None,
    };

    if !opts.keep_trace {
        if let Some((bvals, bvecs)) = diffusion.as_mut() {
            let keep: Vec<usize> = (0..bvals.len())
                .filter(|&v| !(bvals[v] != 0.0 && bvecs[v].iter().all(|&c| c == 0.0)))
                .collect();
            if keep.is_empty() {
                return Err(XnatKitError::Conversion(format!(
                    "every volume of {} is a diffusion trace",
                    pair.par.display()
                )));
            }
            let removed = bvals.len() - keep.len();
            if removed > 0 {
                info!(removed, "removing DTI trace volumes");
                data = data.select(Axis(3), &keep);
                *bvals = keep.iter().map(|&v| bvals[v]).collect();
                *bvecs = keep.iter().map(|&v| bvecs[v]).collect();
            }
        }
    }

    let nifti_header = build_header(&aff, &data, header.repetition_time().unwrap_or(0.0));
    let write = if data.shape()[3] == 1 {
        WriterOptions::new(&nii)
            .reference_header(&nifti_header)
            .write_nifti(&data.index_axis(Axis(3), 0))
    } else {
        WriterOptions::new(&nii)
            .reference_header(&nifti_header)
            .write_nifti(&data)
    };
    write.map_err(|e| XnatKitError::Conversion(format!("writing {}: {e}", nii.display())))?;
    info!(nii = %nii.display(), shape = ?data.shape(), "NIfTI written");

    let mut out = ConvertedFiles {
        nii,
        bval: None,
        bvec: None,
        dwell_time: None,
    };

    if opts.write_bvs {
        match &diffusion {
            Some((bvals, bvecs)) => {
                let (bval, bvec) = write_bvals_bvecs(&base, bvals, bvecs, opts.overwrite)?;
                out.bval = Some(bval);
                out.bvec = Some(bvec);
            }
            None => debug!("no diffusion volumes, bvals and bvecs not written"),
        }
    }

    if let Some(field_strength) = opts.field_strength {
        let path = with_suffix(&base, ".dwell_time");
        ensure_writable(&path, opts.overwrite)?;
        match dwell_time(header.water_fat_shift()?, header.epi_factor()?, field_strength) {
            Ok(seconds) => {
                std::fs::write(&path, format!("{seconds:?}\n"))
                    .map_err(|e| XnatKitError::io(&path, e))?;
                out.dwell_time = Some(path);
            }
            Err(e) => warn!(error = %e, "dwell time not written"),
        }
    }

    Ok(out)
}

/// Effective echo spacing of an EPI readout in seconds.
pub fn dwell_time(water_fat_shift: f64, echo_train_length: f64, field_strength: f64) -> Result<f64> {
    if field_strength <= 0.0 {
        return Err(XnatKitError::Conversion(
            "field strength should be positive".into(),
        ));
    }
    if echo_train_length <= 0.0 {
        return Err(XnatKitError::Conversion(
            "echo train length should be at least 1".into(),
        ));
    }
    Ok((echo_train_length - 1.0) * water_fat_shift
        / (GYROMAGNETIC_RATIO * PROTON_WATER_FAT_SHIFT * field_strength * (echo_train_length + 1.0)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn ensure_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(XnatKitError::Conversion(format!(
            "output file {} exists, use overwrite to replace it",
            path.display()
        )));
    }
    Ok(())
}

/// Flip and permute the spatial axes so that input axis `i` lands on
/// output axis `ornt[i].0`.
fn apply_orientation(data: Array4<i16>, ornt: &affine::Orientation) -> Array4<i16> {
    let mut data = data;
    for (axis, &(_, dir)) in ornt.iter().enumerate() {
        if dir < 0.0 {
            data.invert_axis(Axis(axis));
        }
    }
    let mut order = [0, 1, 2, 3];
    for (input, &(output, _)) in ornt.iter().enumerate() {
        order[output] = input;
    }
    data.permuted_axes(order).as_standard_layout().into_owned()
}

/// Apply the rotation part of `inverse(reorient)` to a voxel-axis vector.
fn rotate_back(reorient: &Affine, v: [f64; 3]) -> [f64; 3] {
    // Signed permutation: the inverse is the transpose.
    std::array::from_fn(|i| (0..3).map(|k| reorient[k][i] * v[k]).sum::<f64>() + 0.0)
}

fn build_header(aff: &Affine, data: &Array4<i16>, repetition_time_ms: f64) -> NiftiHeader {
    let zooms = affine::zooms(aff);
    let (min, max) = data
        .iter()
        .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let row = |r: usize| -> [f32; 4] { std::array::from_fn(|c| aff[r][c] as f32) };

    NiftiHeader {
        pixdim: [
            1.0,
            zooms[0] as f32,
            zooms[1] as f32,
            zooms[2] as f32,
            (repetition_time_ms / 1000.0) as f32,
            1.0,
            1.0,
            1.0,
        ],
        xyzt_units: UNITS_MM_SEC,
        scl_slope: 1.0,
        scl_inter: 0.0,
        cal_min: f32::from(min),
        cal_max: f32::from(max),
        qform_code: 0,
        sform_code: XFORM_SCANNER_ANAT,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        ..NiftiHeader::default()
    }
}

/// Write `.bval` (one line) and `.bvec` (x, y and z lines).
fn write_bvals_bvecs(
    base: &Path,
    bvals: &[f64],
    bvecs: &[[f64; 3]],
    overwrite: bool,
) -> Result<(PathBuf, PathBuf)> {
    let bval = with_suffix(base, ".bval");
    let bvec = with_suffix(base, ".bvec");
    ensure_writable(&bval, overwrite)?;
    ensure_writable(&bvec, overwrite)?;

    let mut text = String::new();
    for v in bvals {
        text.push_str(&format!("{v:?} "));
    }
    text.push('\n');
    std::fs::write(&bval, text).map_err(|e| XnatKitError::io(&bval, e))?;

    let mut text = String::new();
    for component in 0..3 {
        for v in bvecs {
            text.push_str(&format!("{:?} ", v[component]));
        }
        text.push('\n');
    }
    std::fs::write(&bvec, text).map_err(|e| XnatKitError::io(&bvec, e))?;

    debug!(bval = %bval.display(), bvec = %bvec.display(), "diffusion tables written");
    Ok((bval, bvec))
}
