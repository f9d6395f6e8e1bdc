use std::path::Path;

use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use tracing::debug;
use xnatkit_parrec::{ParHeader, locate_parrec_pair, read_rec};
use xnatkit_shared::{Result, XnatKitError};

/// Load a 3-D volume from a `.nii`, `.nii.gz`, `.PAR` or `.REC` file.
///
/// For 4-D series only the first volume is kept.
pub fn load_volume(path: &Path) -> Result<Array3<f32>> {
    if !path.is_file() {
        return Err(XnatKitError::validation(format!(
            "input file not found: {}",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let data = if name.ends_with(".nii") || name.ends_with(".nii.gz") {
        load_nifti(path)?
    } else if name.ends_with(".par") || name.ends_with(".rec") {
        load_parrec(path)?
    } else {
        return Err(XnatKitError::validation(format!(
            "unsupported image format: {}",
            path.display()
        )));
    };

    let data = if data.ndim() == 4 {
        data.index_axis_move(Axis(3), 0)
    } else {
        data
    };
    let shape = data.shape().to_vec();
    let volume = data.into_dimensionality::<Ix3>().map_err(|_| {
        XnatKitError::Image(format!(
            "{} is not a 3-D or 4-D image (shape {shape:?})",
            path.display()
        ))
    })?;

    debug!(path = %path.display(), shape = ?volume.shape(), "volume loaded");
    Ok(volume)
}

fn load_nifti(path: &Path) -> Result<ArrayD<f32>> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| XnatKitError::Image(format!("reading {}: {e}", path.display())))?;
    debug!(dim = ?obj.header().dim, "NIfTI header read");
    obj.into_volume()
        .into_ndarray::<f32>()
        .map_err(|e| XnatKitError::Image(format!("decoding {}: {e}", path.display())))
}

fn load_parrec(path: &Path) -> Result<ArrayD<f32>> {
    let pair = locate_parrec_pair(path)?;
    let header = ParHeader::from_file(&pair.par)?;
    let layout = header.layout()?;
    let data = read_rec(&header, &layout, &pair.rec)?;
    Ok(data.mapv(f32::from).into_dyn())
}
