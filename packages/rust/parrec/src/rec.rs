//! REC pixel data reader.
//!
//! A REC file is a plain concatenation of images, each `x * y` little-endian
//! integers stored row by row. The PAR row of an image says where it sits
//! in the file (`index in REC file`).

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array4;
use tracing::debug;
use xnatkit_shared::{Result, XnatKitError};

use crate::header::{ParHeader, VolumeLayout};

/// Read the REC file into an `[x, y, slice, volume]` array of stored
/// (unscaled) values.
///
/// A file shorter than the header requires is an error; truncated
/// recordings are not converted.
pub fn read_rec(header: &ParHeader, layout: &VolumeLayout, rec: &Path) -> Result<Array4<i16>> {
    let bytes = std::fs::read(rec).map_err(|e| XnatKitError::io(rec, e))?;

    let bytes_per_pixel = (layout.pixel_bits / 8) as usize;
    let pixels = layout.columns * layout.rows;
    let image_bytes = pixels * bytes_per_pixel;

    let needed = header
        .images
        .iter()
        .map(|i| (i.index_in_rec + 1) * image_bytes)
        .max()
        .unwrap_or_default();
    if bytes.len() < needed {
        return Err(XnatKitError::Conversion(format!(
            "{} is truncated: {} bytes, header describes {needed}",
            rec.display(),
            bytes.len()
        )));
    }

    let mut data = Array4::<i16>::zeros((layout.columns, layout.rows, layout.n_slices, layout.n_volumes));
    for (image, &(slice, volume)) in header.images.iter().zip(&layout.placement) {
        let start = image.index_in_rec * image_bytes;
        let block = &bytes[start..start + image_bytes];
        for y in 0..layout.rows {
            for x in 0..layout.columns {
                let p = (y * layout.columns + x) * bytes_per_pixel;
                data[[x, y, slice, volume]] = match bytes_per_pixel {
                    1 => i16::from(block[p]),
                    _ => LittleEndian::read_i16(&block[p..p + 2]),
                };
            }
        }
    }

    debug!(
        rec = %rec.display(),
        shape = ?data.shape(),
        "REC data loaded"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DTI_PAR, T1_PAR, write_pair};

    #[test]
    fn reads_images_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let par = write_pair(dir.path(), "t1", T1_PAR, 3, 12);
        let header = ParHeader::from_file(&par).unwrap();
        let layout = header.layout().unwrap();

        let data = read_rec(&header, &layout, &dir.path().join("t1.REC")).unwrap();
        assert_eq!(data.shape(), &[4, 3, 3, 1]);
        assert_eq!(data[[0, 0, 0, 0]], 0);
        assert_eq!(data[[1, 0, 0, 0]], 1);
        assert_eq!(data[[0, 1, 0, 0]], 4);
        assert_eq!(data[[3, 2, 2, 0]], 211);
    }

    #[test]
    fn volumes_follow_layout() {
        let dir = tempfile::tempdir().unwrap();
        let par = write_pair(dir.path(), "dti", DTI_PAR, 6, 4);
        let header = ParHeader::from_file(&par).unwrap();
        let layout = header.layout().unwrap();

        let data = read_rec(&header, &layout, &dir.path().join("dti.REC")).unwrap();
        assert_eq!(data.shape(), &[2, 2, 2, 3]);
        // image index 4 is slice 2, gradient 2
        assert_eq!(data[[0, 0, 1, 1]], 400);
    }

    #[test]
    fn truncated_rec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let par = write_pair(dir.path(), "t1", T1_PAR, 2, 12);
        let header = ParHeader::from_file(&par).unwrap();
        let layout = header.layout().unwrap();

        let err = read_rec(&header, &layout, &dir.path().join("t1.REC")).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
