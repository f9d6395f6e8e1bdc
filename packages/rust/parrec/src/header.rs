//! PAR header parsing.
//!
//! A PAR file has two parts: general information lines of the form
//! `.    Patient name    :   DOE^JOHN` and one whitespace-separated row per
//! stored image. The row layout depends on the export version, which is
//! recognized from the number of columns.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use xnatkit_shared::{Result, XnatKitError};

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// PAR export format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParVersion {
    V4,
    V4_1,
    V4_2,
}

impl ParVersion {
    /// Recognize the version from the column count of an image row.
    pub fn from_columns(columns: usize) -> Option<Self> {
        match columns {
            41 => Some(Self::V4),
            48 => Some(Self::V4_1),
            49 => Some(Self::V4_2),
            _ => None,
        }
    }

    /// Whether rows carry per-image diffusion gradients (V4.1 and later).
    pub fn has_diffusion_columns(self) -> bool {
        self >= Self::V4_1
    }
}

// ---------------------------------------------------------------------------
// Image rows
// ---------------------------------------------------------------------------

/// One image definition row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDef {
    pub slice_number: u32,
    pub echo_number: u32,
    pub dynamic_number: u32,
    pub cardiac_phase: u32,
    pub image_type: u32,
    pub scanning_sequence: u32,
    pub index_in_rec: usize,
    /// Bits per pixel (8 or 16).
    pub pixel_bits: u32,
    /// Reconstruction resolution (x, y).
    pub recon_resolution: [usize; 2],
    pub rescale_intercept: f64,
    pub rescale_slope: f64,
    pub scale_slope: f64,
    /// Image angulation (ap, fh, rl) in degrees.
    pub angulation: [f64; 3],
    /// Image off-centre (ap, fh, rl) in mm.
    pub offcentre: [f64; 3],
    pub slice_thickness: f64,
    pub slice_gap: f64,
    /// 1 transverse, 2 sagittal, 3 coronal.
    pub slice_orientation: u32,
    pub pixel_spacing: [f64; 2],
    pub echo_time: f64,
    pub diffusion_b_factor: f64,
    pub flip_angle: f64,
    pub inversion_delay: f64,
    pub b_value_number: Option<u32>,
    pub gradient_orientation_number: Option<u32>,
    /// Diffusion gradient (ap, fh, rl).
    pub diffusion: Option<[f64; 3]>,
    pub label_type: Option<u32>,
}

impl ImageDef {
    fn parse(tokens: &[&str], version: ParVersion, line: usize) -> Result<Self> {
        let num = |i: usize| -> Result<f64> {
            tokens[i].parse::<f64>().map_err(|_| {
                XnatKitError::parse(format!(
                    "line {line}: column {} is not a number: '{}'",
                    i + 1,
                    tokens[i]
                ))
            })
        };
        let int = |i: usize| -> Result<u32> { num(i).map(|v| v as u32) };
        let triple = |i: usize| -> Result<[f64; 3]> { Ok([num(i)?, num(i + 1)?, num(i + 2)?]) };

        let v41 = version.has_diffusion_columns();
        Ok(Self {
            slice_number: int(0)?,
            echo_number: int(1)?,
            dynamic_number: int(2)?,
            cardiac_phase: int(3)?,
            image_type: int(4)?,
            scanning_sequence: int(5)?,
            index_in_rec: int(6)? as usize,
            pixel_bits: int(7)?,
            recon_resolution: [int(9)? as usize, int(10)? as usize],
            rescale_intercept: num(11)?,
            rescale_slope: num(12)?,
            scale_slope: num(13)?,
            angulation: triple(16)?,
            offcentre: triple(19)?,
            slice_thickness: num(22)?,
            slice_gap: num(23)?,
            slice_orientation: int(25)?,
            pixel_spacing: [num(28)?, num(29)?],
            echo_time: num(30)?,
            diffusion_b_factor: num(33)?,
            flip_angle: num(35)?,
            inversion_delay: num(40)?,
            b_value_number: if v41 { Some(int(41)?) } else { None },
            gradient_orientation_number: if v41 { Some(int(42)?) } else { None },
            diffusion: if v41 { Some(triple(45)?) } else { None },
            label_type: if version == ParVersion::V4_2 { Some(int(48)?) } else { None },
        })
    }

    /// Sort key of the volume this image belongs to.
    fn volume_key(&self) -> VolumeKey {
        (
            self.dynamic_number,
            self.echo_number,
            self.cardiac_phase,
            self.gradient_orientation_number.unwrap_or(1),
            self.b_value_number.unwrap_or(1),
            self.label_type.unwrap_or(1),
            self.image_type,
        )
    }
}

/// (dynamic, echo, cardiac phase, gradient orientation, b-value number,
/// label type, image type).
type VolumeKey = (u32, u32, u32, u32, u32, u32, u32);

// ---------------------------------------------------------------------------
// Volume layout
// ---------------------------------------------------------------------------

/// Placement of every image row in an `[x, y, slice, volume]` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    pub columns: usize,
    pub rows: usize,
    pub n_slices: usize,
    pub n_volumes: usize,
    /// Bits per pixel shared by all images.
    pub pixel_bits: u32,
    /// `(slice index, volume index)` of each image row, in row order.
    pub placement: Vec<(usize, usize)>,
    /// For each volume, the row index of one of its images.
    pub volume_rows: Vec<usize>,
}

// ---------------------------------------------------------------------------
// ParHeader
// ---------------------------------------------------------------------------

/// A parsed PAR header.
#[derive(Debug, Clone, PartialEq)]
pub struct ParHeader {
    pub version: ParVersion,
    /// General information keyed by snake-case name (`patient_name`, `fov`, ...).
    pub general: BTreeMap<String, String>,
    pub images: Vec<ImageDef>,
}

impl ParHeader {
    /// Read and parse a PAR file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| XnatKitError::io(path, e))?;
        // Scanner exports are Latin-1; names are the only non-ASCII content.
        let text = String::from_utf8_lossy(&bytes);
        Self::parse(&text)
            .map_err(|e| XnatKitError::parse(format!("{} cannot be parsed as a PAR file: {e}", path.display())))
    }

    /// Parse PAR header text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut general = BTreeMap::new();
        let mut rows: Vec<(usize, Vec<&str>)> = Vec::new();

        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(info) = line.strip_prefix('.') {
                let (key, value) = info.split_once(':').ok_or_else(|| {
                    XnatKitError::parse(format!("line {}: general info without ':'", n + 1))
                })?;
                general.insert(general_key(key), value.trim().to_string());
            } else {
                rows.push((n + 1, line.split_whitespace().collect()));
            }
        }

        let (first_line, first) = rows
            .first()
            .ok_or_else(|| XnatKitError::parse("no image definition rows"))?;
        let version = ParVersion::from_columns(first.len()).ok_or_else(|| {
            XnatKitError::parse(format!(
                "line {first_line}: unsupported image row with {} columns",
                first.len()
            ))
        })?;

        let images = rows
            .iter()
            .map(|(line, tokens)| {
                if tokens.len() != first.len() {
                    return Err(XnatKitError::parse(format!(
                        "line {line}: expected {} columns, found {}",
                        first.len(),
                        tokens.len()
                    )));
                }
                ImageDef::parse(tokens, version, *line)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version,
            general,
            images,
        })
    }

    // -----------------------------------------------------------------------
    // General information accessors
    // -----------------------------------------------------------------------

    fn text(&self, key: &str) -> Option<&str> {
        self.general
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn numbers(&self, key: &str) -> Result<Vec<f64>> {
        let raw = self
            .text(key)
            .ok_or_else(|| XnatKitError::parse(format!("missing general info '{key}'")))?;
        raw.split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| XnatKitError::parse(format!("'{key}' is not numeric: '{raw}'")))
            })
            .collect()
    }

    fn number(&self, key: &str) -> Result<f64> {
        self.numbers(key)?
            .first()
            .copied()
            .ok_or_else(|| XnatKitError::parse(format!("'{key}' is empty")))
    }

    fn vector3(&self, key: &str) -> Result<[f64; 3]> {
        match self.numbers(key)?.as_slice() {
            [a, b, c] => Ok([*a, *b, *c]),
            other => Err(XnatKitError::parse(format!(
                "'{key}' needs 3 values, found {}",
                other.len()
            ))),
        }
    }

    pub fn patient_name(&self) -> Option<&str> {
        self.text("patient_name")
    }

    pub fn exam_name(&self) -> Option<&str> {
        self.text("exam_name")
    }

    pub fn protocol_name(&self) -> Option<&str> {
        self.text("protocol_name")
    }

    pub fn series_type(&self) -> Option<&str> {
        self.text("series_type")
    }

    pub fn acq_nr(&self) -> Result<u32> {
        Ok(self.number("acq_nr")? as u32)
    }

    /// Exam date as (`MM/DD/YYYY`, `HH:MM:SS`), from `2013.08.29 / 12:31:21`.
    pub fn exam_date(&self) -> Result<(String, String)> {
        let raw = self
            .text("exam_date")
            .ok_or_else(|| XnatKitError::parse("missing general info 'exam_date'"))?;
        let invalid = || XnatKitError::parse(format!("invalid exam date '{raw}'"));

        let (date, time) = raw.split_once('/').ok_or_else(invalid)?;
        let parts: Vec<&str> = date.trim().split('.').collect();
        match parts.as_slice() {
            [year, month, day] => Ok((format!("{month}/{day}/{year}"), time.trim().to_string())),
            _ => Err(invalid()),
        }
    }

    /// Repetition time in ms (first value when several are listed).
    pub fn repetition_time(&self) -> Result<f64> {
        self.number("repetition_time")
    }

    /// Field of view (ap, fh, rl) in mm.
    pub fn fov(&self) -> Result<[f64; 3]> {
        self.vector3("fov")
    }

    /// Midslice angulation (ap, fh, rl) in degrees.
    pub fn angulation(&self) -> Result<[f64; 3]> {
        self.vector3("angulation")
    }

    /// Midslice off-centre (ap, fh, rl) in mm.
    pub fn off_center(&self) -> Result<[f64; 3]> {
        self.vector3("off_center")
    }

    /// Water-fat shift in pixels.
    pub fn water_fat_shift(&self) -> Result<f64> {
        self.number("water_fat_shift")
    }

    /// EPI factor, used as echo train length.
    pub fn epi_factor(&self) -> Result<f64> {
        self.number("epi_factor")
    }

    /// Number of gradient orientations; absent in older exports.
    pub fn max_gradient_orient(&self) -> Option<u32> {
        self.number("max_gradient_orient").ok().map(|v| v as u32)
    }

    /// Whether the series is a diffusion acquisition.
    pub fn is_diffusion(&self) -> bool {
        self.number("diffusion").is_ok_and(|v| v != 0.0)
    }

    /// Voxel size (x, y, z) in mm: pixel spacing and slice thickness + gap.
    pub fn voxel_size(&self) -> Result<[f64; 3]> {
        let first = self.first_image()?;
        Ok([
            first.pixel_spacing[0],
            first.pixel_spacing[1],
            first.slice_thickness + first.slice_gap,
        ])
    }

    /// Number of distinct slice locations.
    pub fn n_slices(&self) -> usize {
        self.images
            .iter()
            .map(|i| i.slice_number)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Slice orientation code of the series (1 tra, 2 sag, 3 cor).
    pub fn slice_orientation(&self) -> Result<u32> {
        Ok(self.first_image()?.slice_orientation)
    }

    pub fn first_image(&self) -> Result<&ImageDef> {
        self.images
            .first()
            .ok_or_else(|| XnatKitError::parse("no image definition rows"))
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    /// Place every image row into a complete `[x, y, slice, volume]` grid.
    ///
    /// Slices are ordered by slice number; volumes by dynamic, echo, cardiac
    /// phase, gradient orientation, b-value, label type and image type.
    /// Incomplete acquisitions are rejected.
    pub fn layout(&self) -> Result<VolumeLayout> {
        let first = self.first_image()?;
        let [columns, rows] = first.recon_resolution;
        let pixel_bits = first.pixel_bits;

        for image in &self.images {
            if image.recon_resolution != first.recon_resolution || image.pixel_bits != pixel_bits {
                return Err(XnatKitError::Conversion(
                    "images differ in resolution or pixel size".into(),
                ));
            }
        }
        if !matches!(pixel_bits, 8 | 16) {
            return Err(XnatKitError::Conversion(format!(
                "unsupported pixel size of {pixel_bits} bits"
            )));
        }

        let slices: Vec<u32> = self
            .images
            .iter()
            .map(|i| i.slice_number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let volumes: Vec<VolumeKey> = self
            .images
            .iter()
            .map(ImageDef::volume_key)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut seen = BTreeSet::new();
        let mut volume_rows = vec![usize::MAX; volumes.len()];
        let mut placement = Vec::with_capacity(self.images.len());
        for (row, image) in self.images.iter().enumerate() {
            let s = slices.binary_search(&image.slice_number).unwrap_or_default();
            let v = volumes.binary_search(&image.volume_key()).unwrap_or_default();
            if !seen.insert((s, v)) {
                return Err(XnatKitError::Conversion(format!(
                    "duplicate image for slice {} in one volume",
                    image.slice_number
                )));
            }
            if volume_rows[v] == usize::MAX {
                volume_rows[v] = row;
            }
            placement.push((s, v));
        }

        if placement.len() != slices.len() * volumes.len() {
            return Err(XnatKitError::Conversion(format!(
                "incomplete acquisition: {} images for {} slices x {} volumes",
                placement.len(),
                slices.len(),
                volumes.len()
            )));
        }

        Ok(VolumeLayout {
            columns,
            rows,
            n_slices: slices.len(),
            n_volumes: volumes.len(),
            pixel_bits,
            placement,
            volume_rows,
        })
    }

    /// Per-volume b-values and gradient vectors (ap, fh, rl).
    ///
    /// `None` unless the series is diffusion-weighted and the export carries
    /// gradient columns.
    pub fn bvals_bvecs(&self, layout: &VolumeLayout) -> Option<(Vec<f64>, Vec<[f64; 3]>)> {
        if !self.is_diffusion() || !self.version.has_diffusion_columns() {
            return None;
        }
        let mut bvals = Vec::with_capacity(layout.n_volumes);
        let mut bvecs = Vec::with_capacity(layout.n_volumes);
        for &row in &layout.volume_rows {
            let image = &self.images[row];
            bvals.push(image.diffusion_b_factor);
            bvecs.push(image.diffusion.unwrap_or_default());
        }
        Some((bvals, bvecs))
    }
}

/// Map a general-info label to its snake-case key.
fn general_key(label: &str) -> String {
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    const KEYS: &[(&str, &str)] = &[
        ("Patient name", "patient_name"),
        ("Examination name", "exam_name"),
        ("Protocol name", "protocol_name"),
        ("Examination date/time", "exam_date"),
        ("Series Type", "series_type"),
        ("Series_data_type", "series_type"),
        ("Acquisition nr", "acq_nr"),
        ("Reconstruction nr", "recon_nr"),
        ("Scan Duration", "scan_duration"),
        ("Max. number of cardiac phases", "max_cardiac_phases"),
        ("Max. number of echoes", "max_echoes"),
        ("Max. number of slices", "max_slices"),
        ("Max. number of dynamics", "max_dynamics"),
        ("Max. number of mixes", "max_mixes"),
        ("Max. number of diffusion values", "max_diffusion_values"),
        ("Max. number of gradient orients", "max_gradient_orient"),
        ("Patient position", "patient_position"),
        ("Preparation direction", "prep_direction"),
        ("Technique", "tech"),
        ("Scan resolution", "scan_resolution"),
        ("Scan mode", "scan_mode"),
        ("Repetition time", "repetition_time"),
        ("FOV", "fov"),
        ("Water Fat shift", "water_fat_shift"),
        ("Angulation midslice", "angulation"),
        ("Off Centre midslice", "off_center"),
        ("Flow compensation", "flow_compensation"),
        ("Presaturation", "presaturation"),
        ("Phase encoding velocity", "phase_enc_velocity"),
        ("MTC", "mtc"),
        ("SPIR", "spir"),
        ("EPI factor", "epi_factor"),
        ("Dynamic scan", "dyn_scan"),
        ("Diffusion echo time", "diffusion_echo_time"),
        ("Diffusion", "diffusion"),
        ("Number of label types", "nr_label_types"),
    ];
    KEYS.iter()
        .find(|(prefix, _)| label.starts_with(prefix))
        .map(|(_, key)| (*key).to_string())
        .unwrap_or(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DTI_PAR, T1_PAR};

    #[test]
    fn detects_version_from_columns() {
        assert_eq!(ParVersion::from_columns(41), Some(ParVersion::V4));
        assert_eq!(ParVersion::from_columns(48), Some(ParVersion::V4_1));
        assert_eq!(ParVersion::from_columns(49), Some(ParVersion::V4_2));
        assert_eq!(ParVersion::from_columns(40), None);
    }

    #[test]
    fn parses_general_info() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        assert_eq!(header.version, ParVersion::V4_2);
        assert_eq!(header.patient_name(), Some("DOE^JOHN"));
        assert_eq!(header.exam_name(), Some("Brain study.01"));
        assert_eq!(header.protocol_name(), Some("WIP T1W_3D SENSE"));
        assert!(header.series_type().unwrap().contains("MR"));
        assert_eq!(header.acq_nr().unwrap(), 5);
        assert_eq!(header.repetition_time().unwrap(), 8.1);
        assert_eq!(header.fov().unwrap(), [240.0, 180.0, 200.0]);
        assert_eq!(header.max_gradient_orient(), Some(1));
        assert!(!header.is_diffusion());
    }

    #[test]
    fn splits_exam_date() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        let (date, time) = header.exam_date().unwrap();
        assert_eq!(date, "08/29/2013");
        assert_eq!(time, "12:31:21");
    }

    #[test]
    fn voxel_size_and_slices() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        assert_eq!(header.voxel_size().unwrap(), [1.0, 1.0, 2.5]);
        assert_eq!(header.n_slices(), 3);
        assert_eq!(header.images.len(), 3);
        assert_eq!(header.images[0].inversion_delay, 0.0);
        assert_eq!(header.images[0].flip_angle, 8.0);
    }

    #[test]
    fn layout_orders_volumes() {
        let header = ParHeader::parse(DTI_PAR).unwrap();
        let layout = header.layout().unwrap();
        assert_eq!((layout.columns, layout.rows), (2, 2));
        assert_eq!(layout.n_slices, 2);
        assert_eq!(layout.n_volumes, 3);

        let (bvals, bvecs) = header.bvals_bvecs(&layout).unwrap();
        assert_eq!(bvals, vec![0.0, 1000.0, 1000.0]);
        assert_eq!(bvecs[1], [1.0, 0.0, 0.0]);
        assert_eq!(bvecs[2], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn incomplete_acquisition_is_rejected() {
        let mut header = ParHeader::parse(DTI_PAR).unwrap();
        header.images.pop();
        assert!(matches!(header.layout(), Err(XnatKitError::Conversion(_))));
    }

    #[test]
    fn unsupported_column_count_fails() {
        let text = ". Patient name : X\n1 2 3\n";
        assert!(matches!(ParHeader::parse(text), Err(XnatKitError::Parse { .. })));
    }
}
