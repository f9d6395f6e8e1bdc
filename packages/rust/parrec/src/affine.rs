//! Voxel-to-world transforms for PAR/REC data.
//!
//! PAR headers describe geometry in patient coordinates ordered
//! (ap, fh, rl), i.e. posterior-superior-left (PSL). The voxel grid is
//! permuted into PSL according to the slice orientation, rotated by the
//! midslice angulation, optionally shifted by the off-centre, and finally
//! mapped to RAS for NIfTI.

use std::str::FromStr;

use xnatkit_shared::{Result, XnatKitError};

use crate::header::ParHeader;

/// Homogeneous 4 x 4 transform, row-major.
pub type Affine = [[f64; 4]; 4];

/// Per input axis: (output axis, direction) as `±1.0`.
pub type Orientation = [(usize, f64); 3];

/// Reference point of the world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// (0, 0, 0) is the scanner isocentre.
    #[default]
    Scanner,
    /// (0, 0, 0) is the centre of the field of view.
    Fov,
}

impl FromStr for Origin {
    type Err = XnatKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scanner" => Ok(Self::Scanner),
            "fov" => Ok(Self::Fov),
            other => Err(XnatKitError::validation(format!(
                "unrecognized origin '{other}' (expected scanner or fov)"
            ))),
        }
    }
}

const PSL_TO_RAS: Affine = [
    [0.0, 0.0, -1.0, 0.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

pub fn identity() -> Affine {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub fn matmul(a: &Affine, b: &Affine) -> Affine {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn diag(values: [f64; 4]) -> Affine {
    let mut m = [[0.0; 4]; 4];
    for (i, v) in values.into_iter().enumerate() {
        m[i][i] = v;
    }
    m
}

/// Voxel axes -> PSL axes for a slice orientation code.
fn permute_to_psl(orientation: u32) -> Result<Affine> {
    match orientation {
        // transverse
        1 => Ok([
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]),
        // sagittal
        2 => Ok(diag([1.0, -1.0, -1.0, 1.0])),
        // coronal
        3 => Ok([
            [0.0, 0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]),
        other => Err(XnatKitError::Conversion(format!(
            "unknown slice orientation code {other}"
        ))),
    }
}

/// Rotation for a midslice angulation (ap, fh, rl) in degrees.
fn angulation_rotation(angulation: [f64; 3]) -> Affine {
    let [ap, fh, rl] = angulation.map(f64::to_radians);
    let (sx, cx) = ap.sin_cos();
    let (sy, cy) = fh.sin_cos();
    let (sz, cz) = rl.sin_cos();

    let mx = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, cx, -sx, 0.0],
        [0.0, sx, cx, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let my = [
        [cy, 0.0, sy, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [-sy, 0.0, cy, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let mz = [
        [cz, -sz, 0.0, 0.0],
        [sz, cz, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    matmul(&matmul(&mz, &mx), &my)
}

/// Voxel -> RAS transform of a PAR/REC volume with `shape = [x, y, slices]`.
pub fn par_affine(header: &ParHeader, shape: [usize; 3], origin: Origin) -> Result<Affine> {
    let [zx, zy, zz] = header.voxel_size()?;
    let rotation = angulation_rotation(header.angulation()?);
    let permute = permute_to_psl(header.slice_orientation()?)?;
    let zoomer = diag([zx, zy, zz, 1.0]);

    let mut to_center = identity();
    for (axis, &n) in shape.iter().enumerate() {
        to_center[axis][3] = -((n as f64) - 1.0) / 2.0;
    }

    let mut psl = matmul(&matmul(&matmul(&rotation, &permute), &zoomer), &to_center);
    if origin == Origin::Scanner {
        let offset = header.off_center()?;
        for axis in 0..3 {
            psl[axis][3] += offset[axis];
        }
    }
    Ok(matmul(&PSL_TO_RAS, &psl))
}

/// Express a PSL direction (ap, fh, rl) in voxel axes.
pub fn psl_to_voxel(orientation: u32, v: [f64; 3]) -> Result<[f64; 3]> {
    // Permutations are orthogonal: the inverse is the transpose.
    let p = permute_to_psl(orientation)?;
    Ok(std::array::from_fn(|i| {
        (0..3).map(|k| p[k][i] * v[k]).sum::<f64>() + 0.0
    }))
}

/// Closest signed axis permutation for the columns of `aff`.
///
/// Greedy: the largest remaining absolute entry of the normalized 3 x 3
/// block fixes one (input, output) axis pair at a time.
pub fn io_orientation(aff: &Affine) -> Orientation {
    let zooms = zooms(aff);
    let mut m = [[0.0; 3]; 3];
    for row in 0..3 {
        for col in 0..3 {
            let z = if zooms[col] == 0.0 { 1.0 } else { zooms[col] };
            m[row][col] = aff[row][col] / z;
        }
    }

    let mut ornt = [(0usize, 1.0f64); 3];
    let mut rows_free = [true; 3];
    let mut cols_free = [true; 3];
    for _ in 0..3 {
        let mut best = (0, 0, -1.0f64);
        for row in (0..3).filter(|&r| rows_free[r]) {
            for col in (0..3).filter(|&c| cols_free[c]) {
                if m[row][col].abs() > best.2 {
                    best = (row, col, m[row][col].abs());
                }
            }
        }
        let (row, col, _) = best;
        rows_free[row] = false;
        cols_free[col] = false;
        ornt[col] = (row, if m[row][col] < 0.0 { -1.0 } else { 1.0 });
    }
    ornt
}

/// Whether an orientation is the identity (no flips, no swaps).
pub fn is_identity(ornt: &Orientation) -> bool {
    ornt.iter().enumerate().all(|(i, &(axis, dir))| axis == i && dir > 0.0)
}

/// Transform from reoriented voxel coordinates back to the original ones.
///
/// `shape` is the shape before reorientation.
pub fn inv_ornt_aff(ornt: &Orientation, shape: [usize; 3]) -> Affine {
    let mut t = [[0.0; 4]; 4];
    t[3][3] = 1.0;
    for (input, &(output, dir)) in ornt.iter().enumerate() {
        t[input][output] = dir;
        if dir < 0.0 {
            t[input][3] = shape[input] as f64 - 1.0;
        }
    }
    t
}

/// Voxel sizes: norms of the first three columns.
pub fn zooms(aff: &Affine) -> [f64; 3] {
    std::array::from_fn(|col| (0..3).map(|row| aff[row][col].powi(2)).sum::<f64>().sqrt())
}

/// `diag(-1, 1, 1, 1) * aff`: RAS world to LAS world.
pub fn flip_x(aff: &Affine) -> Affine {
    matmul(&diag([-1.0, 1.0, 1.0, 1.0]), aff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::T1_PAR;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn transverse_affine_maps_voxels_to_ras() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        let aff = par_affine(&header, [4, 3, 3], Origin::Fov).unwrap();

        // x voxel axis runs right-to-left, y posterior-to-anterior flipped, z up.
        assert!(approx(aff[0][0], -1.0));
        assert!(approx(aff[1][1], -1.0));
        assert!(approx(aff[2][2], 2.5));
        // The volume centre sits at the origin.
        let centre = [1.5, 1.0, 1.0];
        for row in 0..3 {
            let world: f64 = (0..3).map(|c| aff[row][c] * centre[c]).sum::<f64>() + aff[row][3];
            assert!(approx(world, 0.0), "row {row}: {world}");
        }
    }

    #[test]
    fn scanner_origin_adds_off_centre() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        let fov = par_affine(&header, [4, 3, 3], Origin::Fov).unwrap();
        let scanner = par_affine(&header, [4, 3, 3], Origin::Scanner).unwrap();
        // off-centre (ap, fh, rl) = (1, 2, 3) -> RAS (-3, -1, 2)
        assert!(approx(scanner[0][3] - fov[0][3], -3.0));
        assert!(approx(scanner[1][3] - fov[1][3], -1.0));
        assert!(approx(scanner[2][3] - fov[2][3], 2.0));
    }

    #[test]
    fn orientation_of_transverse_needs_y_flip_for_las() {
        let header = ParHeader::parse(T1_PAR).unwrap();
        let aff = par_affine(&header, [4, 3, 3], Origin::Scanner).unwrap();
        let ornt = io_orientation(&flip_x(&aff));
        assert_eq!(ornt, [(0, 1.0), (1, -1.0), (2, 1.0)]);
        assert!(!is_identity(&ornt));

        let t = inv_ornt_aff(&ornt, [4, 3, 3]);
        let las = io_orientation(&flip_x(&matmul(&aff, &t)));
        assert!(is_identity(&las));
    }

    #[test]
    fn psl_vectors_in_voxel_axes() {
        assert_eq!(psl_to_voxel(1, [1.0, 0.0, 0.0]).unwrap(), [0.0, 1.0, 0.0]);
        assert_eq!(psl_to_voxel(1, [0.0, 0.0, 1.0]).unwrap(), [1.0, 0.0, 0.0]);
        assert!(psl_to_voxel(9, [0.0; 3]).is_err());
    }
}
