//! Small synthetic PAR headers and REC payloads for tests.

use std::path::{Path, PathBuf};

/// Single-volume T1 series: 3 slices of 4 x 3 pixels, 16 bit.
pub const T1_PAR: &str = r"# === DATA DESCRIPTION FILE ======================================================
#
# Dataset name: E:\export\t1
#
# CLINICAL TRYOUT             Research image export tool     V4.2
#
# === GENERAL INFORMATION ========================================================
#
.    Patient name                       :   DOE^JOHN
.    Examination name                   :   Brain study.01
.    Protocol name                      :   WIP T1W_3D SENSE
.    Examination date/time              :   2013.08.29 / 12:31:21
.    Series Type                        :   Image   MRSERIES
.    Acquisition nr                     :   5
.    Reconstruction nr                  :   1
.    Max. number of slices/locations    :   3
.    Technique                          :   T1TFE
.    Repetition time [ms]               :   8.100  
.    FOV (ap,fh,rl) [mm]                :   240.000  180.000  200.000
.    Water Fat shift [pixels]           :   10.000
.    Angulation midslice(ap,fh,rl)[degr]:   0.000  0.000  0.000
.    Off Centre midslice(ap,fh,rl) [mm] :   1.000  2.000  3.000
.    EPI factor        <0,1=no EPI>     :   1
.    Diffusion         <0=no 1=yes> ?   :   0
.    Diffusion echo time [ms]           :   0.0000
.    Max. number of diffusion values    :   1
.    Max. number of gradient orients    :   1
#
# === IMAGE INFORMATION ==========================================================
#  sl ec  dyn ph ty    idx pix scan% rec size                (re)scale              window        angulation              offcentre        thick   gap   info      spacing     echo     dtime   ttime    diff  avg  flip    freq   RR-int  turbo delay b grad cont anis         diffusion       L.ty

 1 1 1 1 0 2 0 16 100 4 3 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.500 0.000 0 1 0 2 1.000 1.000 3.80 0.00 0.00 0.00 1 8.00 0 0 0 0 0.0 1 1 0 0 0.000 0.000 0.000 1
 2 1 1 1 0 2 1 16 100 4 3 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.500 0.000 0 1 0 2 1.000 1.000 3.80 0.00 0.00 0.00 1 8.00 0 0 0 0 0.0 1 1 0 0 0.000 0.000 0.000 1
 3 1 1 1 0 2 2 16 100 4 3 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.500 0.000 0 1 0 2 1.000 1.000 3.80 0.00 0.00 0.00 1 8.00 0 0 0 0 0.0 1 1 0 0 0.000 0.000 0.000 1

# === END OF DATA DESCRIPTION FILE ===============================================
";

/// Diffusion series: 2 slices of 2 x 2 pixels; volumes b=0, b=1000 along
/// AP, and the b=1000 isotropic trace.
pub const DTI_PAR: &str = r"# === DATA DESCRIPTION FILE ======================================================
#
# Dataset name: E:\export\dti
#
# CLINICAL TRYOUT             Research image export tool     V4.2
#
# === GENERAL INFORMATION ========================================================
#
.    Patient name                       :   DOE^JOHN
.    Examination name                   :   Brain study.01
.    Protocol name                      :   DTI_32dir
.    Examination date/time              :   2013.08.29 / 12:31:21
.    Series Type                        :   Image   MRSERIES
.    Acquisition nr                     :   5
.    Reconstruction nr                  :   1
.    Max. number of slices/locations    :   3
.    Technique                          :   T1TFE
.    Repetition time [ms]               :   8.100  
.    FOV (ap,fh,rl) [mm]                :   240.000  180.000  200.000
.    Water Fat shift [pixels]           :   10.000
.    Angulation midslice(ap,fh,rl)[degr]:   0.000  0.000  0.000
.    Off Centre midslice(ap,fh,rl) [mm] :   1.000  2.000  3.000
.    EPI factor        <0,1=no EPI>     :   35
.    Diffusion         <0=no 1=yes> ?   :   1
.    Diffusion echo time [ms]           :   0.0000
.    Max. number of diffusion values    :   2
.    Max. number of gradient orients    :   3
#
# === IMAGE INFORMATION ==========================================================
#  sl ec  dyn ph ty    idx pix scan% rec size                (re)scale              window        angulation              offcentre        thick   gap   info      spacing     echo     dtime   ttime    diff  avg  flip    freq   RR-int  turbo delay b grad cont anis         diffusion       L.ty

 1 1 1 1 0 2 0 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 0.00 1 90.00 0 0 0 0 0.0 1 1 0 0 0.000 0.000 0.000 1
 1 1 1 1 0 2 1 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 1000.00 1 90.00 0 0 0 0 0.0 2 2 0 0 1.000 0.000 0.000 1
 1 1 1 1 0 2 2 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 1000.00 1 90.00 0 0 0 0 0.0 2 3 0 0 0.000 0.000 0.000 1
 2 1 1 1 0 2 3 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 0.00 1 90.00 0 0 0 0 0.0 1 1 0 0 0.000 0.000 0.000 1
 2 1 1 1 0 2 4 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 1000.00 1 90.00 0 0 0 0 0.0 2 2 0 0 1.000 0.000 0.000 1
 2 1 1 1 0 2 5 16 100 2 2 0.00000 1.00000 1.00000 1070 1860 0.00 0.00 0.00 0.00 0.00 0.00 2.000 0.000 0 1 0 2 1.000 1.000 90.00 0.00 0.00 1000.00 1 90.00 0 0 0 0 0.0 2 3 0 0 0.000 0.000 0.000 1

# === END OF DATA DESCRIPTION FILE ===============================================
";

/// Write `stem.PAR` / `stem.REC` into `dir`. Pixel `p` of image `i`
/// holds `i * 100 + p`.
pub fn write_pair(dir: &Path, stem: &str, par: &str, images: usize, pixels: usize) -> PathBuf {
    let par_path = dir.join(format!("{stem}.PAR"));
    std::fs::write(&par_path, par).expect("write PAR");

    let mut rec = Vec::with_capacity(images * pixels * 2);
    for i in 0..images {
        for p in 0..pixels {
            rec.extend_from_slice(&((i * 100 + p) as i16).to_le_bytes());
        }
    }
    std::fs::write(dir.join(format!("{stem}.REC")), rec).expect("write REC");
    par_path
}
