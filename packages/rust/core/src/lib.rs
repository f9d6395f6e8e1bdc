//! Procedures of xnatkit.
//!
//! Each procedure drives one [`XnatClient`](xnatkit_client::XnatClient)
//! through a full run (upload, sweep, archive, launch or download) and
//! reports through a [`ProgressReporter`]. Wrap calls in
//! [`session::scoped`] to get one server session per run.

pub mod cleanup;
pub mod download;
pub mod launcher;
pub mod nifti;
pub mod parrec;
pub mod progress;
pub mod resources;
pub mod session;
pub mod upload;

pub use cleanup::{CleanupOptions, CleanupSummary, cleanup_project, is_preserved};
pub use download::{DownloadOptions, DownloadSummary, download_project, extract_zip};
pub use launcher::{LaunchOptions, LaunchSummary, launch_pipelines};
pub use nifti::{NiftiUploadOptions, upload_nifti};
pub use parrec::{ParrecUploadOptions, scan_metadata, upload_parrec};
pub use progress::{ProgressReporter, SilentProgress};
pub use resources::{
    ResourceMeta, ResourceOptions, UNSPECIFIED_COLLECTION, add_resource_file, archive_input,
    create_resource_collection, zip_directory,
};
pub use session::scoped;
pub use upload::UploadSummary;
