//! `resource` procedure: attach files or whole directories to a project,
//! subject or experiment as resource collections.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use walkdir::WalkDir;
use xnatkit_client::{XnatClient, paths};
use xnatkit_shared::{EntityType, Result, XnatKitError, normalize_name};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::progress::ProgressReporter;

/// Collection used for single files when none is named.
pub const UNSPECIFIED_COLLECTION: &str = "UNSPECIFIED";

/// Optional `format` / `content` attributes of a collection or file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub format: Option<String>,
    pub content: Option<String>,
}

impl ResourceMeta {
    /// Query parameters; `format` is upper-cased.
    fn query(&self, format: Option<String>) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(format) = self.format.as_deref().map(str::to_uppercase).or(format) {
            query.push(("format", format));
        }
        if let Some(content) = &self.content {
            query.push(("content", content.clone()));
        }
        query
    }
}

#[derive(Debug, Clone)]
pub struct ResourceOptions {
    pub kind: EntityType,
    pub id: String,
    /// File or directory to archive.
    pub input: PathBuf,
    pub collection: Option<String>,
}

/// Create the resource collection `label` on an entity and return its
/// `xnat_abstractresource_id`.
///
/// An existing collection (or a 500, which some XNAT versions answer for
/// subject resources) is an error with `force`, else a warning and the
/// collection is reused.
#[instrument(skip(client, meta))]
pub async fn create_resource_collection(
    client: &XnatClient,
    kind: EntityType,
    id: &str,
    label: &str,
    meta: &ResourceMeta,
    force: bool,
) -> Result<String> {
    let entity = paths::entity(kind, id);
    if client.resource_status(&entity).await? != 200 {
        return Err(XnatKitError::xnat(format!(
            "no {kind} with ID {id} reachable at {}",
            client.host()
        )));
    }

    let collection = paths::entity_resource(kind, id, label);
    let status = client.resource_status(&collection).await?;
    if matches!(status, 200 | 500) {
        if force {
            return Err(XnatKitError::xnat(format!(
                "a {kind} resource collection named {label} already exists"
            )));
        }
        warn!(%kind, label, "resource collection already exists, reusing it");
    } else {
        let query = meta.query(None);
        let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();
        client.put(&collection, &query).await?;
        info!(label, "resource collection created");
    }

    let matches: Vec<_> = client
        .resources(kind, id)
        .await?
        .into_iter()
        .filter(|r| r.label == label)
        .collect();
    match matches.as_slice() {
        [resource] => Ok(resource.xnat_abstractresource_id.clone()),
        other => Err(XnatKitError::xnat(format!(
            "expected one resource collection labelled {label}, found {}",
            other.len()
        ))),
    }
}

/// Upload one local file into an entity's collection (label or numeric id).
///
/// Without a collection XNAT files it under its default one. The format
/// falls back to the upper-cased extension unless the upload is an archive
/// to be extracted.
#[instrument(skip(client, meta), fields(file = %file.display()))]
pub async fn add_resource_file(
    client: &XnatClient,
    kind: EntityType,
    id: &str,
    file: &Path,
    collection: Option<&str>,
    meta: &ResourceMeta,
    extract: bool,
) -> Result<u16> {
    let root = match collection {
        Some(collection) => paths::entity_resource(kind, id, collection),
        None => paths::entity(kind, id),
    };
    let status = client.resource_status(&root).await?;
    if !matches!(status, 200 | 500) {
        return Err(XnatKitError::xnat_status(
            status,
            format!("resource {} is not reachable", client.url(&root)),
        ));
    }

    if !file.is_file() {
        return Err(XnatKitError::validation(format!(
            "not an existing file: {}",
            file.display()
        )));
    }
    let base = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = normalize_name(&base);

    let target = match collection {
        Some(collection) => paths::entity_resource_file(kind, id, collection, &name),
        None => paths::entity_file(kind, id, &name),
    };
    if client.exists(&target).await? {
        return Err(XnatKitError::xnat(format!(
            "a {kind} resource file named {name} already exists"
        )));
    }

    let extension = file
        .extension()
        .map(|e| e.to_string_lossy().to_uppercase())
        .filter(|e| !e.is_empty() && !extract);
    let mut query = meta.query(extension);
    if extract {
        query.push(("extract", "true".into()));
    }
    let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let status = client.put_file(&target, file, &query).await?;
    info!(name, "resource file uploaded");
    Ok(status)
}

/// Archive `opts.input` under an entity.
///
/// A file goes to the named collection (or `UNSPECIFIED`), reusing it if
/// present. A directory is zipped and extracted server-side into a fresh
/// collection named after the option or the directory.
#[instrument(skip_all, fields(kind = %opts.kind, id = %opts.id, input = %opts.input.display()))]
pub async fn archive_input(
    client: &XnatClient,
    opts: &ResourceOptions,
    progress: &dyn ProgressReporter,
) -> Result<String> {
    let meta = ResourceMeta::default();

    if opts.input.is_file() {
        let label = opts.collection.clone().unwrap_or_else(|| {
            warn!("no resource collection given, using {UNSPECIFIED_COLLECTION}");
            UNSPECIFIED_COLLECTION.to_string()
        });
        progress.phase("Creating resource collection");
        let collection =
            create_resource_collection(client, opts.kind, &opts.id, &label, &meta, false).await?;
        progress.phase("Uploading file");
        add_resource_file(
            client,
            opts.kind,
            &opts.id,
            &opts.input,
            Some(&collection),
            &meta,
            false,
        )
        .await?;
        progress.done(&format!("file archived in {label}"));
        return Ok(collection);
    }

    if !opts.input.is_dir() {
        return Err(XnatKitError::validation(format!(
            "input not found: {}",
            opts.input.display()
        )));
    }

    let dir_name = normalize_name(
        &opts
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let label = opts.collection.clone().unwrap_or_else(|| {
        warn!(label = %dir_name, "no resource collection given, using the directory name");
        dir_name.clone()
    });

    progress.phase("Creating resource collection");
    let collection =
        create_resource_collection(client, opts.kind, &opts.id, &label, &meta, true).await?;

    progress.phase("Compressing directory");
    let temp = tempfile::tempdir().map_err(|e| XnatKitError::io(std::env::temp_dir(), e))?;
    let archive = temp.path().join(format!("{dir_name}.zip"));
    let files = zip_directory(&opts.input, &archive)?;
    info!(files, archive = %archive.display(), "directory compressed");

    progress.phase("Uploading archive");
    add_resource_file(
        client,
        opts.kind,
        &opts.id,
        &archive,
        Some(&collection),
        &meta,
        true,
    )
    .await?;
    progress.done(&format!("{files} files archived in {label}"));
    Ok(collection)
}

/// Deflate every file under `dir` into `dest` with paths relative to `dir`.
/// Empty directories are left out. Returns the number of files written.
pub fn zip_directory(dir: &Path, dest: &Path) -> Result<usize> {
    let out = File::create(dest).map_err(|e| XnatKitError::io(dest, e))?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| XnatKitError::io(dest, std::io::Error::other(e));

    let mut count = 0;
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            XnatKitError::io(path, std::io::Error::other(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(dir)
            .map_err(|_| XnatKitError::validation(format!("{} escapes {}", path.display(), dir.display())))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options).map_err(zip_err)?;
        let mut input = File::open(path).map_err(|e| XnatKitError::io(path, e))?;
        std::io::copy(&mut input, &mut zip).map_err(|e| XnatKitError::io(path, e))?;
        count += 1;
    }

    zip.finish().map_err(zip_err)?;
    Ok(count)
}
