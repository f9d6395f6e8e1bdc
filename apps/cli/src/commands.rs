//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use xnatkit_client::{ClientOptions, XnatClient};
use xnatkit_core::{
    CleanupOptions, DownloadOptions, LaunchOptions, NiftiUploadOptions, ParrecUploadOptions,
    ProgressReporter, ResourceOptions, UploadSummary, archive_input, cleanup_project,
    download_project, launch_pipelines, scoped, upload_nifti, upload_parrec,
};
use xnatkit_intake::SubjectSource;
use xnatkit_mosaic::{MosaicOptions, load_volume, write_mosaic};
use xnatkit_shared::{
    AppConfig, EntityType, config_file_path, init_config, init_config_at, load_config,
    load_config_from,
};

use crate::prompt;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// xnatkit: batch utilities for an XNAT imaging archive.
#[derive(Parser)]
#[command(
    name = "xnatkit",
    version,
    about = "Upload, sweep, archive, launch and download against an XNAT server.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// XNAT base URL (e.g. https://xnat.example.org/xnat).
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// XNAT username.
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// XNAT password; prompted for when absent.
    #[arg(long, env = "XNATKIT_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Config file (defaults to ~/.xnatkit/xnatkit.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Upload a tree of NIfTI session directories.
    Nifti {
        /// Target project.
        #[arg(short, long)]
        project: String,

        /// Root directory holding one directory per session.
        #[arg(short, long)]
        input: PathBuf,

        /// Take subject labels from file names instead of directory names.
        #[arg(long)]
        name_from_files: bool,
    },

    /// Upload Philips PAR/REC recordings.
    Parrec {
        /// Target project.
        #[arg(short, long)]
        project: String,

        /// Root directory searched for .PAR files.
        #[arg(short, long)]
        input: PathBuf,

        /// Also convert to NIfTI and upload the result.
        #[arg(long)]
        nifti: bool,

        /// Also upload mosaic snapshots.
        #[arg(long)]
        snapshots: bool,
    },

    /// Render a volume as a PNG mosaic.
    Mosaic {
        /// NIfTI (.nii, .nii.gz) or PAR/REC file.
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG path.
        #[arg(short, long)]
        out: PathBuf,

        /// Tiles per row.
        #[arg(short, long)]
        columns: Option<usize>,

        /// Also write a thumbnail next to the mosaic.
        #[arg(short, long)]
        thumbnail: bool,
    },

    /// Delete reconstructions, sessions and subjects of a project.
    Cleanup {
        /// Project to sweep.
        #[arg(short, long)]
        project: String,

        /// Spare entries inserted within this many days.
        #[arg(long)]
        days_preserved: Option<u32>,

        /// Only delete reconstructions.
        #[arg(long)]
        keep_original: bool,
    },

    /// Archive a file or directory as a resource collection.
    Resource {
        /// Entity type: projects, subjects or experiments.
        #[arg(short = 't', long = "type")]
        kind: EntityType,

        /// Entity identifier.
        #[arg(long)]
        id: String,

        /// File or directory to archive.
        #[arg(short, long)]
        input: PathBuf,

        /// Resource collection label.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Launch a project pipeline for the sessions listed in a CSV file.
    Launch {
        /// Project holding the sessions.
        #[arg(short, long)]
        project: String,

        /// Pipeline name.
        #[arg(long)]
        pipeline: String,

        /// CSV file listing the sessions.
        #[arg(short, long)]
        input: PathBuf,

        /// Seconds to wait between launches (defaults to the config value).
        #[arg(long)]
        delay_secs: Option<u64>,

        /// CSV column holding session ids (defaults to the config value).
        #[arg(long)]
        column: Option<String>,
    },

    /// Download scan and reconstruction files of every MR session.
    Download {
        /// Project to download from.
        #[arg(short, long)]
        project: String,

        /// Existing output directory.
        #[arg(short, long)]
        outdir: PathBuf,

        /// Download scan files.
        #[arg(long)]
        scans: bool,

        /// Download reconstruction files.
        #[arg(long)]
        recons: bool,

        /// Only scans whose type contains this text (case-insensitive).
        #[arg(long)]
        filter: Option<String>,

        /// Store files under a directory per subject.
        #[arg(long)]
        rich_filepath: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "xnatkit=warn",
        1 => "xnatkit=info",
        2 => "xnatkit=debug",
        _ => "xnatkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match (&cli.command, &cli.config) {
        // The file `config init` is about to create need not exist yet.
        (Command::Config { action: ConfigAction::Init }, _) => AppConfig::default(),
        (_, Some(path)) => load_config_from(path)?,
        (_, None) => load_config()?,
    };

    match cli.command {
        Command::Mosaic {
            ref input,
            ref out,
            columns,
            thumbnail,
        } => cmd_mosaic(input, out, columns, thumbnail),
        Command::Config { ref action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(&cli, &config),
        },
        Command::Download { scans: false, recons: false, .. } => {
            info!("neither --scans nor --recons given, nothing to download");
            Ok(())
        }
        _ => {
            let client = XnatClient::new(&connect_options(&cli, &config)?)?;
            run_remote(cli.command, &client, &config).await
        }
    }
}

/// Commands that talk to the server, each inside one server session.
async fn run_remote(command: Command, client: &XnatClient, config: &AppConfig) -> Result<()> {
    let progress = CliProgress::new();

    match command {
        Command::Nifti {
            project,
            input,
            name_from_files,
        } => {
            let opts = NiftiUploadOptions {
                project,
                input,
                subject_source: if name_from_files {
                    SubjectSource::FileName
                } else {
                    SubjectSource::Directory
                },
                resource: config.upload.nifti_resource.clone(),
            };
            let summary = scoped(client, upload_nifti(client, &opts, &progress)).await?;
            print_upload(&summary);
        }
        Command::Parrec {
            project,
            input,
            nifti,
            snapshots,
        } => {
            let opts = ParrecUploadOptions {
                project,
                input,
                nifti,
                snapshots,
                resources: config.upload.clone(),
            };
            let summary = scoped(client, upload_parrec(client, &opts, &progress)).await?;
            print_upload(&summary);
        }
        Command::Cleanup {
            project,
            days_preserved,
            keep_original,
        } => {
            let opts = CleanupOptions {
                project,
                days_preserved,
                keep_originals: keep_original,
            };
            let summary = scoped(client, cleanup_project(client, &opts, &progress)).await?;
            println!();
            println!("  Reconstructions deleted: {}", summary.reconstructions);
            println!("  Sessions deleted:        {}", summary.sessions);
            println!("  Subjects deleted:        {}", summary.subjects);
            println!("  Sessions preserved:      {}", summary.preserved);
            println!();
        }
        Command::Resource {
            kind,
            id,
            input,
            collection,
        } => {
            let opts = ResourceOptions {
                kind,
                id,
                input,
                collection,
            };
            let collection = scoped(client, archive_input(client, &opts, &progress)).await?;
            println!("  Archived in resource collection {collection}");
        }
        Command::Launch {
            project,
            pipeline,
            input,
            delay_secs,
            column,
        } => {
            let opts = LaunchOptions {
                project,
                pipeline,
                sessions_csv: input,
                column: column.unwrap_or_else(|| config.launcher.session_column.clone()),
                delay: Duration::from_secs(delay_secs.unwrap_or(config.launcher.delay_secs)),
            };
            let summary = scoped(client, launch_pipelines(client, &opts, &progress)).await?;
            println!();
            println!("  Launched: {}", summary.launched);
            println!("  Missing:  {}", summary.missing);
            println!("  Failed:   {}", summary.failed);
            println!();
        }
        Command::Download {
            project,
            outdir,
            scans,
            recons,
            filter,
            rich_filepath,
        } => {
            let opts = DownloadOptions {
                project,
                outdir,
                scans,
                recons,
                filter,
                rich_filepath,
            };
            let summary = scoped(client, download_project(client, &opts, &progress)).await?;
            println!();
            println!("  Sessions: {}", summary.sessions);
            println!("  Archives: {}", summary.archives);
            println!("  Failed:   {}", summary.failed);
            println!();
        }
        Command::Mosaic { .. } | Command::Config { .. } => {
            return Err(eyre!("command does not use the server"));
        }
    }
    Ok(())
}

/// Server settings from flags, then the config file; the password is
/// prompted for when neither flag nor environment provide it.
fn connect_options(cli: &Cli, config: &AppConfig) -> Result<ClientOptions> {
    let host = cli
        .host
        .clone()
        .or_else(|| config.server.host.clone())
        .ok_or_else(|| eyre!("no XNAT host: pass --host or set [server].host in the config"))?;
    let user = cli
        .user
        .clone()
        .or_else(|| config.server.username.clone())
        .ok_or_else(|| eyre!("no XNAT user: pass --user or set [server].username in the config"))?;
    let password = match &cli.password {
        Some(password) => password.clone(),
        None => prompt::password(&user)?,
    };

    let mut opts = ClientOptions::new(host, user, password);
    opts.timeout_secs = config.server.timeout_secs;
    Ok(opts)
}

fn print_upload(summary: &UploadSummary) {
    println!();
    println!("  Sessions: {}", summary.sessions);
    println!("  Uploaded: {}", summary.uploaded);
    println!("  Skipped:  {}", summary.skipped);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}"));
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!(summary, "done");
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Local commands
// ---------------------------------------------------------------------------

fn cmd_mosaic(input: &Path, out: &Path, columns: Option<usize>, thumbnail: bool) -> Result<()> {
    let volume = load_volume(input)?;
    let files = write_mosaic(&volume, out, &MosaicOptions { columns, thumbnail })?;

    println!("  Mosaic:    {}", files.original.display());
    if let Some(thumb) = files.thumbnail {
        println!("  Thumbnail: {}", thumb.display());
    }
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli, config: &AppConfig) -> Result<()> {
    let mut resolved = config.clone();
    if let Some(host) = &cli.host {
        resolved.server.host = Some(host.clone());
    }
    if let Some(user) = &cli.user {
        resolved.server.username = Some(user.clone());
    }

    let source = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&resolved)?);
    Ok(())
}
