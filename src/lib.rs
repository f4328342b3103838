//! hfstage: pack, index, and push datasets to the Hugging Face Hub.
//!
//! hfstage turns a local directory into a deterministic tar archive plus a
//! JSON index of member byte ranges, and uploads both to a Hub dataset
//! repository with bounded retry. It also resolves model references (bare
//! repo IDs or Hub URLs) and downloads them.
//!
//! # Modules
//!
//! - [`archive`]: Tar packing, indexing, and ranged member reads
//! - [`upload`]: The staged upload pipeline with retry and cleanup
//! - [`hf`]: Reference resolution, the remote seam, and downloads
//! - [`config`]: Per-invocation configuration and token resolution
//! - [`error`]: Error types for hfstage operations

pub mod archive;
pub mod config;
pub mod error;
pub mod hf;
pub mod upload;

use std::path::PathBuf;
#[cfg(feature = "hub")]
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

pub use error::HfstageError;

/// The hfstage CLI application.
#[derive(Parser)]
#[command(name = "hfstage")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Resolve a model reference into repository and file path.
    Resolve(ResolveArgs),
    /// Pack a directory into a tar archive.
    Pack(PackArgs),
    /// Write the member index for a tar archive.
    Index(IndexArgs),
    /// Extract one member from an archive using its index.
    ExtractMember(ExtractMemberArgs),
    /// Download a model repository or file.
    #[cfg(feature = "hub")]
    Download(DownloadArgs),
    /// Pack, index, and upload a four-digit dataset directory.
    #[cfg(feature = "hub")]
    Upload(UploadArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Repo ID (owner/name) or huggingface.co / hf-mirror.com URL.
    reference: String,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct PackArgs {
    /// Directory to pack.
    source: PathBuf,

    /// Archive path to write.
    archive: PathBuf,

    /// Also write the member index to this path.
    #[arg(long)]
    index: Option<PathBuf>,
}

#[derive(clap::Args)]
struct IndexArgs {
    /// Tar archive to scan.
    archive: PathBuf,

    /// Index JSON path to write.
    index: PathBuf,
}

#[derive(clap::Args)]
struct ExtractMemberArgs {
    /// Tar archive to read from.
    archive: PathBuf,

    /// Index JSON written for the archive.
    index: PathBuf,

    /// Member name as recorded in the index.
    member: String,

    /// Where to write the member bytes.
    output: PathBuf,
}

#[cfg(feature = "hub")]
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Repo,
    File,
}

#[cfg(feature = "hub")]
#[derive(clap::Args)]
struct DownloadArgs {
    /// Repo ID or Hub URL.
    reference: String,

    /// Download the whole repository or only the referenced file.
    #[arg(long, value_enum, default_value = "repo")]
    mode: ModeArg,

    /// Directory to place downloaded files in.
    #[arg(long, default_value = "./huggingface_models")]
    local_dir: PathBuf,

    /// Reuse cached files instead of forcing a fresh download.
    #[arg(long)]
    reuse: bool,

    /// Hub token (falls back to HUGGINGFACE_TOKEN / HF_TOKEN).
    #[arg(long)]
    token: Option<String>,
}

#[cfg(feature = "hub")]
#[derive(clap::Args)]
struct UploadArgs {
    /// Dataset directory; its name must be exactly four digits.
    local_dir: PathBuf,

    /// Target dataset repository (owner/name).
    repo: String,

    /// Commit message (default: "Upload <id>").
    #[arg(long)]
    message: Option<String>,

    /// Hub token (falls back to HUGGINGFACE_TOKEN / HF_TOKEN).
    #[arg(long)]
    token: Option<String>,

    /// Base directory for staging (default: <cache>/staging).
    #[arg(long, env = "HFSTAGE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Total push attempts, including the first.
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    /// Seconds to wait after a failed push.
    #[arg(long, default_value_t = 300)]
    backoff_secs: u64,

    /// Double the wait after each failure (capped at one hour).
    #[arg(long)]
    exponential: bool,
}

/// Run the hfstage CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), HfstageError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Resolve(args)) => run_resolve(args),
        Some(Commands::Pack(args)) => run_pack(args),
        Some(Commands::Index(args)) => run_index(args),
        Some(Commands::ExtractMember(args)) => run_extract_member(args),
        #[cfg(feature = "hub")]
        Some(Commands::Download(args)) => run_download(args),
        #[cfg(feature = "hub")]
        Some(Commands::Upload(args)) => run_upload(args),
        None => {
            println!("hfstage {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Pack, index, and push datasets to the Hugging Face Hub.");
            println!();
            println!("Run 'hfstage --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_resolve(args: ResolveArgs) -> Result<(), HfstageError> {
    let resolved = hf::resolve::resolve_reference(&args.reference)?;

    match args.output {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "repository": resolved.repository,
                "file_path": resolved.file_path,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).map_err(std::io::Error::from)?
            );
        }
        OutputFormat::Text => {
            println!("repository: {}", resolved.repository);
            println!(
                "file_path:  {}",
                resolved.file_path.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

fn run_pack(args: PackArgs) -> Result<(), HfstageError> {
    let summary = archive::pack_directory(&args.source, &args.archive)?;
    println!(
        "Packed {} file(s) and {} director(ies) ({} bytes) into {}",
        summary.files,
        summary.directories,
        summary.payload_bytes,
        args.archive.display()
    );

    if let Some(index_path) = args.index {
        let index = archive::write_index(&args.archive, &index_path)?;
        println!(
            "Indexed {} member(s) into {}",
            index.files.len(),
            index_path.display()
        );
    }

    Ok(())
}

fn run_index(args: IndexArgs) -> Result<(), HfstageError> {
    let index = archive::write_index(&args.archive, &args.index)?;
    println!(
        "Indexed {} member(s) into {}",
        index.files.len(),
        args.index.display()
    );
    Ok(())
}

fn run_extract_member(args: ExtractMemberArgs) -> Result<(), HfstageError> {
    let index = archive::read_index(&args.index)?;
    let bytes = archive::read_member(&args.archive, &index, &args.member)?;
    std::fs::write(&args.output, &bytes)?;
    println!(
        "Wrote {} byte(s) of '{}' to {}",
        bytes.len(),
        args.member,
        args.output.display()
    );
    Ok(())
}

#[cfg(feature = "hub")]
fn run_download(args: DownloadArgs) -> Result<(), HfstageError> {
    let config = config::HubConfig::from_env();
    let client = hf::remote::HubClient::new(&config);
    let token = config.resolve_token(args.token.as_deref());

    let mode = match args.mode {
        ModeArg::Repo => hf::download::DownloadMode::Repo,
        ModeArg::File => hf::download::DownloadMode::File,
    };
    let options = hf::FetchOptions { force: !args.reuse };

    let path = hf::download::download_reference(
        &client,
        &args.reference,
        mode,
        &args.local_dir,
        options,
        token.as_deref(),
    )?;
    println!("Downloaded to {}", path.display());
    Ok(())
}

#[cfg(feature = "hub")]
fn run_upload(args: UploadArgs) -> Result<(), HfstageError> {
    let backoff = if args.exponential {
        config::Backoff::Exponential {
            initial: Duration::from_secs(args.backoff_secs),
            max: Duration::from_secs(3600),
        }
    } else {
        config::Backoff::Fixed(Duration::from_secs(args.backoff_secs))
    };

    let mut config = config::HubConfig::from_env()
        .with_retry(config::RetryPolicy::new(args.max_attempts, backoff)?);
    if let Some(dir) = args.staging_dir {
        config = config.with_staging_dir(dir);
    }

    let request = upload::UploadRequest {
        local_dir: args.local_dir,
        repo_id: args.repo,
        commit_message: args.message,
        token: args.token,
    };

    let client = hf::remote::HubClient::new(&config);
    let outcome = upload::upload_dataset(&client, &request, &config, &upload::ThreadSleeper)?;
    println!(
        "Uploaded dataset {} to {} ({} member(s), {} attempt(s))",
        outcome.dataset_id,
        request.repo_id,
        outcome.index.files.len(),
        outcome.attempts
    );
    Ok(())
}
