//! c189: Cloud189 drive client
//!
//! Usage:
//!   c189 upload <path> [folder_id] [--force] [--no-mkdir]
//!   c189 down <fid> [--zip] [-o <dir>]
//!   c189 ls [folder_id]
//!   c189 mkdir <parent_id> <name>
//!   c189 shell
//!   c189 config show
//!
//! One-shot commands run in the foreground with a progress bar. `shell`
//! runs transfers as background tasks that `jobs` can inspect or follow.

mod settings;
mod shell;

use anyhow::{bail, Context, Result};
use c189_api::{CloudApi, HttpSession};
use c189_core::config::C189Config;
use c189_core::{FileRecord, ProgressEvent, ProgressFn, TransferCode};
use c189_tasks::human_size;
use c189_transfer::{
    down_dir_zip_by_id, down_file_by_id, select_uploader, upload_dir, DirUploadOptions,
    FileErrorFn, UploadStrategy,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::settings::{apply_env_overrides, env_lookup, expand_tilde, load_config, masked};
use crate::shell::Shell;

/// Folder id the service uses for the drive root
const ROOT_FOLDER: &str = "-11";

#[derive(Parser, Debug)]
#[command(name = "c189", version, about = "Cloud189 drive client")]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "C189_CONFIG",
        default_value = "~/.config/c189/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "C189_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "C189_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file or directory
    Upload {
        /// Local file or directory
        path: PathBuf,
        /// Remote folder id (default: transfer.default_folder_id)
        folder_id: Option<String>,
        /// Upload even if a same-name, same-size file exists
        #[arg(long)]
        force: bool,
        /// Upload a directory's contents without creating the directory itself
        #[arg(long)]
        no_mkdir: bool,
    },

    /// Download a file, or a folder as a zip archive
    Down {
        /// Remote file or folder id
        fid: String,
        /// Download a folder as one zip archive
        #[arg(long)]
        zip: bool,
        /// Local directory to save into (default: transfer.save_dir)
        #[arg(long, short = 'o')]
        save_dir: Option<PathBuf>,
    },

    /// List a remote folder
    Ls {
        /// Remote folder id (default: transfer.default_folder_id)
        folder_id: Option<String>,
    },

    /// Create a remote folder
    Mkdir { parent_id: String, name: String },

    /// Interactive shell with background transfers
    Shell,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration (secrets masked)
    Show,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = expand_tilde(&cli.config);
    let mut config = load_config(&config_path).await?;
    apply_env_overrides(&mut config, env_lookup);

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "c189 starting"
    );

    if let Commands::Config {
        action: ConfigAction::Show,
    } = &cli.command
    {
        return cmd_config_show(&config, &config_path);
    }

    let session = HttpSession::new(&config.api, &config.session)
        .context("building HTTP session")?;
    let api: Arc<dyn CloudApi> = Arc::new(session);
    let uploader = select_uploader(api.clone(), config.transfer.skip_checksum);
    info!(uploader = uploader.name(), "session ready");

    let default_folder = config.transfer.default_folder_id.clone();

    match cli.command {
        Commands::Upload {
            path,
            folder_id,
            force,
            no_mkdir,
        } => {
            let folder = folder_id.unwrap_or(default_folder);
            cmd_upload(api.as_ref(), uploader.as_ref(), &path, &folder, force, !no_mkdir).await
        }
        Commands::Down { fid, zip, save_dir } => {
            let dir = save_dir.unwrap_or_else(|| config.transfer.save_dir.clone());
            cmd_down(api.as_ref(), &fid, zip, &expand_tilde(&dir)).await
        }
        Commands::Ls { folder_id } => {
            let folder = folder_id.unwrap_or(default_folder);
            let entries = api
                .list_folder(&folder)
                .await
                .with_context(|| format!("listing folder {folder}"))?;
            print_listing(&entries);
            Ok(())
        }
        Commands::Mkdir { parent_id, name } => {
            let id = api
                .create_folder(&parent_id, &name)
                .await
                .with_context(|| format!("creating {name} under {parent_id}"))?;
            println!("{name}: {id}");
            Ok(())
        }
        Commands::Shell => {
            let save_dir = expand_tilde(&config.transfer.save_dir);
            Shell::new(api, uploader, default_folder, save_dir).run().await
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout belongs to listings and the task board
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_upload(
    api: &dyn CloudApi,
    uploader: &dyn UploadStrategy,
    path: &Path,
    folder_id: &str,
    force: bool,
    create_root_dir: bool,
) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("no such file or directory: {}", path.display()))?;

    let pb = make_progress_bar("upload");
    let progress = bar_progress(&pb);

    if meta.is_file() {
        let outcome = uploader
            .upload_file(path, folder_id, force, Some(&progress))
            .await;
        pb.finish_and_clear();
        if !outcome.is_success() {
            bail!("upload failed: {} -> {}", outcome.code, path.display());
        }
        let how = if outcome.quick_upload { " (quick upload)" } else { "" };
        println!("{} -> {}{how}", path.display(), folder_label(folder_id));
        return Ok(());
    }

    let bar = pb.clone();
    let on_error: Box<FileErrorFn> = Box::new(move |file: &Path, code: TransferCode| {
        bar.println(format!("  failed: {} ({code})", file.display()));
    });
    let report = upload_dir(
        api,
        uploader,
        path,
        folder_id,
        DirUploadOptions {
            force,
            create_root_dir,
        },
        Some(&progress),
        Some(on_error.as_ref()),
    )
    .await;
    pb.finish_and_clear();

    if !report.code.is_success() {
        bail!("folder upload failed: {} -> {}", report.code, path.display());
    }
    let failed = report.failed_files().count();
    println!(
        "{} -> {}: {} file(s), {failed} failed",
        path.display(),
        folder_label(folder_id),
        report.outcomes.len()
    );
    if failed > 0 {
        bail!("{failed} file(s) failed to upload");
    }
    Ok(())
}

async fn cmd_down(api: &dyn CloudApi, fid: &str, zip: bool, save_dir: &Path) -> Result<()> {
    let pb = make_progress_bar("download");
    let progress = bar_progress(&pb);

    let code = if zip {
        down_dir_zip_by_id(api, fid, save_dir, Some(&progress)).await
    } else {
        down_file_by_id(api, fid, save_dir, Some(&progress)).await
    };
    pb.finish_and_clear();

    if !code.is_success() {
        bail!("download failed: {code} -> {fid}");
    }
    println!("{fid} -> {}", save_dir.display());
    Ok(())
}

fn cmd_config_show(config: &C189Config, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(&masked(config)).context("serializing config")?;
    print!("{rendered}");
    Ok(())
}

// ── Output helpers ───────────────────────────────────────────────────────────

/// Display name for a remote folder id
pub(crate) fn folder_label(id: &str) -> String {
    if id == ROOT_FOLDER {
        "/".to_string()
    } else {
        format!("folder {id}")
    }
}

pub(crate) fn print_listing(entries: &[FileRecord]) {
    if entries.is_empty() {
        println!("(empty)");
        return;
    }
    for entry in entries {
        let size = if entry.is_folder {
            "-".to_string()
        } else {
            human_size(entry.size)
        };
        let slash = if entry.is_folder { "/" } else { "" };
        println!("{:<20} {:>10}  {}{slash}", entry.id, size, entry.name);
    }
}

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}"
        )
        .unwrap()
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

/// Drive `pb` from transfer progress events
fn bar_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Arc::new(move |event: &ProgressEvent| match event {
        ProgressEvent::Checking { name } => {
            pb.set_message(format!("{name}: checksum"));
        }
        ProgressEvent::Bytes { name, done, total } => {
            pb.set_length(total.unwrap_or(*done));
            pb.set_position(*done);
            pb.set_message(name.clone());
        }
        ProgressEvent::Terminal { name, tag } => {
            if tag.is_failure() {
                pb.println(format!("  {name}: {tag}"));
            }
            pb.set_message(format!("{name}: {tag}"));
        }
    })
}
