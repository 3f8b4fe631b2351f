//! strata - browse directories and archives through one virtual file system.
//!
//! Usage:
//!   strata ls PATH [--json]        List a directory, an archive, or a path inside one
//!   strata watch PATH              List PATH and report live changes
//!   strata exists DIR NAME...      Check which names exist in a directory
//!   strata cat ARCHIVE SUBPATH     Write an archive member to stdout
//!   strata pack DIR OUTPUT         Copy a directory into an archive or another directory
//!   strata --help                  Show help

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use itertools::Itertools;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use strata_core::{DEFAULT_MONITOR_IDLE, DirEntry, EntryType, ListError, VfsConfig};
use strata_list::{
    AbortOnError, Action, ArchiveFormat, DirLister, ListSource, Progress, copy_tree, create_writer,
    extract_entry, list_flat,
};
use strata_task::BackgroundPool;
use strata_vfs::{Delegate, DirType, Dispatcher, Vfs};

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Browse directories and archives through one virtual file system",
    long_about = "strata lists real directories and the inside of zip and tar archives \
                  the same way, and can follow a directory as it changes."
)]
struct Cli {
    /// Number of background worker threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Leave out entries whose names start with a dot
    #[arg(long, global = true)]
    no_hidden: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory, an archive, or a path inside an archive
    Ls {
        path: PathBuf,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a location and report live changes until interrupted
    Watch {
        path: PathBuf,

        /// Quiet time in milliseconds that closes a burst of changes
        #[arg(long, default_value_t = DEFAULT_MONITOR_IDLE.as_millis() as u64)]
        idle_ms: u64,
    },

    /// Check which names exist in a directory
    Exists {
        dir: PathBuf,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Write one archive member to stdout
    Cat { archive: PathBuf, subpath: String },

    /// Copy a directory into an archive (by extension) or a new directory
    Pack {
        dir: PathBuf,
        output: PathBuf,

        /// Skip unreadable files instead of aborting
        #[arg(long)]
        skip_errors: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = VfsConfig::builder();
    config
        .threads(cli.threads)
        .include_hidden(!cli.no_hidden)
        .monitor(false);

    match cli.command {
        Command::Ls { path, json } => {
            run_ls(&path, json, config.build()?).await?;
        }
        Command::Watch { path, idle_ms } => {
            let config = config
                .monitor(true)
                .monitor_idle(Duration::from_millis(idle_ms))
                .build()?;
            run_watch(&path, config).await?;
        }
        Command::Exists { dir, names } => {
            let missing = run_exists(&dir, &names, &config.build()?)?;
            if missing > 0 {
                std::process::exit(1);
            }
        }
        Command::Cat { archive, subpath } => {
            run_cat(&archive, &subpath, &config.build()?)?;
        }
        Command::Pack {
            dir,
            output,
            skip_errors,
        } => {
            run_pack(&dir, &output, skip_errors)?;
        }
    }

    Ok(())
}

/// How one VFS operation ended.
enum Finished {
    Done,
    Cancelled,
    Failed(String),
}

/// Delegate that only records the outcome.
#[derive(Default)]
struct Completion {
    finished: Mutex<Option<Finished>>,
}

impl Completion {
    fn is_done(&self) -> bool {
        self.finished.lock().map(|f| f.is_some()).unwrap_or(true)
    }
}

impl Delegate for Completion {
    fn new_entry(&self, _entry: &DirEntry) {}

    fn finish(&self, cancelled: bool, error: Option<&ListError>) {
        let finished = match (cancelled, error) {
            (true, _) => Finished::Cancelled,
            (false, Some(err)) => Finished::Failed(err.to_string()),
            (false, None) => Finished::Done,
        };
        if let Ok(mut slot) = self.finished.lock() {
            *slot = Some(finished);
        }
    }
}

/// Drive the dispatcher until `completion` has an outcome.
async fn wait(dispatcher: &mut Dispatcher, completion: &Completion) -> Result<()> {
    dispatcher.run_until(|| completion.is_done()).await;
    let finished = completion
        .finished
        .lock()
        .map_err(|_| eyre!("completion state poisoned"))?
        .take();
    match finished {
        Some(Finished::Done) => Ok(()),
        Some(Finished::Cancelled) => Err(eyre!("operation was cancelled")),
        Some(Finished::Failed(message)) => Err(eyre!(message)),
        None => Err(eyre!("dispatcher closed before the operation finished")),
    }
}

/// Reports each live update on stdout.
#[derive(Default)]
struct ChangePrinter {
    entries: AtomicUsize,
}

impl Delegate for ChangePrinter {
    fn new_entry(&self, _entry: &DirEntry) {
        self.entries.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, cancelled: bool, error: Option<&ListError>) {
        match (cancelled, error) {
            (true, _) => println!("update abandoned"),
            (false, Some(err)) => println!("update failed: {err}"),
            (false, None) => println!("updated: {} entries", self.entries.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Serialize)]
struct Listing<'a> {
    location: Option<DirType>,
    entries: &'a [DirEntry],
}

/// Directories first, then by name.
fn sorted(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries
        .into_iter()
        .sorted_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.file_name.cmp(&b.file_name)))
        .collect()
}

/// List a location once.
async fn run_ls(path: &Path, json: bool, config: VfsConfig) -> Result<()> {
    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config, handle)?;

    let completion = Arc::new(Completion::default());
    vfs.read(path, completion.clone());
    wait(&mut dispatcher, &completion)
        .await
        .wrap_err_with(|| format!("Failed to list {}", path.display()))?;

    let entries = sorted(vfs.visible_entries());
    if json {
        let listing = Listing {
            location: vfs.dir_type(),
            entries: &entries,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print_entries(&entries);
    }

    Ok(())
}

/// List a location, then print every live update until Ctrl-C.
async fn run_watch(path: &Path, config: VfsConfig) -> Result<()> {
    let (mut dispatcher, handle) = Dispatcher::new();
    let vfs = Vfs::new(config, handle)?;

    let completion = Arc::new(Completion::default());
    vfs.read(path, completion.clone());
    wait(&mut dispatcher, &completion)
        .await
        .wrap_err_with(|| format!("Failed to list {}", path.display()))?;

    print_entries(&sorted(vfs.visible_entries()));
    eprintln!("Watching {} (Ctrl-C to stop)...", path.display());

    vfs.on_dir_changed(|| Some(Arc::new(ChangePrinter::default()) as Arc<dyn Delegate>));
    vfs.on_deleted(|path| println!("deleted: {}", path.display()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.wrap_err("Failed to listen for Ctrl-C")?;
                break;
            }
            alive = dispatcher.run_next() => {
                if !alive {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Print whether each name exists in `dir`. Returns how many are missing.
fn run_exists(dir: &Path, names: &[String], config: &VfsConfig) -> Result<usize> {
    let pool = BackgroundPool::new(config.threads)?;
    let (tx, rx) = mpsc::channel();
    let _handle = list_flat(
        Arc::new(DirLister::from_config(config)),
        ListSource::path(dir),
        &pool,
        move |result| {
            let _ = tx.send(result);
        },
    );

    let tree = rx
        .recv()
        .wrap_err("Listing stopped without a result")?
        .wrap_err_with(|| format!("Failed to list {}", dir.display()))?;

    let mut missing = 0;
    for name in names {
        let found = tree.get_entry(name).is_some();
        if !found {
            missing += 1;
        }
        println!("{name}\t{}", if found { "yes" } else { "no" });
    }
    Ok(missing)
}

/// Stream one archive member to stdout.
fn run_cat(archive: &Path, subpath: &str, config: &VfsConfig) -> Result<()> {
    let format = ArchiveFormat::from_path(archive)
        .ok_or_else(|| eyre!("{} is not a supported archive", archive.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    extract_entry(archive, format, subpath, &mut out, config.block_size, &mut AbortOnError)
        .wrap_err_with(|| format!("Failed to extract {subpath} from {}", archive.display()))?;
    out.flush()?;
    Ok(())
}

/// Copy `dir` into `output`.
fn run_pack(dir: &Path, output: &Path, skip_errors: bool) -> Result<()> {
    let mut writer =
        create_writer(output).wrap_err_with(|| format!("Failed to create {}", output.display()))?;

    let mut skipped = 0usize;
    let mut recovery = |progress: Progress<'_>| match progress {
        Progress::Error { name, error } => {
            warn!(name, %error, "read failed");
            if skip_errors {
                skipped += 1;
                Action::Skip
            } else {
                Action::Abort
            }
        }
        _ => Action::Continue,
    };

    let written = copy_tree(dir, writer.as_mut(), &mut recovery)
        .wrap_err_with(|| format!("Failed to pack {}", dir.display()))?;
    writer.close().wrap_err("Failed to finish output")?;

    let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    eprintln!(
        "Packed {written} entries into {} ({})",
        output.display(),
        format_size(size)
    );
    if skipped > 0 {
        eprintln!("{skipped} file(s) skipped");
    }
    Ok(())
}

fn print_entries(entries: &[DirEntry]) {
    for entry in entries {
        let marker = match entry.resolved_type() {
            EntryType::Directory => "/",
            EntryType::Symlink => "@",
            EntryType::Fifo => "|",
            EntryType::Socket => "=",
            _ => "",
        };
        let size = if entry.is_dir() {
            "-".to_string()
        } else {
            format_size(entry.size())
        };
        println!("{size:>10}  {}{marker}", entry.file_name);
    }
    eprintln!("{} entries", entries.len());
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
