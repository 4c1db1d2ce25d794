//! Interactive shell: each upload or download becomes a background task on
//! one shared `TaskManager`

use anyhow::{Context, Result};
use c189_api::CloudApi;
use c189_tasks::{
    CmdInfo, DownloadTask, FollowEnd, KeyInterrupt, ResubmitPrompt, StatusBoard, SubmitOutcome,
    TaskManager, TransferTask, UploadTask,
};
use c189_transfer::UploadStrategy;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{folder_label, print_listing};

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
enum ShellCommand {
    /// List a remote folder (default: the configured folder)
    Ls { folder_id: Option<String> },

    /// Create a remote folder
    Mkdir { parent_id: String, name: String },

    /// Upload a file or directory in the background
    Upload {
        path: PathBuf,
        folder_id: Option<String>,
        /// Upload even if a same-name, same-size file exists
        #[arg(long)]
        force: bool,
        /// Upload a directory's contents without creating the directory itself
        #[arg(long)]
        no_mkdir: bool,
    },

    /// Download a file (or a folder as zip) in the background
    Down {
        fid: String,
        #[arg(long)]
        zip: bool,
    },

    /// Show background tasks
    Jobs {
        id: Option<usize>,
        /// Keep redrawing until the tasks end or a key is pressed
        #[arg(short = 'f', long)]
        follow: bool,
    },

    /// Leave the shell
    #[command(alias = "exit", alias = "quit")]
    Bye,
}

/// Split a shell line into words, honouring double quotes
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_word = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                has_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

fn read_line(prompt: &str) -> io::Result<Option<String>> {
    tokio::task::block_in_place(|| {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    })
}

/// Asks on the terminal before re-running an ended task
struct StdinPrompt;

impl ResubmitPrompt for StdinPrompt {
    fn confirm_restart(&self, id: usize, _info: &CmdInfo) -> bool {
        let prompt = format!("task {id} already ended, run it again? (y) ");
        matches!(read_line(&prompt), Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y"))
    }
}

pub struct Shell {
    api: Arc<dyn CloudApi>,
    uploader: Arc<dyn UploadStrategy>,
    manager: TaskManager,
    default_folder: String,
    save_dir: PathBuf,
}

impl Shell {
    pub fn new(
        api: Arc<dyn CloudApi>,
        uploader: Arc<dyn UploadStrategy>,
        default_folder: String,
        save_dir: PathBuf,
    ) -> Self {
        Self {
            api,
            uploader,
            manager: TaskManager::new(),
            default_folder,
            save_dir,
        }
    }

    pub async fn run(&self) -> Result<()> {
        println!("c189 shell ({} upload). Type `help` for commands.", self.uploader.name());
        while let Some(line) = read_line("c189> ").context("reading command")? {
            let words = split_words(&line);
            if words.is_empty() {
                continue;
            }
            let command = match ShellLine::try_parse_from(&words) {
                Ok(parsed) => parsed.command,
                Err(e) => {
                    // Help and usage errors both land here
                    let _ = e.print();
                    continue;
                }
            };
            if command == ShellCommand::Bye {
                break;
            }
            if let Err(e) = self.dispatch(command).await {
                eprintln!("error: {e:#}");
            }
        }

        if self.manager.has_alive_task().await {
            println!("background tasks still running will stop when the shell exits");
        }
        Ok(())
    }

    async fn dispatch(&self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::Ls { folder_id } => {
                let folder = folder_id.unwrap_or_else(|| self.default_folder.clone());
                let entries = self
                    .api
                    .list_folder(&folder)
                    .await
                    .with_context(|| format!("listing folder {folder}"))?;
                print_listing(&entries);
            }
            ShellCommand::Mkdir { parent_id, name } => {
                let id = self
                    .api
                    .create_folder(&parent_id, &name)
                    .await
                    .with_context(|| format!("creating {name} under {parent_id}"))?;
                println!("{name}: {id}");
            }
            ShellCommand::Upload {
                path,
                folder_id,
                force,
                no_mkdir,
            } => {
                let meta = std::fs::metadata(&path)
                    .with_context(|| format!("no such file or directory: {}", path.display()))?;
                let folder = folder_id.unwrap_or_else(|| self.default_folder.clone());
                let mut task = UploadTask::new(self.api.clone(), self.uploader.clone());
                task.set_upload_path(path, meta.is_file(), force, !no_mkdir);
                task.set_target(folder.clone(), folder_label(&folder));
                self.submit(Arc::new(task)).await;
            }
            ShellCommand::Down { fid, zip } => {
                // Only for the display name and folder detection; the task
                // fetches its own metadata
                let (is_folder, name) = match self.api.file_info(&fid).await {
                    Ok(record) => (record.is_folder, record.name),
                    Err(_) => (false, String::new()),
                };
                let mut task = DownloadTask::new(self.api.clone(), self.save_dir.clone());
                task.set_fid(fid, !(zip || is_folder), "", name);
                self.submit(Arc::new(task)).await;
            }
            ShellCommand::Jobs { id, follow } => self.jobs(id, follow).await?,
            ShellCommand::Bye => {}
        }
        Ok(())
    }

    async fn submit(&self, task: Arc<dyn TransferTask>) {
        match self.manager.submit(task, &StdinPrompt).await {
            SubmitOutcome::Started(id) => println!("started task {id}"),
            SubmitOutcome::AlreadyRunning(id) => println!("already running as task {id}"),
            SubmitOutcome::Restarted(id) => println!("restarted task {id}"),
            SubmitOutcome::Declined(_) => {}
        }
    }

    async fn jobs(&self, id: Option<usize>, follow: bool) -> Result<()> {
        if follow {
            println!("press Enter to stop watching");
            let end = StatusBoard::new()
                .follow(&self.manager, id, Arc::new(KeyInterrupt))
                .await;
            if end == FollowEnd::NoTasks {
                println!("no such task");
            }
            return Ok(());
        }

        let mut out = io::stdout();
        match id {
            Some(id) => {
                if !self.manager.show_detail(id, &mut out, true).await? {
                    println!("no task with id {id}");
                }
            }
            None => self.manager.show_tasks(&mut out, true).await?,
        }
        Ok(())
    }
}
