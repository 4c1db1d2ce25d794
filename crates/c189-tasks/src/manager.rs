//! Registry of every task submitted in this process

use c189_core::{TaskKind, TaskProgress};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::render::render_line;
use crate::task::{CmdInfo, FileCount, TransferTask};

/// Where a task is in its life, derived from liveness, progress, and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Admitted, nothing reported yet
    Pending,
    Running,
    Finished,
    Error,
}

impl Lifecycle {
    /// A stopped task is only `Finished` when it reached its total without
    /// recording an error.
    pub fn derive(alive: bool, progress: &TaskProgress, has_errors: bool) -> Self {
        if alive {
            if *progress == TaskProgress::default() {
                Lifecycle::Pending
            } else {
                Lifecycle::Running
            }
        } else if has_errors || !progress.is_complete() {
            Lifecycle::Error
        } else {
            Lifecycle::Finished
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Finished | Lifecycle::Error)
    }
}

/// Point-in-time copy of one registry entry
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: usize,
    pub kind: TaskKind,
    pub lifecycle: Lifecycle,
    pub progress: TaskProgress,
    pub count: Option<FileCount>,
    pub quick_upload: bool,
    pub summary: String,
    pub errors: Vec<String>,
}

impl TaskSnapshot {
    fn capture(id: usize, task: &dyn TransferTask, alive: &AtomicBool) -> Self {
        // Liveness first: a task seen as stopped has already published its
        // final progress
        let alive = alive.load(Ordering::Acquire);
        let progress = task.progress();
        let errors = task.errors();
        Self {
            id,
            kind: task.kind(),
            lifecycle: Lifecycle::derive(alive, &progress, !errors.is_empty()),
            progress,
            count: task.count(),
            quick_upload: task.quick_upload(),
            summary: task.summary(),
            errors,
        }
    }
}

/// Asked before re-running an operation that already ended
pub trait ResubmitPrompt: Send + Sync {
    fn confirm_restart(&self, id: usize, info: &CmdInfo) -> bool;
}

impl<F> ResubmitPrompt for F
where
    F: Fn(usize, &CmdInfo) -> bool + Send + Sync,
{
    fn confirm_restart(&self, id: usize, info: &CmdInfo) -> bool {
        self(id, info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New registry entry
    Started(usize),
    /// Same operation still running under this id; submission dropped
    AlreadyRunning(usize),
    /// Ended operation re-run under its old id
    Restarted(usize),
    /// Ended operation, restart refused; submission dropped
    Declined(usize),
}

impl SubmitOutcome {
    pub fn id(self) -> usize {
        match self {
            SubmitOutcome::Started(id)
            | SubmitOutcome::AlreadyRunning(id)
            | SubmitOutcome::Restarted(id)
            | SubmitOutcome::Declined(id) => id,
        }
    }
}

/// Clears the alive flag however the task's future ends
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Slot {
    task: Arc<dyn TransferTask>,
    /// Dedup key, computed once at admission
    key: CmdInfo,
    alive: Arc<AtomicBool>,
}

impl Slot {
    fn start(task: Arc<dyn TransferTask>, key: CmdInfo) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let guard = AliveGuard(Arc::clone(&alive));
        let runner = Arc::clone(&task);
        tokio::spawn(async move {
            let _guard = guard;
            runner.run().await;
        });
        Self { task, key, alive }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// Handle the status board keeps for each watched task
#[derive(Clone)]
pub(crate) struct Watched {
    pub(crate) id: usize,
    task: Arc<dyn TransferTask>,
    alive: Arc<AtomicBool>,
}

impl Watched {
    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::capture(self.id, self.task.as_ref(), &self.alive)
    }
}

/// Owns every task submitted during this process; entries are never removed.
///
/// Each admitted task runs on its own tokio task and keeps running when
/// nobody is watching it.
#[derive(Default)]
pub struct TaskManager {
    slots: RwLock<Vec<Slot>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `task` unless the same operation is already registered.
    ///
    /// The restart prompt runs with no lock held, so the board and other
    /// readers keep working while it waits. Must be called from within a
    /// tokio runtime.
    pub async fn submit(
        &self,
        task: Arc<dyn TransferTask>,
        prompt: &dyn ResubmitPrompt,
    ) -> SubmitOutcome {
        let key = task.cmd_info();
        loop {
            let existing = {
                let slots = self.slots.read().await;
                find_slot(&slots, &key).map(|id| (id, slots[id].is_alive()))
            };

            match existing {
                Some((id, true)) => {
                    info!(id, kind = %key.kind, source = %key.source, "task already running");
                    return SubmitOutcome::AlreadyRunning(id);
                }
                Some((id, false)) => {
                    if !prompt.confirm_restart(id, &key) {
                        debug!(id, "restart declined");
                        return SubmitOutcome::Declined(id);
                    }
                    let mut slots = self.slots.write().await;
                    // Ids are stable and keep their key; only liveness can
                    // change while the prompt waits
                    if slots[id].is_alive() {
                        return SubmitOutcome::AlreadyRunning(id);
                    }
                    info!(id, kind = %key.kind, source = %key.source, "task restarted");
                    slots[id] = Slot::start(task, key);
                    return SubmitOutcome::Restarted(id);
                }
                None => {
                    let mut slots = self.slots.write().await;
                    if find_slot(&slots, &key).is_some() {
                        // Admitted between the two locks; decide again
                        continue;
                    }
                    let id = slots.len();
                    info!(id, kind = %key.kind, source = %key.source, target = %key.target, "task started");
                    slots.push(Slot::start(task, key));
                    return SubmitOutcome::Started(id);
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Any task still executing
    pub async fn has_alive_task(&self) -> bool {
        self.slots.read().await.iter().any(Slot::is_alive)
    }

    pub async fn snapshot(&self, id: usize) -> Option<TaskSnapshot> {
        let slots = self.slots.read().await;
        slots
            .get(id)
            .map(|slot| TaskSnapshot::capture(id, slot.task.as_ref(), &slot.alive))
    }

    pub async fn snapshots(&self) -> Vec<TaskSnapshot> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .enumerate()
            .map(|(id, slot)| TaskSnapshot::capture(id, slot.task.as_ref(), &slot.alive))
            .collect()
    }

    /// One line per task
    pub async fn show_tasks<W: Write>(&self, out: &mut W, color: bool) -> io::Result<()> {
        let snaps = self.snapshots().await;
        write_table(&snaps, out, color)
    }

    /// Status line plus the error list; `false` for an unknown id
    pub async fn show_detail<W: Write>(
        &self,
        id: usize,
        out: &mut W,
        color: bool,
    ) -> io::Result<bool> {
        match self.snapshot(id).await {
            Some(snap) => {
                write_detail(&snap, out, color)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handles for the status board: one task, or all of them
    pub(crate) async fn watch_list(&self, id: Option<usize>) -> Vec<Watched> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .enumerate()
            .filter(|(i, _)| id.map_or(true, |want| want == *i))
            .map(|(i, slot)| Watched {
                id: i,
                task: Arc::clone(&slot.task),
                alive: Arc::clone(&slot.alive),
            })
            .collect()
    }
}

fn find_slot(slots: &[Slot], key: &CmdInfo) -> Option<usize> {
    slots.iter().position(|slot| slot.key == *key)
}

const RULE_WIDTH: usize = 100;

pub fn write_table<W: Write>(snaps: &[TaskSnapshot], out: &mut W, color: bool) -> io::Result<()> {
    if snaps.is_empty() {
        return writeln!(out, "no background tasks");
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for snap in snaps {
        writeln!(out, "{}", render_line(snap, color))?;
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}

pub fn write_detail<W: Write>(snap: &TaskSnapshot, out: &mut W, color: bool) -> io::Result<()> {
    writeln!(out, "{}", render_line(snap, color))?;
    if !snap.errors.is_empty() {
        writeln!(out, "Error Messages:")?;
        for message in &snap.errors {
            writeln!(out, "{message}")?;
        }
    }
    Ok(())
}
