//! Follow mode: live status lines redrawn in place until the watched tasks
//! end or the operator interrupts

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::interrupt::InterruptSource;
use crate::manager::TaskManager;
use crate::render::render_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    /// Every watched task reached Finished or Error
    AllDone,
    /// Operator stopped watching; tasks keep running
    Interrupted,
    /// Nothing matched the selection
    NoTasks,
}

pub struct StatusBoard {
    multi: MultiProgress,
    refresh: Duration,
    poll: Duration,
    color: bool,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Draws on stderr, refreshing once a second
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            refresh: Duration::from_secs(1),
            poll: Duration::from_millis(200),
            color: true,
        }
    }

    /// Draws nowhere; for callers that only need the follow semantics
    pub fn hidden(refresh: Duration) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            refresh,
            poll: refresh.min(Duration::from_millis(200)),
            color: false,
        }
    }

    /// Re-render task `id` (or every task) until all of them end or
    /// `interrupt` fires.
    ///
    /// One renderer per watched task updates its own line; a blocking
    /// listener polls `interrupt`. Both are joined before returning.
    pub async fn follow(
        &self,
        manager: &TaskManager,
        id: Option<usize>,
        interrupt: Arc<dyn InterruptSource>,
    ) -> FollowEnd {
        let watched = manager.watch_list(id).await;
        if watched.is_empty() {
            return FollowEnd::NoTasks;
        }

        let style = ProgressStyle::with_template("{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let stop = Arc::new(AtomicBool::new(false));

        let mut renderers = Vec::with_capacity(watched.len());
        for entry in watched {
            let bar = self.multi.add(ProgressBar::new(1));
            bar.set_style(style.clone());
            let stop = Arc::clone(&stop);
            let refresh = self.refresh;
            let color = self.color;
            renderers.push(tokio::spawn(async move {
                loop {
                    let snap = entry.snapshot();
                    bar.set_message(render_line(&snap, color));
                    if snap.lifecycle.is_terminal() {
                        bar.finish();
                        return;
                    }
                    if stop.load(Ordering::Acquire) {
                        bar.abandon();
                        return;
                    }
                    tokio::time::sleep(refresh).await;
                }
            }));
        }

        let listener = {
            let stop = Arc::clone(&stop);
            let poll = self.poll;
            tokio::task::spawn_blocking(move || {
                while !stop.load(Ordering::Acquire) {
                    if interrupt.poll_for_interrupt(poll) {
                        stop.store(true, Ordering::Release);
                        return true;
                    }
                }
                false
            })
        };

        for renderer in renderers {
            if let Err(e) = renderer.await {
                warn!("status line renderer failed: {e}");
            }
        }
        stop.store(true, Ordering::Release);

        match listener.await {
            Ok(true) => FollowEnd::Interrupted,
            Ok(false) => FollowEnd::AllDone,
            Err(e) => {
                warn!("interrupt listener failed: {e}");
                FollowEnd::AllDone
            }
        }
    }
}
