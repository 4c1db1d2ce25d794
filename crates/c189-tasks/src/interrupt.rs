//! Timed interrupt polling for the live status board

use crossterm::event::{self, Event, KeyEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Something the operator can do to stop a live view.
///
/// Stopping the view never stops the tasks behind it.
pub trait InterruptSource: Send + Sync {
    /// Wait at most `timeout`; `true` once an interrupt arrived
    fn poll_for_interrupt(&self, timeout: Duration) -> bool;
}

/// Any key press on the controlling terminal.
///
/// The terminal stays in line mode, so on most terminals this fires on Enter.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyInterrupt;

impl InterruptSource for KeyInterrupt {
    fn poll_for_interrupt(&self, timeout: Duration) -> bool {
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => key.kind == KeyEventKind::Press,
                Ok(_) => false,
                Err(e) => {
                    debug!("terminal event read failed: {e}");
                    false
                }
            },
            Ok(false) => false,
            Err(e) => {
                // No terminal to listen on; keep the caller's pacing
                debug!("terminal event poll failed: {e}");
                std::thread::sleep(timeout);
                false
            }
        }
    }
}

/// Interrupt raised from code, e.g. a signal handler or a test
#[derive(Debug, Default)]
pub struct ManualInterrupt {
    fired: AtomicBool,
}

impl ManualInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.fired.store(true, Ordering::Release);
    }
}

impl InterruptSource for ManualInterrupt {
    fn poll_for_interrupt(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.fired.swap(false, Ordering::AcqRel) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }
}
