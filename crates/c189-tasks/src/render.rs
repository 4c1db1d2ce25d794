//! One-line task status text shared by snapshots and the live board

use crossterm::style::Stylize;

use crate::manager::{Lifecycle, TaskSnapshot};

/// Byte count in binary units, one decimal place
pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn status_word(lifecycle: Lifecycle, color: bool) -> String {
    let word = match lifecycle {
        Lifecycle::Pending => "Pending ",
        Lifecycle::Running => "Running ",
        Lifecycle::Finished => "Finished",
        Lifecycle::Error => "Error   ",
    };
    if !color {
        return word.to_string();
    }
    match lifecycle {
        Lifecycle::Pending => word.yellow().bold().to_string(),
        Lifecycle::Running => word.green().bold().to_string(),
        Lifecycle::Finished => word.blue().bold().to_string(),
        Lifecycle::Error => word.red().bold().to_string(),
    }
}

fn process_column(snap: &TaskSnapshot, color: bool) -> String {
    if snap.quick_upload && snap.lifecycle == Lifecycle::Finished {
        let text = "quick upload";
        return if color {
            text.blue().bold().to_string()
        } else {
            text.to_string()
        };
    }
    match snap.progress.percent() {
        Some(pct) => format!("{pct:5.1}%"),
        None => human_size(snap.progress.done),
    }
}

/// `[id] Status: <word> | Process: <pct> | <summary>`
pub fn render_line(snap: &TaskSnapshot, color: bool) -> String {
    format!(
        "[{}] Status: {} | Process: {} | {}",
        snap.id,
        status_word(snap.lifecycle, color),
        process_column(snap, color),
        snap.summary
    )
}
