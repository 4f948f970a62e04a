//! Terminal rendering of task lists and descriptions.

use std::io::{self, Write};

use crossterm::style::Stylize;
use rsd_proto::Task;

use crate::sorting;

/// Created-time layout in the metadata column.
const CREATED_FORMAT: &str = "%b %d %Y %H:%M";

/// Presentation switches for [`render_tasks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit terminal styling.
    pub color: bool,
    /// Append each task's creation time.
    pub metadata: bool,
}

/// Writes the header and every task in display order.
///
/// # Errors
///
/// Returns any error from writing to `out`.
pub fn render_tasks<W: Write>(out: &mut W, tasks: &[Task], opts: RenderOptions) -> io::Result<()> {
    let version = format!("v{}", env!("CARGO_PKG_VERSION"));
    if opts.color {
        writeln!(out, "{} {}", "ReadySetDone".bold(), version.dim())?;
    } else {
        writeln!(out, "ReadySetDone {version}")?;
    }
    writeln!(out)?;

    let order = sorting::sorted(tasks.to_vec());
    let width = order.len().to_string().len();
    for (i, task) in order.iter().enumerate() {
        let index = format!("{:>width$}", i + 1);
        let check = if task.done { '✔' } else { ' ' };
        if opts.color {
            write!(out, "{} {check} ", index.dim())?;
            if task.pinned {
                write!(out, "{}", task.title.as_str().bold())?;
            } else {
                write!(out, "{}", task.title)?;
            }
        } else {
            write!(out, "{index} {check} {}", task.title)?;
        }
        if opts.metadata {
            let created = task.created.format(CREATED_FORMAT).to_string();
            if opts.color {
                write!(out, "  {}", created.dim())?;
            } else {
                write!(out, "  {created}")?;
            }
        }
        writeln!(out)?;
    }
    writeln!(out)
}

/// Writes a task description, or a note when there is none.
///
/// # Errors
///
/// Returns any error from writing to `out`.
pub fn render_description<W: Write>(out: &mut W, description: Option<&str>) -> io::Result<()> {
    match description {
        Some(text) if !text.is_empty() => {
            out.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                writeln!(out)?;
            }
            Ok(())
        }
        _ => writeln!(out, "(no description)"),
    }
}
