//! Rendering of templates for the terminal
//!
//! All renderers write to any `io::Write` so they can be tested without a
//! terminal. Color is applied after padding to keep columns aligned.

use std::io::{self, Write};

use colored::Colorize;

use crate::error::{GitignoreError, Result};
use crate::template::Template;

const HEADERS: [&str; 3] = ["NAME", "TAGS", "PATH"];

fn tags_column(template: &Template) -> String {
    if template.tags.is_empty() {
        "-".to_string()
    } else {
        template.tags.join(",")
    }
}

/// Aligned `NAME  TAGS  PATH` table
pub fn write_table<W: Write>(out: &mut W, templates: &[Template]) -> io::Result<()> {
    let rows: Vec<[String; 3]> = templates
        .iter()
        .map(|t| [t.name.clone(), tags_column(t), t.path.clone()])
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    writeln!(
        out,
        "{}  {}  {}",
        format!("{:<w$}", HEADERS[0], w = widths[0]).bold(),
        format!("{:<w$}", HEADERS[1], w = widths[1]).bold(),
        HEADERS[2].bold()
    )?;
    for [name, tags, path] in &rows {
        writeln!(
            out,
            "{}  {}  {}",
            format!("{:<w$}", name, w = widths[0]).cyan(),
            format!("{:<w$}", tags, w = widths[1]).dimmed(),
            path
        )?;
    }
    Ok(())
}

/// Pretty-printed JSON array
pub fn write_json<W: Write>(out: &mut W, templates: &[Template]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, templates)
        .map_err(|e| GitignoreError::Execution(format!("Failed to encode JSON: {}", e)))?;
    writeln!(out).map_err(|e| GitignoreError::Execution(e.to_string()))
}

/// One template's content under a `### <path>` header
pub fn write_dump<W: Write>(out: &mut W, template: &Template, content: &str) -> io::Result<()> {
    writeln!(out, "### {}", template.path)?;
    out.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        writeln!(out)?;
    }
    writeln!(out)
}
