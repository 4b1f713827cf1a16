//! Plain-text listings with aligned columns.

use chrono::Local;
use std::io::{self, Write};

use crate::jira::{Issue, Sprint};

/// Write rows as columns padded to their widest cell plus one space. The
/// last column is never padded.
fn write_table<W: Write>(out: &mut W, rows: &[Vec<String>]) -> io::Result<()> {
  let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
  let mut widths = vec![0; columns];
  for row in rows {
    for (i, cell) in row.iter().enumerate().take(row.len().saturating_sub(1)) {
      widths[i] = widths[i].max(cell.chars().count());
    }
  }

  for row in rows {
    let mut line = String::new();
    for (i, cell) in row.iter().enumerate() {
      if i + 1 == row.len() {
        line.push_str(cell);
      } else {
        line.push_str(&format!("{:<width$} ", cell, width = widths[i]));
      }
    }
    writeln!(out, "{}", line)?;
  }
  Ok(())
}

/// Issues ordered by workflow position, keeping input order among equals.
fn sorted(issues: &[Issue]) -> Vec<&Issue> {
  let mut sorted: Vec<&Issue> = issues.iter().collect();
  sorted.sort_by_key(|issue| issue.rank());
  sorted
}

/// `KEY - STATUS - SUMMARY` per issue.
pub fn print_issues<W: Write>(out: &mut W, issues: &[Issue]) -> io::Result<()> {
  let rows: Vec<Vec<String>> = sorted(issues)
    .into_iter()
    .map(|issue| {
      vec![
        issue.key.clone(),
        "-".into(),
        issue.status.name.clone(),
        "-".into(),
        issue.summary.clone(),
      ]
    })
    .collect();
  write_table(out, &rows)
}

/// `N - KEY - STATUS - SUMMARY` per issue, in stored order.
///
/// `N` is the 1-based index accepted by `--epic` and `--initiative`.
pub fn print_indexed_issues<W: Write>(out: &mut W, issues: &[Issue]) -> io::Result<()> {
  let rows: Vec<Vec<String>> = issues
    .iter()
    .enumerate()
    .map(|(i, issue)| {
      vec![
        (i + 1).to_string(),
        "-".into(),
        issue.key.clone(),
        "-".into(),
        issue.status.name.clone(),
        "-".into(),
        issue.summary.clone(),
      ]
    })
    .collect();
  write_table(out, &rows)
}

/// `STATUS - KEY - SUMMARY` per issue, done issues only when asked for.
pub fn print_sprint_issues<W: Write>(
  out: &mut W,
  issues: &[Issue],
  include_done: bool,
) -> io::Result<()> {
  let rows: Vec<Vec<String>> = sorted(issues)
    .into_iter()
    .filter(|issue| include_done || !issue.status.is_done)
    .map(|issue| {
      vec![
        issue.status.name.clone(),
        "-".into(),
        issue.key.clone(),
        "-".into(),
        issue.summary.clone(),
      ]
    })
    .collect();
  write_table(out, &rows)
}

/// `N - ID - END - NAME` per sprint, end date in local time.
///
/// `N` is the 1-based index accepted by `--sprint`.
pub fn print_sprints<W: Write>(out: &mut W, sprints: &[Sprint]) -> io::Result<()> {
  let rows: Vec<Vec<String>> = sprints
    .iter()
    .enumerate()
    .map(|(i, sprint)| {
      let end = sprint
        .end_date
        .map(|end| end.with_timezone(&Local).format("%Y/%-m/%-d").to_string())
        .unwrap_or_else(|| "N/A".into());
      vec![
        (i + 1).to_string(),
        "-".into(),
        sprint.id.to_string(),
        "-".into(),
        end,
        "-".into(),
        sprint.name.clone(),
      ]
    })
    .collect();
  write_table(out, &rows)
}
