use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use serde::Serialize;
use tasksift_shared::{Task, TaskCollection};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::filter::{FilterKey, FilterState};
use crate::manager::FilterSelectionManager;
use crate::selection::SelectionSet;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView<'a> {
    filters: &'a FilterState,
    filtered_tasks: Option<&'a TaskCollection>,
    selected_tasks: &'a SelectionSet,
    all_selected: bool,
    all_tasks_are_selected: bool,
    some_tasks_are_selected: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip_all)]
    pub fn print_json(&self, manager: &FilterSelectionManager) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_json(&mut out, manager)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_session(&self, manager: &FilterSelectionManager) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let paint = self.color && io::stdout().is_terminal();
        self.write_session(&mut out, manager, paint)
    }

    pub fn write_json<W: Write>(
        &self,
        mut writer: W,
        manager: &FilterSelectionManager,
    ) -> anyhow::Result<()> {
        let view = SessionView {
            filters: manager.filters(),
            filtered_tasks: manager.filtered_tasks(),
            selected_tasks: manager.selected_tasks(),
            all_selected: manager.all_selected(),
            all_tasks_are_selected: manager.all_tasks_are_selected(false),
            some_tasks_are_selected: manager.some_tasks_are_selected(),
        };
        serde_json::to_writer_pretty(&mut writer, &view)?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn write_session<W: Write>(
        &self,
        mut writer: W,
        manager: &FilterSelectionManager,
        paint: bool,
    ) -> anyhow::Result<()> {
        let Some(filtered) = manager.filtered_tasks() else {
            writeln!(writer, "No tasks loaded.")?;
            return Ok(());
        };

        let headers = ["", "ID", "Status", "Priority", "Review", "Locked", "Parent"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let selected = manager.selected_tasks();
        let rows = filtered
            .task_list()
            .iter()
            .map(|task| task_row(task, selected.contains(task.id), paint))
            .collect();
        write_table(&mut writer, headers, rows)?;

        writeln!(writer)?;
        writeln!(
            writer,
            "{} of {} tasks shown, {} selected{}",
            filtered.len(),
            manager.source().map(TaskCollection::len).unwrap_or(0),
            selected.len(),
            if manager.all_tasks_are_selected(false) {
                " (all)"
            } else {
                ""
            }
        )?;

        let excluded = excluded_labels(manager.filters());
        if !excluded.is_empty() {
            writeln!(writer, "excluded: {}", excluded.join(", "))?;
        }
        Ok(())
    }
}

fn task_row(task: &Task, selected: bool, paint: bool) -> Vec<String> {
    let mark = if selected { "*" } else { "" };
    let id = task.id.to_string();
    vec![
        mark.to_string(),
        if paint { colorize(&id, "33") } else { id },
        task.status.name().to_string(),
        task.priority.name().to_string(),
        task.review_status.label().to_string(),
        task.locked_by.map(|u| u.to_string()).unwrap_or_default(),
        task.parent_id.map(|p| p.to_string()).unwrap_or_default(),
    ]
}

fn excluded_labels(filters: &FilterState) -> Vec<String> {
    let mut out = Vec::new();
    out.extend(
        filters
            .statuses
            .iter()
            .filter(|(_, on)| !on)
            .map(|(k, _)| format!("status:{}", k.label())),
    );
    out.extend(
        filters
            .review_statuses
            .iter()
            .filter(|(_, on)| !on)
            .map(|(k, _)| format!("review:{}", k.label())),
    );
    out.extend(
        filters
            .priorities
            .iter()
            .filter(|(_, on)| !on)
            .map(|(k, _)| format!("priority:{}", k.label())),
    );
    if !filters.include_locked {
        out.push("locked".to_string());
    }
    out
}

fn colorize(text: &str, code: &str) -> String {
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, &width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use tasksift_shared::{TaskPriority, TaskStatus};

    use super::*;

    fn manager() -> FilterSelectionManager {
        let page = TaskCollection::from_tasks(vec![
            Task::new(1, TaskStatus::Created, TaskPriority::High),
            Task::new(2, TaskStatus::Fixed, TaskPriority::Low),
        ]);
        FilterSelectionManager::new(FilterState::default(), None, Some(page))
    }

    #[test]
    fn session_table_marks_selection() {
        let mut manager = manager();
        manager.toggle_task_selection_by_id(2);
        manager.toggle_priority_filter(TaskPriority::Medium, false);

        let renderer = Renderer { color: false };
        let mut buf = Vec::new();
        renderer
            .write_session(&mut buf, &manager, false)
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("* 2 "));
        assert!(text.contains("2 of 2 tasks shown, 1 selected"));
        assert!(text.contains("excluded: priority:medium"));
    }

    #[test]
    fn json_view_reports_flags() {
        let mut manager = manager();
        manager.toggle_all_tasks_selection();

        let renderer = Renderer { color: false };
        let mut buf = Vec::new();
        renderer.write_json(&mut buf, &manager).expect("render");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");

        assert_eq!(value["allTasksAreSelected"], serde_json::json!(true));
        assert_eq!(value["selectedTasks"][1]["id"], serde_json::json!(2));
        assert_eq!(value["filters"]["statuses"]["fixed"], serde_json::json!(true));
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi(&colorize("12", "33")), "12");
    }
}
