use chrono::NaiveDate;

use crate::core::task::{Task, active_for_day, completed_for_day};

use super::{ACTIVE_HEADING, COMPLETED_HEADING, DOCUMENT_TITLE, DOCUMENT_TYPE};

/// Writes the daily note that is pushed to the vault.
pub struct MarkdownWriter;

impl MarkdownWriter {
    /// Serialize the `today` partition of `tasks`: active by order, completed
    /// most-recent first.
    pub fn write_day(tasks: &[Task], today: NaiveDate) -> String {
        let active = active_for_day(tasks, today);
        let completed = completed_for_day(tasks, today);
        Self::write_document(today, &active, &completed)
    }

    /// Write a complete document from already-sorted sections.
    pub fn write_document(date: NaiveDate, active: &[Task], completed: &[Task]) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("date: {}\n", date.format("%Y-%m-%d")));
        out.push_str(&format!("type: {}\n", DOCUMENT_TYPE));
        out.push_str("---\n");
        out.push_str(&format!("# {}\n\n", DOCUMENT_TITLE));

        out.push_str(ACTIVE_HEADING);
        out.push_str("\n\n");
        for task in active {
            out.push_str(&Self::write_task(task));
            out.push('\n');
        }

        out.push('\n');
        out.push_str(COMPLETED_HEADING);
        out.push_str("\n\n");
        for task in completed {
            out.push_str(&Self::write_task(task));
            out.push('\n');
        }

        out
    }

    /// `- [x] [A] content`. No id or order metadata is written.
    pub fn write_task(task: &Task) -> String {
        let check = if task.completed { 'x' } else { ' ' };
        match task.priority {
            Some(priority) => format!("- [{}] [{}] {}", check, priority.as_letter(), task.content.trim()),
            None => format!("- [{}] {}", check, task.content.trim()),
        }
    }
}
