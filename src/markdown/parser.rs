use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::core::task::{Priority, Task, TaskId};

use super::{ACTIVE_HEADING, COMPLETED_HEADING};

/// `- [ ] [S] Content  <!-- id:abc order:0 completed:2026-02-09T10:00:00Z -->`
static TAGGED_TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[(?P<check>[ x])\]\s*(?:\[(?P<priority>[SABC])\]\s*)?(?P<content>.+?)\s*<!--\s*id:(?P<id>\S+)\s+order:(?P<order>\d+)(?:\s+completed:(?P<completed>\S+))?\s*-->$").unwrap()
});

/// `- [ ] [S] Content` as typed by hand in the editor.
static BARE_TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[(?P<check>[ x])\]\s*(?:\[(?P<priority>[SABC])\]\s*)?(?P<content>.+)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Active,
    Completed,
}

pub struct MarkdownParser;

impl MarkdownParser {
    /// Parse a daily note into task records.
    ///
    /// Never fails: lines that match neither task grammar are skipped.
    /// Records are always placed in `today`'s partition; `now` stamps tasks
    /// that are completed but carry no completion time.
    pub fn parse(input: &str, today: NaiveDate, now: DateTime<Utc>) -> Vec<Task> {
        let mut tasks = Vec::new();
        let mut section = Section::Preamble;
        let mut order_counter: u32 = 0;

        for line in input.lines() {
            let line = line.trim();

            if line == ACTIVE_HEADING {
                section = Section::Active;
                order_counter = 0;
                continue;
            }
            if line == COMPLETED_HEADING {
                section = Section::Completed;
                order_counter = 0;
                continue;
            }

            let parsed = Self::parse_tagged_line(line, today, order_counter).or_else(|| {
                Self::parse_bare_line(line, section == Section::Completed, order_counter, today, now)
            });
            if let Some(task) = parsed {
                tasks.push(task);
                order_counter += 1;
            }
        }

        log::debug!("Parsed {} tasks from remote document", tasks.len());
        tasks
    }

    /// Lines carrying an id/order comment. The checkbox decides completion,
    /// whatever the metadata says.
    pub fn parse_tagged_line(line: &str, today: NaiveDate, order_fallback: u32) -> Option<Task> {
        let caps = TAGGED_TASK_RE.captures(line)?;
        let content = caps["content"].trim();
        if content.is_empty() {
            return None;
        }

        let completed_at = caps.name("completed").and_then(|m| {
            DateTime::parse_from_rfc3339(m.as_str())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Some(Task {
            id: TaskId::from(&caps["id"]),
            content: content.to_string(),
            priority: caps.name("priority").and_then(|m| Priority::from_letter(m.as_str())),
            completed: &caps["check"] == "x",
            order: caps["order"].parse().unwrap_or(order_fallback),
            created_at: today,
            completed_at,
        })
    }

    /// Lines without metadata. Anything under the Completed heading counts as
    /// completed, even with an unchecked box.
    pub fn parse_bare_line(
        line: &str,
        in_completed_section: bool,
        order: u32,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<Task> {
        let caps = BARE_TASK_RE.captures(line)?;
        let content = caps["content"].trim();
        if content.is_empty() {
            return None;
        }
        let completed = &caps["check"] == "x" || in_completed_section;

        Some(Task {
            id: TaskId::generate(),
            content: content.to_string(),
            priority: caps.name("priority").and_then(|m| Priority::from_letter(m.as_str())),
            completed,
            order,
            created_at: today,
            completed_at: completed.then_some(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap()
    }

    #[test]
    fn parse_bare_completed_line() {
        let input = "## Completed\n- [x] Buy milk\n";
        let tasks = MarkdownParser::parse(input, today(), now());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].content, "Buy milk");
        assert!(tasks[0].completed);
        assert_eq!(tasks[0].completed_at, Some(now()));
        assert!(!tasks[0].id.as_str().is_empty());
    }

    #[test]
    fn completed_section_overrides_unchecked_box() {
        let input = "## Completed\n- [ ] Sloppy entry\n";
        let tasks = MarkdownParser::parse(input, today(), now());
        assert!(tasks[0].completed);
        assert_eq!(tasks[0].completed_at, Some(now()));
    }

    #[test]
    fn tagged_line_trusts_checkbox_over_section() {
        let input = "\
## Completed
- [ ] [B] Reopened <!-- id:abc123 order:4 completed:2026-10-18T09:00:00Z -->
";
        let tasks = MarkdownParser::parse(input, today(), now());
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.id.as_str(), "abc123");
        assert_eq!(task.order, 4);
        assert_eq!(task.priority, Some(Priority::B));
        assert_eq!(task.content, "Reopened");
        assert!(!task.completed);
        assert_eq!(task.completed_at, Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()));
        assert_eq!(task.created_at, today());
    }

    #[test]
    fn tagged_line_without_completion_time() {
        let line = "- [x] Done thing  <!-- id:k1 order:0 -->";
        let task = MarkdownParser::parse_tagged_line(line, today(), 7).unwrap();
        assert!(task.completed);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.order, 0);
    }

    #[test]
    fn order_counter_resets_per_section() {
        let input = "\
---
date: 2026-10-18
type: daily-tasks
---
# 今日任务

## Active

- [ ] [S] First
- [ ] Second

## Completed

- [x] Third
";
        let tasks = MarkdownParser::parse(input, today(), now());
        let summary: Vec<(&str, u32, bool)> = tasks
            .iter()
            .map(|t| (t.content.as_str(), t.order, t.completed))
            .collect();
        assert_eq!(
            summary,
            vec![("First", 0, false), ("Second", 1, false), ("Third", 0, true)]
        );
        assert_eq!(tasks[0].priority, Some(Priority::S));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = "\
## Active
- [] missing space
* [ ] wrong bullet
- [X] capital x
- [ ]
random prose
- [ ]   Indented content
";
        let tasks = MarkdownParser::parse(input, today(), now());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].content, "Indented content");
        assert_eq!(tasks[0].order, 0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(MarkdownParser::parse("", today(), now()).is_empty());
    }

    #[test]
    fn priority_like_content_without_text_is_content() {
        let tasks = MarkdownParser::parse("- [ ] [A]", today(), now());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].content, "[A]");
        assert_eq!(tasks[0].priority, None);
    }

    #[test]
    fn lines_before_any_heading_are_active_by_checkbox() {
        let tasks = MarkdownParser::parse("- [x] done early\n- [ ] open early\n", today(), now());
        assert!(tasks[0].completed);
        assert!(!tasks[1].completed);
        assert_eq!(tasks[1].order, 1);
    }
}
