use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque task identifier. Generated locally; older stores may hold ids in
/// other formats, which are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    S,
    A,
    B,
    C,
}

impl Priority {
    pub fn as_letter(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn from_letter(s: &str) -> Option<Self> {
        match s {
            "S" | "s" => Some(Self::S),
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            "C" | "c" => Some(Self::C),
            _ => None,
        }
    }

    /// Next step of the priority cycle: S → A → B → C → none → S.
    pub fn cycle(current: Option<Self>) -> Option<Self> {
        match current {
            Some(Self::S) => Some(Self::A),
            Some(Self::A) => Some(Self::B),
            Some(Self::B) => Some(Self::C),
            Some(Self::C) => None,
            None => Some(Self::S),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub content: String,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub order: u32,
    /// Day partition the task belongs to.
    pub created_at: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(content: impl Into<String>, created_at: NaiveDate) -> Self {
        let content: String = content.into();
        Self {
            id: TaskId::generate(),
            content: content.trim().to_string(),
            priority: None,
            completed: false,
            order: 0,
            created_at,
            completed_at: None,
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(now);
    }

    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) {
        if self.completed {
            self.reopen();
        } else {
            self.complete(now);
        }
    }

    pub fn cycle_priority(&mut self) {
        self.priority = Priority::cycle(self.priority);
    }

    pub fn is_on(&self, day: NaiveDate) -> bool {
        self.created_at == day
    }
}

/// Incomplete tasks of `day`, by `order` ascending.
pub fn active_for_day(tasks: &[Task], day: NaiveDate) -> Vec<Task> {
    let mut active: Vec<Task> = tasks
        .iter()
        .filter(|t| t.is_on(day) && !t.completed)
        .cloned()
        .collect();
    active.sort_by_key(|t| t.order);
    active
}

/// Completed tasks of `day`, most recently completed first. The sort is
/// stable; a missing `completed_at` sorts last.
pub fn completed_for_day(tasks: &[Task], day: NaiveDate) -> Vec<Task> {
    let mut completed: Vec<Task> = tasks
        .iter()
        .filter(|t| t.is_on(day) && t.completed)
        .cloned()
        .collect();
    completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    completed
}
