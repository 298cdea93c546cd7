use chrono::{DateTime, Days, NaiveDate, Utc};

use super::task::{Priority, Task, TaskId, active_for_day, completed_for_day};

/// Completed tasks older than this many days are purged on load.
pub const RETENTION_DAYS: u64 = 7;

/// The in-memory task collection and the mutations the UI performs on it.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection and run the retention cleanup.
    pub fn load(&mut self, tasks: Vec<Task>, today: NaiveDate) {
        self.tasks = tasks;
        self.cleanup_old(today);
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    /// Look up a task by a unique id prefix. Returns `Err(n)` with the number
    /// of matches when the prefix is missing or ambiguous.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&Task, usize> {
        if let Some(exact) = self.tasks.iter().find(|t| t.id.as_str() == prefix) {
            return Ok(exact);
        }
        let mut matches = self.tasks.iter().filter(|t| t.id.as_str().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task),
            (None, _) => Err(0),
            (Some(_), Some(_)) => Err(2 + matches.count()),
        }
    }

    pub fn for_day(&self, day: NaiveDate) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.is_on(day)).cloned().collect()
    }

    pub fn active(&self, day: NaiveDate) -> Vec<Task> {
        active_for_day(&self.tasks, day)
    }

    pub fn completed(&self, day: NaiveDate) -> Vec<Task> {
        completed_for_day(&self.tasks, day)
    }

    /// Create a task at the end of the list.
    pub fn create(&mut self, content: &str, priority: Option<Priority>, today: NaiveDate) -> Task {
        let order = self.tasks.iter().map(|t| t.order + 1).max().unwrap_or(0);
        let mut task = Task::new(content, today);
        task.priority = priority;
        task.order = order;
        self.tasks.push(task.clone());
        task
    }

    /// Returns false when the task is missing or the trimmed content is empty
    /// or unchanged.
    pub fn update_content(&mut self, id: &TaskId, content: &str) -> bool {
        let trimmed = content.trim();
        match self.get_mut(id) {
            Some(task) if !trimmed.is_empty() && task.content != trimmed => {
                task.content = trimmed.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn set_priority(&mut self, id: &TaskId, priority: Option<Priority>) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.priority = priority;
        Some(task)
    }

    pub fn cycle_priority(&mut self, id: &TaskId) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.cycle_priority();
        Some(task)
    }

    pub fn toggle_complete(&mut self, id: &TaskId, now: DateTime<Utc>) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.toggle(now);
        Some(task)
    }

    pub fn delete(&mut self, id: &TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| &t.id != id);
        self.tasks.len() != before
    }

    pub fn reorder(&mut self, id: &TaskId, new_order: u32) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.order = new_order;
                true
            }
            None => false,
        }
    }

    /// Move an active task of `today` to `index` among today's active tasks,
    /// then normalize all orders.
    pub fn move_to(&mut self, id: &TaskId, index: usize, today: NaiveDate) -> bool {
        let mut active: Vec<TaskId> = self.active(today).into_iter().map(|t| t.id).collect();
        let Some(from) = active.iter().position(|t| t == id) else {
            return false;
        };
        let moved = active.remove(from);
        active.insert(index.min(active.len()), moved);

        for (position, task_id) in active.iter().enumerate() {
            self.reorder(task_id, position as u32);
        }
        self.normalize_orders();
        true
    }

    /// Reassign orders to 0..n following the current relative order.
    pub fn normalize_orders(&mut self) {
        let mut indices: Vec<usize> = (0..self.tasks.len()).collect();
        indices.sort_by_key(|&i| self.tasks[i].order);
        for (order, i) in indices.into_iter().enumerate() {
            self.tasks[i].order = order as u32;
        }
    }

    /// Drop completed tasks created more than `RETENTION_DAYS` before today.
    pub fn cleanup_old(&mut self, today: NaiveDate) -> usize {
        let cutoff = today.checked_sub_days(Days::new(RETENTION_DAYS)).unwrap_or(today);
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed || t.created_at >= cutoff);
        let purged = before - self.tasks.len();
        if purged > 0 {
            log::info!("Purged {} completed tasks older than {}", purged, cutoff);
        }
        purged
    }

    /// Swap the partition for `day` with `tasks`, leaving other days alone.
    pub fn replace_day(&mut self, day: NaiveDate, tasks: Vec<Task>) {
        self.tasks.retain(|t| !t.is_on(day));
        self.tasks.extend(tasks);
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
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
        Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
    }

    #[test]
    fn create_appends_after_max_order() {
        let mut list = TaskList::new();
        let a = list.create("First", None, today());
        let b = list.create("Second", Some(Priority::A), today());
        assert_eq!(a.order, 0);
        assert_eq!(b.order, 1);
        assert_eq!(b.priority, Some(Priority::A));
    }

    #[test]
    fn update_content_ignores_blank_and_unchanged() {
        let mut list = TaskList::new();
        let task = list.create("Draft", None, today());
        assert!(!list.update_content(&task.id, "   "));
        assert!(!list.update_content(&task.id, " Draft "));
        assert!(list.update_content(&task.id, " Final "));
        assert_eq!(list.get(&task.id).unwrap().content, "Final");
    }

    #[test]
    fn move_to_places_task_and_normalizes() {
        let mut list = TaskList::new();
        let a = list.create("a", None, today());
        let b = list.create("b", None, today());
        let c = list.create("c", None, today());

        assert!(list.move_to(&c.id, 0, today()));
        let order: Vec<String> = list.active(today()).into_iter().map(|t| t.content).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(list.get(&c.id).unwrap().order, 0);
        assert_eq!(list.get(&a.id).unwrap().order, 1);
        assert_eq!(list.get(&b.id).unwrap().order, 2);
    }

    #[test]
    fn cleanup_purges_only_old_completed() {
        let old_day = today().checked_sub_days(Days::new(8)).unwrap();
        let edge_day = today().checked_sub_days(Days::new(7)).unwrap();

        let mut old_done = Task::new("old done", old_day);
        old_done.complete(now());
        let old_open = Task::new("old open", old_day);
        let mut edge_done = Task::new("edge done", edge_day);
        edge_done.complete(now());

        let mut list = TaskList::new();
        list.load(vec![old_done, old_open, edge_done], today());

        let names: Vec<&str> = list.all().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(names, vec!["old open", "edge done"]);
    }

    #[test]
    fn replace_day_keeps_other_partitions() {
        let yesterday = today().pred_opt().unwrap();
        let mut list = TaskList::new();
        list.push(Task::new("yesterday", yesterday));
        list.create("stale", None, today());

        list.replace_day(today(), vec![Task::new("fresh", today())]);
        let names: Vec<&str> = list.all().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(names, vec!["yesterday", "fresh"]);
    }

    #[test]
    fn find_by_prefix_reports_ambiguity() {
        let mut list = TaskList::new();
        let mut a = Task::new("a", today());
        a.id = TaskId::from("abc1");
        let mut b = Task::new("b", today());
        b.id = TaskId::from("abc2");
        list.push(a);
        list.push(b);

        assert_eq!(list.find_by_prefix("abc1").unwrap().content, "a");
        assert_eq!(list.find_by_prefix("abc").unwrap_err(), 2);
        assert_eq!(list.find_by_prefix("zz").unwrap_err(), 0);
    }

    #[test]
    fn toggle_and_delete() {
        let mut list = TaskList::new();
        let task = list.create("x", None, today());
        assert!(list.toggle_complete(&task.id, now()).unwrap().completed);
        assert_eq!(list.completed(today()).len(), 1);
        assert!(list.delete(&task.id));
        assert!(!list.delete(&task.id));
        assert!(list.is_empty());
    }
}
