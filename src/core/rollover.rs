use chrono::NaiveDate;
use std::collections::HashSet;

use super::task::{Task, TaskId};
use super::task_list::TaskList;

/// Copy yesterday's unfinished tasks into today.
///
/// Returns `None` when the job already ran today, otherwise the number of
/// tasks carried forward. Tasks whose content is already active today are
/// not duplicated.
pub fn rollover(list: &mut TaskList, today: NaiveDate, last_run: Option<NaiveDate>) -> Option<usize> {
    if last_run == Some(today) {
        log::debug!("Rollover already ran for {}", today);
        return None;
    }
    let Some(yesterday) = today.pred_opt() else {
        return Some(0);
    };

    let today_active: HashSet<String> = list.active(today).into_iter().map(|t| t.content).collect();
    let mut next_order = list.all().iter().map(|t| t.order + 1).max().unwrap_or(0);
    let mut carried = 0;

    for task in list.active(yesterday) {
        if today_active.contains(&task.content) {
            continue;
        }
        list.push(Task {
            id: TaskId::generate(),
            order: next_order,
            created_at: today,
            completed_at: None,
            ..task
        });
        next_order += 1;
        carried += 1;
    }

    log::info!("Rollover for {}: carried {} tasks from {}", today, carried, yesterday);
    Some(carried)
}
