use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::core::task::{Task, TaskId};

/// Recover local identity for tasks parsed from the remote note.
///
/// The note carries no ids, so each remote task is matched against today's
/// local tasks by `(content, completed)`, falling back to the same content
/// with the completion flag inverted (completed or reopened in the editor).
/// Under one key the earliest unclaimed local task wins. A local task is
/// claimed by at most one remote task per pass; unmatched remote tasks keep
/// their freshly generated ids.
pub fn reconcile(remote: Vec<Task>, local: &[Task], today: NaiveDate) -> Vec<Task> {
    let mut local_by_key: HashMap<(String, bool), Vec<&Task>> = HashMap::new();
    for task in local.iter().filter(|t| t.is_on(today)) {
        local_by_key
            .entry((task.content.clone(), task.completed))
            .or_default()
            .push(task);
    }

    let mut claimed: HashSet<TaskId> = HashSet::new();
    let mut matched = 0;

    let reconciled: Vec<Task> = remote
        .into_iter()
        .map(|remote_task| {
            let exact = (remote_task.content.clone(), remote_task.completed);
            let inverted = (remote_task.content.clone(), !remote_task.completed);

            let found = [exact, inverted].into_iter().find_map(|key| {
                local_by_key
                    .get(&key)?
                    .iter()
                    .copied()
                    .find(|local_task| !claimed.contains(&local_task.id))
            });

            match found {
                Some(local_task) => {
                    claimed.insert(local_task.id.clone());
                    matched += 1;
                    adopt_identity(remote_task, local_task)
                }
                None => {
                    log::debug!("New task from remote: {}", remote_task.content);
                    remote_task
                }
            }
        })
        .collect();

    log::debug!(
        "Reconciled {} remote tasks, {} matched local ids",
        reconciled.len(),
        matched
    );
    reconciled
}

fn adopt_identity(remote: Task, local: &Task) -> Task {
    let completed_at = if remote.completed {
        local.completed_at.or(remote.completed_at)
    } else {
        None
    };
    Task {
        id: local.id.clone(),
        created_at: local.created_at,
        completed_at,
        ..remote
    }
}
