use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{Preferences, SyncConfig};
use crate::core::clock::Clock;
use crate::core::rollover::rollover;
use crate::core::task::{Priority, Task, TaskId};
use crate::core::task_list::TaskList;
use crate::storage::{KeyValueStore, Storage, StorageError};
use crate::sync::{PullOutcome, SharedTasks, SyncEngine, SyncError, SyncEvent};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("sync failure: {0}")]
    Sync(#[from] SyncError),
    #[error("no task matches '{0}'")]
    TaskNotFound(String),
    #[error("'{prefix}' matches {count} tasks")]
    AmbiguousId { prefix: String, count: usize },
    #[error("sync is not configured")]
    SyncDisabled,
}

/// Owns the task list, its storage, preferences and the optional sync engine,
/// and applies UI mutations to all of them.
pub struct Tasksboard<S> {
    storage: Storage<S>,
    tasks: SharedTasks,
    preferences: Preferences,
    sync_config: SyncConfig,
    sync: Option<Arc<SyncEngine>>,
    events: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    clock: Clock,
}

impl<S: KeyValueStore> Tasksboard<S> {
    pub async fn open(store: S) -> Result<Self, AppError> {
        Self::open_with_clock(store, Clock::system()).await
    }

    /// Load tasks (with retention cleanup), preferences and sync settings, run
    /// the daily rollover, and start the sync engine if configured.
    pub async fn open_with_clock(store: S, clock: Clock) -> Result<Self, AppError> {
        let storage = Storage::new(store);
        let today = clock.today();

        let mut list = TaskList::new();
        list.load(storage.load_tasks().await?, today);

        let last_run = storage.load_last_rollover().await?;
        let carried = rollover(&mut list, today, last_run);
        if carried.is_some() {
            storage.save_last_rollover(today).await?;
        }

        let preferences = storage.load_preferences().await?;
        let sync_config = storage.load_sync_config().await?;

        let mut board = Self {
            storage,
            tasks: Arc::new(tokio::sync::Mutex::new(list)),
            preferences,
            sync_config,
            sync: None,
            events: None,
            clock,
        };
        // the list may have changed through cleanup or rollover
        board.persist().await?;
        board.rebuild_sync().await?;
        Ok(board)
    }

    async fn rebuild_sync(&mut self) -> Result<(), AppError> {
        if let Some(engine) = self.sync.take() {
            engine.stop_polling();
        }
        self.events = None;

        if self.sync_config.is_active() {
            let (engine, events) = SyncEngine::with_clock(self.sync_config.clone(), self.clock)?;
            if self.storage.load_sync_pending().await? {
                log::info!("Resuming local changes not yet in the vault");
                engine.resume_pending();
            }
            self.sync = Some(engine);
            self.events = Some(events);
        } else {
            log::debug!("Sync disabled");
        }
        Ok(())
    }

    pub fn tasks(&self) -> SharedTasks {
        Arc::clone(&self.tasks)
    }

    pub fn sync(&self) -> Option<&Arc<SyncEngine>> {
        self.sync.as_ref()
    }

    fn engine(&self) -> Result<&Arc<SyncEngine>, AppError> {
        self.sync.as_ref().ok_or(AppError::SyncDisabled)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.sync_config
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    pub async fn active(&self) -> Vec<Task> {
        self.tasks.lock().await.active(self.clock.today())
    }

    pub async fn completed(&self) -> Vec<Task> {
        self.tasks.lock().await.completed(self.clock.today())
    }

    /// Resolve a full id or unique prefix.
    pub async fn resolve(&self, prefix: &str) -> Result<TaskId, AppError> {
        let list = self.tasks.lock().await;
        match list.find_by_prefix(prefix) {
            Ok(task) => Ok(task.id.clone()),
            Err(0) => Err(AppError::TaskNotFound(prefix.to_string())),
            Err(count) => Err(AppError::AmbiguousId {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    /// Clear the stored unsynced marker once the engine has nothing pending.
    async fn settle(&self) -> Result<(), AppError> {
        if let Some(engine) = &self.sync {
            if !engine.has_pending_changes() {
                self.storage.save_sync_pending(false).await?;
            }
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), AppError> {
        let snapshot = self.tasks.lock().await.all().to_vec();
        self.storage.save_tasks(&snapshot).await?;
        Ok(())
    }

    /// Persist and let the sync engine know a local edit happened.
    async fn committed(&self) -> Result<(), AppError> {
        self.persist().await?;
        self.storage.save_sync_pending(true).await?;
        if let Some(engine) = &self.sync {
            engine.notify_local_change(self.tasks());
        }
        Ok(())
    }

    pub async fn add(&self, content: &str, priority: Option<Priority>) -> Result<Task, AppError> {
        let task = self.tasks.lock().await.create(content, priority, self.clock.today());
        log::debug!("Added task {}", task.id);
        self.committed().await?;
        Ok(task)
    }

    pub async fn edit(&self, id: &TaskId, content: &str) -> Result<bool, AppError> {
        let changed = self.tasks.lock().await.update_content(id, content);
        if changed {
            self.committed().await?;
        }
        Ok(changed)
    }

    pub async fn toggle(&self, id: &TaskId) -> Result<Task, AppError> {
        let task = self
            .tasks
            .lock()
            .await
            .toggle_complete(id, self.clock.now())
            .cloned()
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))?;
        self.committed().await?;
        Ok(task)
    }

    pub async fn cycle_priority(&self, id: &TaskId) -> Result<Task, AppError> {
        let task = self
            .tasks
            .lock()
            .await
            .cycle_priority(id)
            .cloned()
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))?;
        self.committed().await?;
        Ok(task)
    }

    pub async fn delete(&self, id: &TaskId) -> Result<(), AppError> {
        if !self.tasks.lock().await.delete(id) {
            return Err(AppError::TaskNotFound(id.to_string()));
        }
        self.committed().await
    }

    pub async fn move_task(&self, id: &TaskId, index: usize) -> Result<(), AppError> {
        if !self.tasks.lock().await.move_to(id, index, self.clock.today()) {
            return Err(AppError::TaskNotFound(id.to_string()));
        }
        self.committed().await
    }

    /// Replace today's tasks with a reconciled remote view. Dropped if a
    /// local edit started after the pull was taken.
    pub async fn apply_remote(&self, tasks: Vec<Task>) -> Result<bool, AppError> {
        if self.sync.as_ref().is_some_and(|engine| engine.has_pending_changes()) {
            log::debug!("Discarding remote view, local edit pending");
            return Ok(false);
        }
        self.tasks.lock().await.replace_day(self.clock.today(), tasks);
        self.persist().await?;
        Ok(true)
    }

    /// Wait for the next sync event. `None` when sync is disabled.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.as_mut()?.recv().await
    }

    /// Apply one sync event. Returns true when the task list changed.
    pub async fn handle_event(&self, event: SyncEvent) -> Result<bool, AppError> {
        match event {
            SyncEvent::ConnectionChanged(connected) => {
                log::info!("Sync {}", if connected { "online" } else { "offline" });
                self.settle().await?;
                Ok(false)
            }
            SyncEvent::RemoteChanged(tasks) => {
                let applied = self.apply_remote(tasks).await?;
                // a debounced push may have landed since the last event
                self.settle().await?;
                Ok(applied)
            }
        }
    }

    pub async fn test_connection(&self) -> Result<bool, AppError> {
        Ok(self.engine()?.test_connection().await)
    }

    /// Push today's tasks now, regardless of the pending flag.
    pub async fn push(&self) -> Result<bool, AppError> {
        let engine = self.engine()?;
        if !engine.is_connected() && !engine.test_connection().await {
            return Ok(false);
        }
        let snapshot = self.tasks.lock().await.all().to_vec();
        let pushed = engine.push(&snapshot).await?;
        self.settle().await?;
        Ok(pushed)
    }

    /// Pull once and apply the result. Local edits still pending, including
    /// ones kept from an earlier offline session, are pushed first.
    pub async fn pull(&mut self) -> Result<PullOutcome, AppError> {
        let engine = Arc::clone(self.engine()?);
        if engine.has_pending_changes() && !self.flush().await? {
            return Ok(PullOutcome::Unavailable);
        }
        let local = self.tasks.lock().await.all().to_vec();
        let outcome = engine.pull(&local).await?;
        if let PullOutcome::Applied(tasks) = &outcome {
            // already applied here; drain the duplicate notification
            self.apply_remote(tasks.clone()).await?;
            self.drain_events();
        }
        self.settle().await?;
        Ok(outcome)
    }

    fn drain_events(&mut self) {
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                if let SyncEvent::ConnectionChanged(connected) = event {
                    log::debug!("Connection changed to {}", connected);
                }
            }
        }
    }

    /// Push any pending local edit immediately, probing both endpoints first
    /// when not connected.
    pub async fn flush(&self) -> Result<bool, AppError> {
        let Some(engine) = &self.sync else {
            return Ok(true);
        };
        if !engine.has_pending_changes() {
            self.settle().await?;
            return Ok(true);
        }
        if !engine.is_connected() && !engine.test_connection().await {
            return Ok(false);
        }
        let flushed = engine.flush(&self.tasks).await?;
        self.settle().await?;
        Ok(flushed)
    }

    pub async fn start_sync(&self) -> Result<bool, AppError> {
        Ok(self.engine()?.start_polling(self.tasks()).await)
    }

    pub fn stop_sync(&self) -> bool {
        self.sync.as_ref().is_some_and(|engine| engine.stop_polling())
    }

    /// Persist new sync settings and rebuild the engine.
    pub async fn save_sync_config(&mut self, config: SyncConfig) -> Result<(), AppError> {
        self.storage.save_sync_config(&config).await?;
        self.sync_config = config;
        self.rebuild_sync().await
    }

    pub async fn save_preferences(&mut self, preferences: Preferences) -> Result<(), AppError> {
        self.storage.save_preferences(&preferences).await?;
        self.preferences = preferences;
        Ok(())
    }

    pub async fn toggle_completed_section(&mut self) -> Result<bool, AppError> {
        let mut preferences = self.preferences.clone();
        preferences.completed_section_expanded = !preferences.completed_section_expanded;
        let expanded = preferences.completed_section_expanded;
        self.save_preferences(preferences).await?;
        Ok(expanded)
    }

    /// Run the rollover job now; a no-op if it already ran today.
    pub async fn rollover(&self) -> Result<Option<usize>, AppError> {
        let today = self.clock.today();
        let last_run = self.storage.load_last_rollover().await?;
        let carried = rollover(&mut *self.tasks.lock().await, today, last_run);
        if let Some(count) = carried {
            self.storage.save_last_rollover(today).await?;
            if count > 0 {
                self.committed().await?;
            }
        }
        Ok(carried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn fixed_clock() -> Clock {
        Clock {
            today: || NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            now: || Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        fixed_clock().now()
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let board = Tasksboard::open_with_clock(MemoryStore::new(), fixed_clock()).await.unwrap();
        let task = board.add("Write spec", Some(Priority::A)).await.unwrap();
        board.toggle(&task.id).await.unwrap();

        let stored = Storage::new(board.storage.inner()).load_tasks().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].completed);
        assert_eq!(stored[0].completed_at, Some(now()));
    }

    #[tokio::test]
    async fn open_runs_cleanup_and_rollover_once() {
        let store = MemoryStore::new();
        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let long_ago = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let mut old_done = Task::new("Old", long_ago);
        old_done.complete(now());
        let carry = Task::new("Carry me", yesterday);
        Storage::new(&store).save_tasks(&[old_done, carry]).await.unwrap();

        let board = Tasksboard::open_with_clock(store, fixed_clock()).await.unwrap();
        let active: Vec<String> = board.active().await.into_iter().map(|t| t.content).collect();
        assert_eq!(active, vec!["Carry me"]);
        assert_eq!(board.rollover().await.unwrap(), None);
        assert_eq!(board.tasks().lock().await.len(), 2);
    }

    #[tokio::test]
    async fn remote_view_replaces_today_only() {
        let board = Tasksboard::open_with_clock(MemoryStore::new(), fixed_clock()).await.unwrap();
        board.add("Local", None).await.unwrap();

        let remote = vec![Task::new("Remote", board.today())];
        assert!(board.apply_remote(remote).await.unwrap());
        let active: Vec<String> = board.active().await.into_iter().map(|t| t.content).collect();
        assert_eq!(active, vec!["Remote"]);
    }

    #[tokio::test]
    async fn resolve_reports_missing_ids() {
        let board = Tasksboard::open_with_clock(MemoryStore::new(), fixed_clock()).await.unwrap();
        assert!(matches!(board.resolve("nope").await, Err(AppError::TaskNotFound(_))));
        assert!(matches!(board.test_connection().await, Err(AppError::SyncDisabled)));
    }

    fn offline_config() -> SyncConfig {
        SyncConfig {
            sync_enabled: true,
            api_key: "key".into(),
            primary_url: "http://127.0.0.1:9".into(),
            fallback_url: "http://127.0.0.1:9".into(),
            debounce: 60_000,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn remote_view_is_dropped_while_an_edit_is_pending() {
        let store = MemoryStore::new();
        Storage::new(&store).save_sync_config(&offline_config()).await.unwrap();
        let board = Tasksboard::open_with_clock(&store, fixed_clock()).await.unwrap();
        board.add("Local", None).await.unwrap();
        board.sync().unwrap().mark_pending();

        let remote = vec![Task::new("Remote", board.today())];
        assert!(!board.apply_remote(remote).await.unwrap());
        let active: Vec<String> = board.active().await.into_iter().map(|t| t.content).collect();
        assert_eq!(active, vec!["Local"]);
        let stored = Storage::new(&store).load_tasks().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Local");
    }

    #[tokio::test]
    async fn unsynced_edits_survive_reopening() {
        let store = MemoryStore::new();
        Storage::new(&store).save_sync_config(&offline_config()).await.unwrap();

        let first = Tasksboard::open_with_clock(&store, fixed_clock()).await.unwrap();
        first.add("Offline task", None).await.unwrap();
        assert!(!first.flush().await.unwrap());
        drop(first);
        assert!(Storage::new(&store).load_sync_pending().await.unwrap());

        let second = Tasksboard::open_with_clock(&store, fixed_clock()).await.unwrap();
        assert!(second.sync().unwrap().has_pending_changes());
    }

    #[tokio::test]
    async fn completed_section_toggle_is_saved() {
        let mut board = Tasksboard::open_with_clock(MemoryStore::new(), fixed_clock()).await.unwrap();
        assert!(board.toggle_completed_section().await.unwrap());
        let stored = Storage::new(board.storage.inner()).load_preferences().await.unwrap();
        assert!(stored.completed_section_expanded);
    }
}
