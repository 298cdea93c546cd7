pub mod reconcile;
pub mod rest;

use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SyncConfig;
use crate::core::clock::Clock;
use crate::core::task::Task;
use crate::core::task_list::TaskList;
use crate::markdown::{MarkdownParser, MarkdownWriter};
use reconcile::reconcile;
use rest::{RemoteNote, RestClient};

/// Task collection shared between the front end and the sync tasks.
pub type SharedTasks = Arc<tokio::sync::Mutex<TaskList>>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    UnexpectedStatus { status: StatusCode, url: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Client(String),
}

impl SyncError {
    /// The peer could not be reached at all (as opposed to answering badly).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Notifications for whoever owns the task list.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Sent only when connectivity flips.
    ConnectionChanged(bool),
    /// Today's tasks as they now stand on the remote, with local ids restored.
    RemoteChanged(Vec<Task>),
}

/// What a single pull did.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// Transport failure; state flipped to disconnected.
    Unavailable,
    /// No note for today yet.
    NotFound,
    /// Remote text equals the last-synced snapshot.
    Unchanged,
    /// Remote differs but a local edit is pending; local wins.
    Deferred,
    /// Remote changes parsed, reconciled and announced.
    Applied(Vec<Task>),
}

#[derive(Debug, Default)]
struct EngineState {
    connected: bool,
    last_synced: Option<String>,
    pending_local: bool,
    push_failed: bool,
}

struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Keeps today's tasks and the daily note in the vault consistent.
pub struct SyncEngine {
    config: SyncConfig,
    clock: Clock,
    client: Mutex<RestClient>,
    state: Mutex<EngineState>,
    events: mpsc::UnboundedSender<SyncEvent>,
    poll: Mutex<Option<PollHandle>>,
    edit_generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
        Self::with_clock(config, Clock::system())
    }

    pub fn with_clock(
        config: SyncConfig,
        clock: Clock,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
        let client = RestClient::new(&config.primary_url, &config.api_key, config.accept_invalid_certs)?;
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            config,
            clock,
            client: Mutex::new(client),
            state: Mutex::new(EngineState::default()),
            events,
            poll: Mutex::new(None),
            edit_generation: AtomicU64::new(0),
        });
        Ok((engine, receiver))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn has_pending_changes(&self) -> bool {
        lock(&self.state).pending_local
    }

    pub fn last_synced(&self) -> Option<String> {
        lock(&self.state).last_synced.clone()
    }

    /// Base URL currently used for reads and writes.
    pub fn active_endpoint(&self) -> String {
        lock(&self.client).base_url().to_string()
    }

    fn client(&self) -> RestClient {
        lock(&self.client).clone()
    }

    fn emit(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Sync event dropped, no listener");
        }
    }

    fn set_connected(&self, connected: bool) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.connected != connected;
            state.connected = connected;
            changed
        };
        if changed {
            log::info!("Vault {}", if connected { "connected" } else { "disconnected" });
            self.emit(SyncEvent::ConnectionChanged(connected));
        }
    }

    /// Probe the primary endpoint, then the fallback. The first that answers
    /// with success is used from then on.
    pub async fn test_connection(&self) -> bool {
        let current = self.client();
        for url in self.config.endpoints() {
            let candidate = current.with_base_url(url);
            match candidate.probe().await {
                Ok(true) => {
                    log::info!("Using REST endpoint {}", url);
                    *lock(&self.client) = candidate;
                    self.set_connected(true);
                    return true;
                }
                Ok(false) => log::debug!("{} answered without success", url),
                Err(e) => log::debug!("{} unreachable: {}", url, e),
            }
        }
        self.set_connected(false);
        false
    }

    /// Fetch today's note and, if it changed and no local edit is pending,
    /// hand back the reconciled tasks.
    ///
    /// Transport failures are swallowed as `Unavailable`; any other non-2xx
    /// answer is returned as an error.
    pub async fn pull(&self, local: &[Task]) -> Result<PullOutcome, SyncError> {
        let today = self.clock.today();
        let note = match self.client().read_note(&self.config.vault_path, today).await {
            Ok(note) => note,
            Err(e) if e.is_transport() => {
                log::warn!("Pull failed, vault unreachable: {}", e);
                self.set_connected(false);
                return Ok(PullOutcome::Unavailable);
            }
            Err(e) => return Err(e),
        };
        self.set_connected(true);

        let text = match note {
            RemoteNote::NotFound => {
                log::debug!("No note for {} yet", today);
                return Ok(PullOutcome::NotFound);
            }
            RemoteNote::Found(text) => text,
        };

        let reconciled = {
            let mut state = lock(&self.state);
            if state.last_synced.as_deref() == Some(text.as_str()) {
                return Ok(PullOutcome::Unchanged);
            }
            if state.pending_local {
                log::debug!("Remote changed during a local edit, keeping local");
                return Ok(PullOutcome::Deferred);
            }
            let parsed = MarkdownParser::parse(&text, today, self.clock.now());
            let reconciled = reconcile(parsed, local, today);
            state.last_synced = Some(text);
            reconciled
        };

        log::info!("Remote note changed: {} tasks", reconciled.len());
        self.emit(SyncEvent::RemoteChanged(reconciled.clone()));
        Ok(PullOutcome::Applied(reconciled))
    }

    /// Write today's tasks to the note. `Ok(false)` when the vault is
    /// unreachable.
    pub async fn push(&self, tasks: &[Task]) -> Result<bool, SyncError> {
        let today = self.clock.today();
        let generation = self.edit_generation.load(Ordering::SeqCst);
        let markdown = MarkdownWriter::write_day(tasks, today);

        match self.client().write_note(&self.config.vault_path, today, &markdown).await {
            Ok(()) => {
                {
                    let mut state = lock(&self.state);
                    state.last_synced = Some(markdown);
                    state.push_failed = false;
                    // an edit made while this push was in flight is still pending
                    if self.edit_generation.load(Ordering::SeqCst) == generation {
                        state.pending_local = false;
                    }
                }
                self.set_connected(true);
                log::debug!("Pushed note for {}", today);
                Ok(true)
            }
            Err(e) if e.is_transport() => {
                log::warn!("Push failed, vault unreachable: {}", e);
                lock(&self.state).push_failed = true;
                self.set_connected(false);
                Ok(false)
            }
            Err(e) => {
                lock(&self.state).push_failed = true;
                Err(e)
            }
        }
    }

    /// Record a local edit without scheduling a push.
    pub fn mark_pending(&self) {
        self.edit_generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).pending_local = true;
    }

    /// Restore edits left unsynced by an earlier session. They are treated
    /// like a failed push, so the poll loop retries them before pulling.
    pub fn resume_pending(&self) {
        self.mark_pending();
        lock(&self.state).push_failed = true;
    }

    /// Record a local edit and push once edits have been quiet for the
    /// debounce period. Must be called within a tokio runtime.
    pub fn notify_local_change(self: &Arc<Self>, tasks: SharedTasks) {
        self.mark_pending();
        let generation = self.edit_generation.load(Ordering::SeqCst);
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            tokio::time::sleep(engine.config.debounce()).await;
            if engine.edit_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let snapshot = tasks.lock().await.all().to_vec();
            match engine.push(&snapshot).await {
                Ok(true) => {}
                Ok(false) => log::info!("Offline, keeping local changes"),
                Err(e) => log::error!("Failed to push local changes: {}", e),
            }
        });
    }

    /// Push immediately if a local edit is pending, superseding any armed
    /// debounce timer.
    pub async fn flush(&self, tasks: &SharedTasks) -> Result<bool, SyncError> {
        if !self.has_pending_changes() {
            return Ok(true);
        }
        // bumping the generation disarms the debounce timer
        self.edit_generation.fetch_add(1, Ordering::SeqCst);
        let snapshot = tasks.lock().await.all().to_vec();
        self.push(&snapshot).await
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poll)
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Start the poll loop. The first pull completes before this returns,
    /// then one runs per poll interval. Returns false if a loop is already
    /// running.
    pub async fn start_polling(self: &Arc<Self>, tasks: SharedTasks) -> bool {
        if self.is_polling() {
            return false;
        }
        self.poll_once(&tasks).await;

        let mut slot = lock(&self.poll);
        if slot.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick is immediate and that pull already ran
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stopped.changed() => break,
                }
                engine.poll_once(&tasks).await;
                if *stopped.borrow() {
                    break;
                }
            }
            log::debug!("Poll loop stopped");
        });

        log::info!("Polling every {:?}", self.config.poll_interval());
        *slot = Some(PollHandle { stop, task });
        true
    }

    /// Stop the poll loop. A pull already in flight is allowed to finish.
    pub fn stop_polling(&self) -> bool {
        match lock(&self.poll).take() {
            Some(handle) => {
                let _ = handle.stop.send(true);
                true
            }
            None => false,
        }
    }

    async fn poll_once(&self, tasks: &SharedTasks) {
        let retry_push = {
            let state = lock(&self.state);
            state.pending_local && state.push_failed
        };
        if retry_push {
            match self.flush(tasks).await {
                Ok(true) => log::info!("Pushed local changes kept while offline"),
                Ok(false) => return,
                Err(e) => {
                    log::error!("Failed to push local changes: {}", e);
                    return;
                }
            }
        }

        let local = tasks.lock().await.all().to_vec();
        match self.pull(&local).await {
            Ok(PullOutcome::Applied(_)) | Ok(PullOutcome::Unavailable) => {}
            Ok(outcome) => log::trace!("Poll: {:?}", outcome),
            Err(e) => log::error!("Failed to check remote changes: {}", e),
        }
    }
}
