use tasksboard::app::{AppError, Tasksboard};
use tasksboard::config::SyncConfig;
use tasksboard::core::task::{Priority, Task};
use tasksboard::storage::KeyValueStore;
use tasksboard::sync::{PullOutcome, SyncEvent};

pub const USAGE: &str = "\
usage: tasksboard [--debug] <command>

commands:
  list                        show today's tasks
  add <text> [--priority P]   add a task (P is S, A, B or C)
  edit <id> <text>            change a task's text
  done <id>                   toggle completion
  priority <id>               cycle priority S -> A -> B -> C -> none
  delete <id>                 delete a task
  move <id> <index>           move an active task to a position
  expand                      toggle the completed section
  config [--api-key K] [--vault-path P] [--poll-ms N] [--enable|--disable]
  test                        probe the REST endpoints
  push                        write today's note now
  pull                        read today's note now
  watch                       keep syncing until interrupted
  rollover                    carry yesterday's open tasks into today

ids may be shortened to any unique prefix";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add { content: String, priority: Option<Priority> },
    Edit { id: String, content: String },
    Done { id: String },
    Priority { id: String },
    Delete { id: String },
    Move { id: String, index: usize },
    Expand,
    Config(ConfigChange),
    Test,
    Push,
    Pull,
    Watch,
    Rollover,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub api_key: Option<String>,
    pub vault_path: Option<String>,
    pub poll_interval: Option<u64>,
    pub enabled: Option<bool>,
}

impl ConfigChange {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(self, config: &mut SyncConfig) {
        if let Some(key) = self.api_key {
            config.api_key = key;
        }
        if let Some(path) = self.vault_path {
            config.vault_path = path;
        }
        if let Some(ms) = self.poll_interval {
            config.poll_interval = ms;
        }
        if let Some(enabled) = self.enabled {
            config.sync_enabled = enabled;
        }
    }
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Self::List);
        };
        let positional = |i: usize, what: &str| -> Result<String, String> {
            rest.get(i).cloned().ok_or_else(|| format!("{} requires {}", name, what))
        };

        match name.as_str() {
            "list" | "ls" => Ok(Self::List),
            "add" => {
                let mut priority = None;
                let mut words = Vec::new();
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    if arg == "--priority" || arg == "-p" {
                        let letter = iter.next().ok_or("--priority requires a value")?;
                        priority = Some(
                            Priority::from_letter(letter).ok_or_else(|| format!("unknown priority '{}'", letter))?,
                        );
                    } else {
                        words.push(arg.as_str());
                    }
                }
                let content = words.join(" ");
                if content.trim().is_empty() {
                    return Err("add requires task text".into());
                }
                Ok(Self::Add { content, priority })
            }
            "edit" => Ok(Self::Edit {
                id: positional(0, "an id")?,
                content: rest.get(1..).map(|w| w.join(" ")).filter(|c| !c.trim().is_empty()).ok_or("edit requires new text")?,
            }),
            "done" | "toggle" => Ok(Self::Done { id: positional(0, "an id")? }),
            "priority" | "cycle" => Ok(Self::Priority { id: positional(0, "an id")? }),
            "delete" | "rm" => Ok(Self::Delete { id: positional(0, "an id")? }),
            "move" => {
                let id = positional(0, "an id")?;
                let index = positional(1, "an index")?
                    .parse()
                    .map_err(|e| format!("invalid index: {}", e))?;
                Ok(Self::Move { id, index })
            }
            "expand" => Ok(Self::Expand),
            "config" => {
                let mut change = ConfigChange::default();
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    let mut value = |flag: &str| iter.next().cloned().ok_or_else(|| format!("{} requires a value", flag));
                    match arg.as_str() {
                        "--api-key" => change.api_key = Some(value("--api-key")?),
                        "--vault-path" => change.vault_path = Some(value("--vault-path")?),
                        "--poll-ms" => {
                            let ms = value("--poll-ms")?.parse().map_err(|e| format!("invalid --poll-ms: {}", e))?;
                            change.poll_interval = Some(ms);
                        }
                        "--enable" => change.enabled = Some(true),
                        "--disable" => change.enabled = Some(false),
                        other => return Err(format!("unknown config option '{}'", other)),
                    }
                }
                Ok(Self::Config(change))
            }
            "test" => Ok(Self::Test),
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "watch" => Ok(Self::Watch),
            "rollover" => Ok(Self::Rollover),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    id.get(..8).unwrap_or(id)
}

fn format_task(task: &Task) -> String {
    let check = if task.completed { 'x' } else { ' ' };
    let priority = task.priority.map(|p| p.as_letter()).unwrap_or("-");
    format!("{}  [{}] {} {}", short_id(task), check, priority, task.content)
}

async fn print_today<S: KeyValueStore>(board: &Tasksboard<S>) {
    let active = board.active().await;
    let completed = board.completed().await;

    if active.is_empty() && completed.is_empty() {
        println!("No tasks for {}", board.today());
        return;
    }
    for task in &active {
        println!("{}", format_task(task));
    }
    if board.preferences().completed_section_expanded {
        println!("\nCompleted ({}):", completed.len());
        for task in &completed {
            println!("{}", format_task(task));
        }
    } else {
        println!("\nCompleted ({})", completed.len());
    }
}

/// Push a pending edit before a one-shot command exits.
async fn finish<S: KeyValueStore>(board: &Tasksboard<S>) -> Result<(), AppError> {
    if board.sync().is_some() && !board.flush().await? {
        println!("Vault unreachable, change kept locally");
    }
    Ok(())
}

pub async fn run<S: KeyValueStore>(board: &mut Tasksboard<S>, command: Command) -> Result<(), AppError> {
    match command {
        Command::List => print_today(board).await,
        Command::Add { content, priority } => {
            let task = board.add(&content, priority).await?;
            println!("{}", format_task(&task));
            finish(board).await?;
        }
        Command::Edit { id, content } => {
            let id = board.resolve(&id).await?;
            if !board.edit(&id, &content).await? {
                println!("Nothing to change");
            }
            finish(board).await?;
        }
        Command::Done { id } => {
            let id = board.resolve(&id).await?;
            let task = board.toggle(&id).await?;
            println!("{}", format_task(&task));
            finish(board).await?;
        }
        Command::Priority { id } => {
            let id = board.resolve(&id).await?;
            let task = board.cycle_priority(&id).await?;
            println!("{}", format_task(&task));
            finish(board).await?;
        }
        Command::Delete { id } => {
            let id = board.resolve(&id).await?;
            board.delete(&id).await?;
            finish(board).await?;
        }
        Command::Move { id, index } => {
            let id = board.resolve(&id).await?;
            board.move_task(&id, index).await?;
            finish(board).await?;
            print_today(board).await;
        }
        Command::Expand => {
            let expanded = board.toggle_completed_section().await?;
            println!("Completed section {}", if expanded { "expanded" } else { "collapsed" });
        }
        Command::Config(change) => {
            if !change.is_empty() {
                let mut config = board.sync_config().clone();
                change.apply(&mut config);
                board.save_sync_config(config).await?;
            }
            let config = board.sync_config();
            println!("enabled:       {}", config.sync_enabled);
            println!("api key:       {}", if config.api_key.is_empty() { "(none)" } else { "(set)" });
            println!("vault path:    {}", config.vault_path);
            println!("poll interval: {} ms", config.poll_interval);
            println!("endpoints:     {} , {}", config.primary_url, config.fallback_url);
        }
        Command::Test => {
            if board.test_connection().await? {
                let endpoint = board.sync().map(|e| e.active_endpoint()).unwrap_or_default();
                println!("Connected via {}", endpoint);
            } else {
                println!("Could not reach the vault");
            }
        }
        Command::Push => {
            if board.push().await? {
                println!("Pushed");
            } else {
                println!("Vault unreachable");
            }
        }
        Command::Pull => {
            board.test_connection().await?;
            match board.pull().await? {
                PullOutcome::Applied(tasks) => println!("Applied {} tasks from the vault", tasks.len()),
                PullOutcome::NotFound => println!("No note for today yet"),
                PullOutcome::Unchanged => println!("Up to date"),
                PullOutcome::Deferred => println!("Local changes pending, remote skipped"),
                PullOutcome::Unavailable => println!("Vault unreachable"),
            }
            print_today(board).await;
        }
        Command::Watch => watch(board).await?,
        Command::Rollover => match board.rollover().await? {
            Some(count) => println!("Carried {} tasks into {}", count, board.today()),
            None => println!("Rollover already ran today"),
        },
    }
    Ok(())
}

async fn watch<S: KeyValueStore>(board: &mut Tasksboard<S>) -> Result<(), AppError> {
    if !board.test_connection().await? {
        println!("Vault unreachable, will keep retrying");
    }
    // create today's note if the vault has none yet
    if board.pull().await? == PullOutcome::NotFound {
        board.push().await?;
    }
    board.start_sync().await?;
    println!("Watching, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = board.next_event() => {
                let Some(event) = event else { break };
                match &event {
                    SyncEvent::ConnectionChanged(connected) => {
                        println!("{}", if *connected { "Connected" } else { "Disconnected" });
                    }
                    SyncEvent::RemoteChanged(tasks) => {
                        println!("Remote note changed ({} tasks)", tasks.len());
                    }
                }
                if board.handle_event(event).await? {
                    print_today(board).await;
                }
            }
        }
    }

    board.stop_sync();
    finish(board).await
}
