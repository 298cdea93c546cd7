use std::collections::HashSet;
use std::process::ExitCode;

use tasksboard::core::clock::Clock;
use tasksboard::core::task::{Task, TaskId};
use tasksboard::markdown::{MarkdownParser, MarkdownWriter};
use tasksboard::storage::{JsonFileStore, Storage};
use tasksboard::sync::reconcile::reconcile;
use tasksboard::sync::rest::{RemoteNote, RestClient};

fn describe(task: &Task) -> String {
    let check = if task.completed { "x" } else { " " };
    let priority = task.priority.map(|p| p.as_letter()).unwrap_or("-");
    format!("[{}] {} {}", check, priority, task.content)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Ok(journal) = systemd_journal_logger::JournalLog::new() {
        if journal.with_syslog_identifier("tasksboard-sync-check".to_string()).install().is_ok() {
            log::set_max_level(log::LevelFilter::Info);
        }
    }

    let clock = Clock::system();
    let today = clock.today();
    let storage = Storage::new(JsonFileStore::new(tasksboard::config::store_path()));

    let config = match storage.load_sync_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load sync config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let local = match storage.load_tasks().await {
        Ok(tasks) => tasks,
        Err(e) => {
            eprintln!("Failed to load tasks: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let local_today: Vec<Task> = local.into_iter().filter(|t| t.is_on(today)).collect();

    println!("=== Local vs Vault for {} ===\n", today);
    println!("Sync enabled: {}, vault path: {}", config.sync_enabled, config.vault_path);
    if config.api_key.trim().is_empty() {
        println!("No API key configured");
        return ExitCode::FAILURE;
    }

    let base = match RestClient::new(&config.primary_url, &config.api_key, config.accept_invalid_certs) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut client = None;
    for url in config.endpoints() {
        let candidate = base.with_base_url(url);
        match candidate.probe().await {
            Ok(true) => {
                println!("Endpoint {}: OK", url);
                client = Some(candidate);
                break;
            }
            Ok(false) => println!("Endpoint {}: answered without success (check the API key)", url),
            Err(e) => println!("Endpoint {}: unreachable ({})", url, e),
        }
    }
    let Some(client) = client else {
        println!("\nVault unreachable");
        return ExitCode::FAILURE;
    };

    let text = match client.read_note(&config.vault_path, today).await {
        Ok(RemoteNote::Found(text)) => text,
        Ok(RemoteNote::NotFound) => {
            println!("\nNo note for today yet; {} local tasks would be pushed", local_today.len());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Failed to read note: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let remote = MarkdownParser::parse(&text, today, clock.now());
    println!("\nLocal: {} tasks, remote: {} tasks\n", local_today.len(), remote.len());

    let local_ids: HashSet<&TaskId> = local_today.iter().map(|t| &t.id).collect();
    let reconciled = reconcile(remote, &local_today, today);

    let mut matched_ids = HashSet::new();
    let mut remote_only = Vec::new();
    for task in &reconciled {
        if local_ids.contains(&task.id) {
            matched_ids.insert(task.id.clone());
        } else {
            remote_only.push(task);
        }
    }
    let local_only: Vec<&Task> = local_today.iter().filter(|t| !matched_ids.contains(&t.id)).collect();

    println!("Matched: {}", matched_ids.len());
    for task in local_today.iter().filter(|t| matched_ids.contains(&t.id)) {
        let Some(remote) = reconciled.iter().find(|r| r.id == task.id) else {
            continue;
        };
        if remote.completed != task.completed || remote.priority != task.priority {
            println!("  ~ {}  ->  {}", describe(task), describe(remote));
        }
    }

    println!("\nOnly in the vault: {}", remote_only.len());
    for task in &remote_only {
        println!("  + {}", describe(task));
    }

    println!("\nOnly local: {}", local_only.len());
    for task in &local_only {
        println!("  - {}", describe(task));
    }

    let would_write = MarkdownWriter::write_day(&local_today, today);
    println!(
        "\nA push would {}",
        if would_write == text { "leave the note unchanged" } else { "rewrite the note" }
    );

    ExitCode::SUCCESS
}
