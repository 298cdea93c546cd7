mod commands;

use tasksboard::app::Tasksboard;
use tasksboard::config;
use tasksboard::storage::JsonFileStore;

use commands::Command;

/// Log to the systemd user journal (`journalctl --user -t tasksboard -f`).
/// tasksboard targets log at info (debug when toggled), everything else at warn.
fn init_logging() {
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("tasksboard") {
                let max = if tasksboard::debug_logging() { log::LevelFilter::Debug } else { log::LevelFilter::Info };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => journal.with_syslog_identifier("tasksboard".to_string()),
        Err(e) => {
            eprintln!("journal logging unavailable: {}", e);
            return;
        }
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug_flag = args.iter().any(|a| a == "--debug");
    let args: Vec<String> = args.into_iter().filter(|a| a != "--debug").collect();

    init_logging();
    tasksboard::set_debug_logging(debug_flag);

    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, commands::USAGE);
            return std::process::ExitCode::from(2);
        }
    };

    let store = JsonFileStore::new(config::store_path());
    let mut board = match Tasksboard::open(store).await {
        Ok(board) => board,
        Err(e) => {
            eprintln!("Failed to load tasks: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };
    if board.preferences().debug_logging {
        tasksboard::set_debug_logging(true);
    }

    match commands::run(&mut board, command).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
