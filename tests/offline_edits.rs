//! Local edits made while the vault is unreachable, across separate runs.

use chrono::{NaiveDate, TimeZone, Utc};
use tasksboard::app::Tasksboard;
use tasksboard::config::SyncConfig;
use tasksboard::core::clock::Clock;
use tasksboard::core::task::Task;
use tasksboard::markdown::MarkdownWriter;
use tasksboard::storage::{MemoryStore, Storage};
use tasksboard::sync::PullOutcome;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOTE_PATH: &str = "/vault/Daily/2026-10-18.md";
const CLOSED_URL: &str = "http://127.0.0.1:9";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

fn clock() -> Clock {
    Clock {
        today: || NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        now: || Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
    }
}

async fn mount_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

// debounce is long enough that only explicit flushes reach the server
fn config(primary: &str, fallback: &str) -> SyncConfig {
    SyncConfig {
        sync_enabled: true,
        api_key: "test-key".into(),
        vault_path: "Daily".into(),
        poll_interval: 50,
        debounce: 60_000,
        primary_url: primary.into(),
        fallback_url: fallback.into(),
        accept_invalid_certs: false,
    }
}

#[tokio::test]
async fn offline_edit_is_pushed_by_the_next_run() {
    let store = MemoryStore::new();
    Storage::new(&store).save_sync_config(&config(CLOSED_URL, CLOSED_URL)).await.unwrap();

    let offline = Tasksboard::open_with_clock(&store, clock()).await.unwrap();
    offline.add("Offline task", None).await.unwrap();
    assert!(!offline.flush().await.unwrap());
    drop(offline);

    let server = MockServer::start().await;
    mount_root(&server).await;
    Storage::new(&store).save_sync_config(&config(&server.uri(), CLOSED_URL)).await.unwrap();

    let mut board = Tasksboard::open_with_clock(&store, clock()).await.unwrap();
    let expected = MarkdownWriter::write_day(board.tasks().lock().await.all(), today());
    assert!(expected.contains("- [ ] Offline task\n"));

    Mock::given(method("PUT"))
        .and(path(NOTE_PATH))
        .and(body_string(expected.clone()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    // the vault now holds what was just written
    Mock::given(method("GET"))
        .and(path(NOTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(expected))
        .mount(&server)
        .await;

    assert_eq!(board.pull().await.unwrap(), PullOutcome::Unchanged);
    let active: Vec<String> = board.active().await.into_iter().map(|t| t.content).collect();
    assert_eq!(active, vec!["Offline task"]);
    assert!(!Storage::new(&store).load_sync_pending().await.unwrap());
    server.verify().await;
}

#[tokio::test]
async fn remote_note_does_not_replace_unsynced_edit() {
    let store = MemoryStore::new();
    Storage::new(&store).save_sync_config(&config(CLOSED_URL, CLOSED_URL)).await.unwrap();

    let offline = Tasksboard::open_with_clock(&store, clock()).await.unwrap();
    offline.add("Offline task", None).await.unwrap();
    assert!(!offline.flush().await.unwrap());
    drop(offline);

    // the vault answers reads but rejects writes
    let server = MockServer::start().await;
    mount_root(&server).await;
    Mock::given(method("PUT"))
        .and(path(NOTE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(NOTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(MarkdownWriter::write_document(
            today(),
            &[Task::new("Remote only", today())],
            &[],
        )))
        .mount(&server)
        .await;
    Storage::new(&store).save_sync_config(&config(&server.uri(), CLOSED_URL)).await.unwrap();

    let mut board = Tasksboard::open_with_clock(&store, clock()).await.unwrap();
    assert!(board.pull().await.is_err());

    let active: Vec<String> = board.active().await.into_iter().map(|t| t.content).collect();
    assert_eq!(active, vec!["Offline task"]);
    assert!(Storage::new(&store).load_sync_pending().await.unwrap());
}

#[tokio::test]
async fn flush_falls_back_to_the_second_endpoint() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    Mock::given(method("PUT"))
        .and(path(NOTE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    Storage::new(&store).save_sync_config(&config(CLOSED_URL, &server.uri())).await.unwrap();

    let board = Tasksboard::open_with_clock(&store, clock()).await.unwrap();
    board.add("Via the HTTP port", None).await.unwrap();

    assert!(board.flush().await.unwrap());
    let engine = board.sync().unwrap();
    assert_eq!(engine.active_endpoint(), server.uri());
    assert!(!engine.has_pending_changes());
    assert!(engine.last_synced().unwrap().contains("- [ ] Via the HTTP port\n"));
    assert!(!Storage::new(&store).load_sync_pending().await.unwrap());
    server.verify().await;
}
