//! End-to-end capture through the real file sinks.

use calamine::{Reader, Xlsx, open_workbook};
use chrono::Local;
use rusqlite::Connection;
use std::time::Duration;
use tokio::sync::watch;
use ytchatx_capture::config::{OutputOptions, OutputPaths};
use ytchatx_capture::sink::MemorySink;
use ytchatx_capture::{
    Applied, CaptureSession, ChatEvent, EventSource, Result, RowHandle, Sequencer, SinkInstruction,
    SinkSet,
};

/// Hands out its batches once, then asks the session to stop.
struct Replay {
    batches: Vec<Vec<ChatEvent>>,
    stop: watch::Sender<bool>,
}

impl EventSource for Replay {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn fetch(&mut self) -> Result<Vec<ChatEvent>> {
        if self.batches.is_empty() {
            self.stop.send_replace(true);
            return Ok(Vec::new());
        }
        Ok(self.batches.remove(0))
    }
}

fn db_rows(path: &std::path::Path) -> Vec<(String, String, String, String)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT author, text, status, moderator FROM messages ORDER BY rowid")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
}

#[test]
fn duplicate_then_deletion_yields_one_append_and_one_update() {
    let seq = Sequencer::new();
    let first = seq.handle(ChatEvent::message("1", "alice", "hi"));
    let SinkInstruction::Append { row, slot } = first else {
        panic!("expected an append");
    };
    assert_eq!(
        (row.author.as_str(), row.text.as_str(), row.status.as_str(), row.actor.as_str()),
        ("alice", "hi", "", "")
    );
    assert_eq!(slot.as_deref(), Some("1"));

    let mut seq = seq;
    seq.register("1".into(), RowHandle(7));
    assert_eq!(seq.handle(ChatEvent::message("1", "alice", "hi")), SinkInstruction::NoOp);
    assert_eq!(
        seq.handle(ChatEvent::deletion("1", "Deleted by user")),
        SinkInstruction::UpdateStatus {
            handle: RowHandle(7),
            status: "Deleted by user".into(),
            actor: String::new(),
        }
    );
}

#[test]
fn update_never_touches_author_or_text() {
    let mut seq = Sequencer::new();
    let memory = MemorySink::new();
    let mut sinks = SinkSet::new().with(memory.clone());

    let appended = seq
        .apply(ChatEvent::message("A", "carl", "hola"), &mut sinks)
        .unwrap();
    let updated = seq
        .apply(
            ChatEvent::deletion("A", "Deleted by mod")
                .with_author("someone else")
                .with_text("[message deleted]"),
            &mut sinks,
        )
        .unwrap();
    assert!(matches!(appended, Applied::Appended(_)));
    assert!(matches!(updated, Applied::Updated(_)));

    let rows = memory.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].author, "carl");
    assert_eq!(rows[0].text, "hola");
    assert_eq!(rows[0].status, "Deleted by mod");
}

#[tokio::test]
async fn session_writes_every_sink_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let options = OutputOptions {
        logs_dir: dir.path().join("Logs"),
        ..OutputOptions::default()
    };
    let paths = OutputPaths::resolve(&options, Local::now()).unwrap();
    let sinks = paths.open_sinks(&options);
    assert_eq!(sinks.active(), vec!["log", "sqlite", "csv", "xlsx"]);

    let (stop, shutdown) = watch::channel(false);
    let source = Replay {
        batches: vec![
            vec![
                ChatEvent::message("1", "alice", "hi"),
                ChatEvent::message("2", "bob", "buy followers"),
            ],
            vec![
                ChatEvent::message("1", "alice", "hi"),
                ChatEvent::moderation("2", "Banned", "mod1"),
                ChatEvent::moderation("9", "Timeout – 5 min", "mod1").with_author("troll"),
                ChatEvent::message("", "anon", "no id"),
                ChatEvent::message("", "anon", "no id"),
            ],
        ],
        stop,
    };

    let mut session = CaptureSession::new(source, sinks, Duration::from_millis(1));
    let stats = session.run(shutdown).await.unwrap();
    assert_eq!(stats.appended, 5);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.duplicates, 1);

    let db = paths.db.as_deref().unwrap();
    let s = |v: &str| v.to_string();
    assert_eq!(
        db_rows(db),
        vec![
            (s("alice"), s("hi"), s(""), s("")),
            (s("bob"), s("buy followers"), s("Banned"), s("mod1")),
            (s("troll"), s(""), s("Timeout – 5 min"), s("mod1")),
            (s("anon"), s("no id"), s(""), s("")),
            (s("anon"), s("no id"), s(""), s("")),
        ]
    );

    let csv_text = std::fs::read_to_string(paths.csv.as_deref().unwrap()).unwrap();
    let csv_text = csv_text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 5);
    assert_eq!(&records[1][1], "bob");
    assert_eq!(&records[1][3], "Banned (mod1)");

    let log_text = std::fs::read_to_string(paths.log.as_deref().unwrap()).unwrap();
    assert_eq!(log_text.lines().count(), 6);
    assert!(log_text.contains("[Banned by mod1] bob: buy followers"));

    // the workbook is only written on flush, so these rows prove the shutdown path saved it
    let mut workbook: Xlsx<_> = open_workbook(paths.xlsx.as_deref().unwrap()).unwrap();
    let chat = sheet_cells(&mut workbook, "Chat");
    assert_eq!(chat.len(), 5);
    assert_eq!(chat[0][1..3], ["alice", "hi"]);
    assert_eq!(chat[1][1..], ["bob", "buy followers", "Banned", "mod1"]);
    let banned = sheet_cells(&mut workbook, "Banned");
    assert_eq!(banned.len(), 1);
    assert_eq!(banned[0][1], "bob");
}

/// Data rows of a worksheet, header skipped.
fn sheet_cells(workbook: &mut Xlsx<std::io::BufReader<std::fs::File>>, sheet: &str) -> Vec<Vec<String>> {
    let range = workbook.worksheet_range(sheet).unwrap();
    range
        .rows()
        .skip(1)
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}
