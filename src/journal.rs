//! Daily-rotated JSONL journal of sync lifecycle events.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sync_engine::{FetchResult, UpdateSink};
use tracing::warn;

const JOURNAL_SUBDIR: &str = "siaga-sync";

pub type SharedJournal = Arc<Mutex<SyncJournal>>;

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn resolve_repo_root() -> Option<PathBuf> {
    let mut cursor = std::env::current_dir().ok()?;
    loop {
        if cursor.join(".git").is_dir() {
            return Some(cursor);
        }
        if !cursor.pop() {
            return None;
        }
    }
}

/// `$SYNC_JOURNAL_DIR/siaga-sync`, else `<repo>/JOURNAL/siaga-sync`, else
/// `./JOURNAL/siaga-sync`.
pub fn resolve_journal_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("SYNC_JOURNAL_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(JOURNAL_SUBDIR);
        }
    }
    match resolve_repo_root() {
        Some(root) => root.join("JOURNAL").join(JOURNAL_SUBDIR),
        None => PathBuf::from("JOURNAL").join(JOURNAL_SUBDIR),
    }
}

pub struct SyncJournal {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl SyncJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = Utc::now().format("%Y-%m-%d").to_string();
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("sync-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    /// Append one `{ts, kind, ...fields}` line. Failures are logged, never raised.
    pub fn write_event(&mut self, kind: &str, fields: Value) {
        let mut event = json!({ "ts": now_iso(), "kind": kind });
        if let (Some(target), Value::Object(extra)) = (event.as_object_mut(), fields) {
            target.extend(extra);
        }

        let write_result = (|| -> std::io::Result<()> {
            self.rotate_if_needed()?;
            let line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            writeln!(self.file, "{}", line)?;
            self.file.flush()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            warn!("Sync journal write failed: {}", e);
        }
    }

    pub fn current_file(&self) -> PathBuf {
        self.dir.join(format!("sync-{}.jsonl", self.day_key))
    }
}

pub fn record(journal: &SharedJournal, kind: &str, fields: Value) {
    match journal.lock() {
        Ok(mut guard) => guard.write_event(kind, fields),
        Err(poisoned) => poisoned.into_inner().write_event(kind, fields),
    }
}

/// Journals the outcome of every applied fetch cycle.
pub struct CycleRecorder {
    journal: SharedJournal,
}

impl CycleRecorder {
    pub fn new(journal: SharedJournal) -> Self {
        Self { journal }
    }
}

impl UpdateSink<Value> for CycleRecorder {
    fn publish(&self, resource: &str, result: &FetchResult<Value>) {
        record(
            &self.journal,
            "fetch_cycle",
            json!({
                "resource": resource,
                "ok": result.error.is_none(),
                "attempts": result.attempts,
                "stale": result.is_stale,
                "scope": &result.scope,
                "error": result.error.as_ref().map(|e| e.to_string())
            }),
        );
    }
}
