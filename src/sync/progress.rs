//! Interactive sync runs and their streamed progress logs.
//!
//! A run is a single-producer, multi-subscriber, append-only log that ends
//! with a close marker. Subscribers attaching late replay everything written
//! so far and then follow live lines. Dropping a subscriber only stops its
//! consumption; the producing cycle always runs to completion.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

/// Receives human-readable progress lines from a sync cycle.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Sink used by the scheduler: progress goes to the process log.
pub struct LogSink<'a> {
    object: &'a str,
}

impl<'a> LogSink<'a> {
    pub fn new(object: &'a str) -> Self {
        Self { object }
    }
}

impl ProgressSink for LogSink<'_> {
    fn emit(&self, line: &str) {
        log::info!("cycle {}: {}", self.object, line);
    }
}

/// What a subscriber observes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Line(String),
    Closed,
}

#[derive(Debug, Default)]
struct RunLog {
    lines: Vec<String>,
    closed_at: Option<Instant>,
}

/// One interactive sync execution.
#[derive(Debug)]
pub struct SyncRun {
    id: Uuid,
    object_name: String,
    started_at: DateTime<Utc>,
    log: Mutex<RunLog>,
    version: watch::Sender<u64>,
}

impl SyncRun {
    fn new(object_name: &str) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            id: Uuid::new_v4(),
            object_name: object_name.to_string(),
            started_at: Utc::now(),
            log: Mutex::new(RunLog::default()),
            version,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append a line. No-op once the run is closed.
    pub fn append(&self, line: impl Into<String>) {
        {
            let mut log = self.log.lock();
            if log.closed_at.is_some() {
                return;
            }
            log.lines.push(line.into());
        }
        self.version.send_modify(|v| *v += 1);
    }

    /// Write the close marker. Later appends and closes are ignored.
    pub fn close(&self) {
        {
            let mut log = self.log.lock();
            if log.closed_at.is_some() {
                return;
            }
            log.closed_at = Some(Instant::now());
        }
        self.version.send_modify(|v| *v += 1);
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed_at.is_some()
    }

    /// Copy of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().lines.clone()
    }

    fn expired(&self, retention: Duration) -> bool {
        self.log
            .lock()
            .closed_at
            .is_some_and(|closed| closed.elapsed() >= retention)
    }

    pub fn subscribe(self: &Arc<Self>) -> RunSubscription {
        RunSubscription {
            run: Arc::clone(self),
            cursor: 0,
            version: self.version.subscribe(),
            finished: false,
        }
    }
}

/// Closes the run when dropped, including while unwinding from a panic.
pub struct CloseOnDrop(Arc<SyncRun>);

impl CloseOnDrop {
    pub fn new(run: Arc<SyncRun>) -> Self {
        Self(run)
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl ProgressSink for SyncRun {
    fn emit(&self, line: &str) {
        self.append(line);
    }
}

/// Cursor over a run's log: buffered lines first, then live ones.
pub struct RunSubscription {
    run: Arc<SyncRun>,
    cursor: usize,
    version: watch::Receiver<u64>,
    finished: bool,
}

impl RunSubscription {
    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    /// Next event, waiting for the producer if necessary. Returns `None` after
    /// the close marker has been delivered.
    pub async fn next(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }

        loop {
            self.version.borrow_and_update();

            {
                let log = self.run.log.lock();
                if let Some(line) = log.lines.get(self.cursor) {
                    self.cursor += 1;
                    return Some(RunEvent::Line(line.clone()));
                }
                if log.closed_at.is_some() {
                    self.finished = true;
                    return Some(RunEvent::Closed);
                }
            }

            if self.version.changed().await.is_err() {
                // The run holds the sender, so this only happens if it was dropped mid-flight.
                self.finished = true;
                return Some(RunEvent::Closed);
            }
        }
    }
}

/// Live and recently closed runs, keyed by run id.
#[derive(Debug)]
pub struct RunRegistry {
    runs: DashMap<Uuid, Arc<SyncRun>>,
    retention: Duration,
}

impl RunRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            retention,
        }
    }

    pub fn create(&self, object_name: &str) -> Arc<SyncRun> {
        self.collect_garbage();
        let run = Arc::new(SyncRun::new(object_name));
        self.runs.insert(run.id, Arc::clone(&run));
        run
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SyncRun>> {
        self.collect_garbage();
        self.runs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop runs that closed longer than the retention window ago.
    pub fn collect_garbage(&self) {
        let before = self.runs.len();
        self.runs.retain(|_, run| !run.expired(self.retention));
        let removed = before.saturating_sub(self.runs.len());
        if removed > 0 {
            log::debug!("runs: collected {} closed run(s)", removed);
        }
    }
}
