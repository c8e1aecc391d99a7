//! Event log backed by a JSON-lines file (one stored event per line).

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, instrument, warn};

use super::{AppendRequest, EventLog, EventLogError, EventStream, StoredEvent};
use crate::core::event::{Event, EventId};
use crate::core::query::EventQuery;

/// File-backed log for the CLI and single-process tools.
///
/// Appends are serialized through a mutex, so two handles on the same file in
/// one process must not be used concurrently.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
    stopped: AtomicBool,
}

impl JsonlEventLog {
    /// Open (creating if needed) the log at `path`.
    pub fn start(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "event log started");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_running(&self) -> Result<(), EventLogError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EventLogError::Stopped);
        }
        Ok(())
    }

    fn stored_lines(&self) -> Result<StoredLines, EventLogError> {
        let file = File::open(&self.path)?;
        Ok(StoredLines {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl EventLog for JsonlEventLog {
    #[instrument(skip_all, fields(path = %self.path.display(), events = request.events.len()))]
    fn append(&self, request: AppendRequest) -> Result<(), EventLogError> {
        self.ensure_running()?;
        request.validate()?;
        if request.events.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let prior: Vec<Event> = self
            .stored_lines()?
            .map(|stored| stored.map(|stored| stored.event))
            .collect::<Result<_, _>>()?;
        if let Some(cas) = &request.cas {
            if let Err(err) = cas.evaluate(&prior) {
                warn!(%err, "append rejected by precondition");
                return Err(err);
            }
        }
        let existing: HashSet<EventId> = prior.iter().map(|event| event.id).collect();
        if let Some(dup) = request.events.iter().find(|event| existing.contains(&event.id)) {
            return Err(EventLogError::DuplicateId(dup.id));
        }

        // One write per batch.
        let mut buf = String::new();
        for event in &request.events {
            let stored = StoredEvent {
                event: event.clone(),
                tx: request.tx_metadata.clone(),
            };
            buf.push_str(&serde_json::to_string(&stored)?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        debug!(appended = request.events.len(), "events appended");
        Ok(())
    }

    fn read(&self, query: &EventQuery) -> Result<EventStream<'_>, EventLogError> {
        self.ensure_running()?;
        query.validate()?;
        let query = query.clone();
        let stream = self.stored_lines()?.filter_map(move |stored| match stored {
            Ok(stored) if query.matches(&stored.event) => Some(Ok(stored.event)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        });
        Ok(Box::new(stream))
    }

    fn stop(&self) -> Result<(), EventLogError> {
        self.stopped.store(true, Ordering::Release);
        debug!(path = %self.path.display(), "event log stopped");
        Ok(())
    }
}

struct StoredLines {
    lines: Lines<BufReader<File>>,
}

impl Iterator for StoredLines {
    type Item = Result<StoredEvent, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(EventLogError::from));
        }
    }
}
