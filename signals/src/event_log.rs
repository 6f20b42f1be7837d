//! Append-only NDJSON event log.
//!
//! # Layout
//!
//! ```text
//! <root>/.homeostat/signals/events.ndjson       one SignalEvent per line
//! <root>/.homeostat/signals/events.ndjson.lock  present while a writer appends
//! ```
//!
//! # Emit
//!
//! 1. Look the event ID up in the in-memory index (built from the file on
//!    first use). Present means already delivered: return without IO.
//! 2. Take the lock marker. If another writer holds it, fail immediately.
//! 3. Re-read the whole file and rebuild the index. Another process may have
//!    appended the same event between step 1 and step 2.
//! 4. Append the record, fsync, update the index. The lock is released on
//!    every path out of the function.
//!
//! # Read
//!
//! Lines that do not parse, or parse into an event with a blank ID or node,
//! are skipped. A missing file is an empty log. Records are returned in file
//! order, which is emission order.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use homeostat_config::SignalsConfig;
use homeostat_types::{EventId, SignalEvent};
use homeostat_utils::{LockError, LockFile};

/// Log directory, relative to the configured root.
pub const LOG_DIR: &str = ".homeostat/signals";
pub const LOG_FILE: &str = "events.ndjson";
pub const LOCK_FILE: &str = "events.ndjson.lock";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log {} I/O failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("failed to encode signal event: {0}")]
    Encode(#[from] serde_json::Error),
    /// Blank IDs would be dropped on read, so they are never written.
    #[error("signal event '{event_id}' has a blank event id or node")]
    Malformed { event_id: EventId },
}

impl EventLogError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the failure was lock contention and the caller may retry.
    #[must_use]
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Lock(LockError::Held { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOutcome {
    /// `false` when the event ID was already in the log.
    pub appended: bool,
}

/// What a full read of the log produced.
struct Snapshot {
    events: Vec<SignalEvent>,
    /// The file is non-empty and its last byte is not a newline.
    torn_tail: bool,
}

impl Snapshot {
    fn index(&self) -> HashSet<EventId> {
        self.events.iter().map(|e| e.event_id.clone()).collect()
    }
}

/// Handle on one log file. Each process (or thread) keeps its own handle;
/// the lock marker serializes writers across all of them.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    lock_path: PathBuf,
    index: Option<HashSet<EventId>>,
}

impl EventLog {
    /// Log under `root` at the fixed relative location. Touches nothing on
    /// disk until the first read or write.
    #[must_use]
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self::at_path(root.as_ref().join(LOG_DIR).join(LOG_FILE))
    }

    #[must_use]
    pub fn from_config(config: &SignalsConfig) -> Self {
        Self::open(config.root_dir())
    }

    /// Log at an explicit file path. The lock marker sits beside it.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            index: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Append `event` unless its ID is already present.
    pub fn emit(&mut self, event: &SignalEvent) -> Result<EmitOutcome, EventLogError> {
        if !event.is_well_formed() {
            return Err(EventLogError::Malformed {
                event_id: event.event_id.clone(),
            });
        }
        if self.loaded_index()?.contains(&event.event_id) {
            tracing::trace!(event = %event.event_id, "Signal already logged");
            return Ok(EmitOutcome { appended: false });
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| EventLogError::io(dir, e))?;
        }
        let lock = LockFile::try_acquire(&self.lock_path)?;

        let snapshot = read_log(&self.path)?;
        let index = self.index.insert(snapshot.index());
        if index.contains(&event.event_id) {
            tracing::debug!(event = %event.event_id, "Signal appended by another writer");
            return Ok(EmitOutcome { appended: false });
        }

        let mut record = serde_json::to_vec(event)?;
        record.push(b'\n');
        append_record(&self.path, &record, snapshot.torn_tail)?;
        index.insert(event.event_id.clone());

        tracing::debug!(
            event = %event.event_id,
            node = %event.node,
            signal_type = ?event.signal_type,
            path = %self.path.display(),
            "Signal appended"
        );
        drop(lock);
        Ok(EmitOutcome { appended: true })
    }

    /// Every well-formed event in file order. Rebuilds the index.
    pub fn consume(&mut self) -> Result<Vec<SignalEvent>, EventLogError> {
        self.consume_matching(|_| true)
    }

    /// Well-formed events accepted by `predicate`, in file order. The index is
    /// rebuilt from the whole file regardless of the filter.
    pub fn consume_matching<F>(
        &mut self,
        mut predicate: F,
    ) -> Result<Vec<SignalEvent>, EventLogError>
    where
        F: FnMut(&SignalEvent) -> bool,
    {
        let snapshot = read_log(&self.path)?;
        self.index = Some(snapshot.index());
        Ok(snapshot.events.into_iter().filter(|e| predicate(e)).collect())
    }

    fn loaded_index(&mut self) -> Result<&HashSet<EventId>, EventLogError> {
        if self.index.is_none() {
            let snapshot = read_log(&self.path)?;
            tracing::trace!(
                path = %self.path.display(),
                events = snapshot.events.len(),
                "Event index loaded"
            );
            self.index = Some(snapshot.index());
        }
        Ok(self.index.get_or_insert_with(HashSet::new))
    }
}

fn read_log(path: &Path) -> Result<Snapshot, EventLogError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(EventLogError::io(path, e)),
    };

    let mut events = Vec::new();
    for (line_no, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<SignalEvent>(line) {
            Ok(event) if event.is_well_formed() => events.push(event),
            Ok(event) => {
                tracing::debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    event = %event.event_id,
                    "Skipping malformed signal record"
                );
            }
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    "Skipping unparseable signal record: {err}"
                );
            }
        }
    }

    Ok(Snapshot {
        events,
        torn_tail: bytes.last().is_some_and(|b| *b != b'\n'),
    })
}

/// Append one complete record. A torn tail from a crashed writer is closed
/// off first so it cannot swallow this record.
fn append_record(path: &Path, record: &[u8], torn_tail: bool) -> Result<(), EventLogError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EventLogError::io(path, e))?;
    if torn_tail {
        tracing::debug!(path = %path.display(), "Terminating torn tail record");
        file.write_all(b"\n").map_err(|e| EventLogError::io(path, e))?;
    }
    file.write_all(record)
        .and_then(|()| file.sync_all())
        .map_err(|e| EventLogError::io(path, e))
}
