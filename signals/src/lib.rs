//! Signal event log for Homeostat.
//!
//! Nodes exchange [`SignalEvent`](homeostat_types::SignalEvent)s through a
//! newline-delimited JSON file that any number of processes may share. Writes
//! are idempotent on `eventId` and serialized by an advisory lock marker;
//! reads take no lock.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod event_log;

pub use event_log::{EmitOutcome, EventLog, EventLogError, LOCK_FILE, LOG_DIR, LOG_FILE};
