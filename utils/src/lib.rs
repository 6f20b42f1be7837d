//! Shared infrastructure utilities for Homeostat.
//!
//! - **`atomic_write`**: Exclusive, all-or-nothing file creation (temp + no-clobber persist)
//! - **`lock_file`**: Advisory cross-process lock marker built on exclusive creation

pub mod atomic_write;
pub mod lock_file;

pub use atomic_write::atomic_write_new;
pub use lock_file::{LockError, LockFile, LockHolder};
