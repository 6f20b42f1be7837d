//! Core domain types for Homeostat.
//!
//! This crate contains pure domain types with no IO and no policy logic.
//! The regulatory core (`homeostat-core`) and the signal log
//! (`homeostat-signals`) both build on it.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod entities;
mod ids;
mod signal;
mod state;

pub use entities::{
    Action, ActionStatus, EntityKind, Enforcement, Episode, EpisodeKind, EpisodeShapeError,
    EpisodeStatus, EpisodeType, Link, Model, ModelScope, ModelType, Node, NodeType, Note, NoteTag,
    Proxy, UnknownNodeType, Variable, VariableStatus,
};
pub use ids::{ActionId, EpisodeId, EventId, LinkId, ModelId, NodeId, NoteId, ProxyId, VariableId};
pub use signal::{SignalEvent, SignalType};
pub use state::{ApplyError, EpisodeClosure, Mutation, State, VariableUpdate};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
