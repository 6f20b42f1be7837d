//! Reference and uniqueness checks run before any mutation.
//!
//! Variables, episodes, actions, notes, models and links share one flat ID
//! space: a new ID must be absent from all of them. Typed lookups are offered
//! for callers that want a narrower error.

use thiserror::Error;

use homeostat_types::{Action, EntityKind, Episode, Model, Node, Proxy, State, Variable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("id '{id}' already exists as a {existing}")]
    AlreadyExists { id: String, existing: EntityKind },
    #[error("episode '{id}' is already closed")]
    EpisodeClosed { id: String },
}

impl IntegrityError {
    fn not_found(kind: EntityKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Read-only checks over a state snapshot. Never mutates.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityChecker<'a> {
    state: &'a State,
}

impl<'a> IntegrityChecker<'a> {
    #[must_use]
    pub fn new(state: &'a State) -> Self {
        Self { state }
    }

    /// Which shared-namespace collection holds `id`, if any.
    #[must_use]
    pub fn locate(&self, id: &str) -> Option<EntityKind> {
        let s = self.state;
        if s.variable(id).is_some() {
            Some(EntityKind::Variable)
        } else if s.episode(id).is_some() {
            Some(EntityKind::Episode)
        } else if s.action(id).is_some() {
            Some(EntityKind::Action)
        } else if s.note(id).is_some() {
            Some(EntityKind::Note)
        } else if s.model(id).is_some() {
            Some(EntityKind::Model)
        } else if s.link(id).is_some() {
            Some(EntityKind::Link)
        } else {
            None
        }
    }

    /// Generic existence check across the shared namespace. The error names
    /// the category the caller expected.
    pub fn require_object(&self, id: &str, expected: EntityKind) -> Result<(), IntegrityError> {
        match self.locate(id) {
            Some(_) => Ok(()),
            None => Err(IntegrityError::not_found(expected, id)),
        }
    }

    /// A candidate new ID must not already be used anywhere in the shared
    /// namespace.
    pub fn require_absent(&self, id: &str) -> Result<(), IntegrityError> {
        match self.locate(id) {
            Some(existing) => Err(IntegrityError::AlreadyExists {
                id: id.to_string(),
                existing,
            }),
            None => Ok(()),
        }
    }

    pub fn require_node(&self, id: &str) -> Result<&'a Node, IntegrityError> {
        self.state
            .node(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Node, id))
    }

    pub fn require_variable(&self, id: &str) -> Result<&'a Variable, IntegrityError> {
        self.state
            .variable(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Variable, id))
    }

    pub fn require_episode(&self, id: &str) -> Result<&'a Episode, IntegrityError> {
        self.state
            .episode(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Episode, id))
    }

    /// The episode must exist and still be `Active`.
    pub fn require_active_episode(&self, id: &str) -> Result<&'a Episode, IntegrityError> {
        let episode = self.require_episode(id)?;
        if episode.is_active() {
            Ok(episode)
        } else {
            Err(IntegrityError::EpisodeClosed { id: id.to_string() })
        }
    }

    pub fn require_action(&self, id: &str) -> Result<&'a Action, IntegrityError> {
        self.state
            .action(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Action, id))
    }

    pub fn require_model(&self, id: &str) -> Result<&'a Model, IntegrityError> {
        self.state
            .model(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Model, id))
    }

    pub fn require_proxy(&self, id: &str) -> Result<&'a Proxy, IntegrityError> {
        self.state
            .proxy(id)
            .ok_or_else(|| IntegrityError::not_found(EntityKind::Proxy, id))
    }
}
