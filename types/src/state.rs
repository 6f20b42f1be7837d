//! State snapshot and mutation application.
//!
//! Collections are `Vec`s so stored order is preserved; the constraint gate's
//! first-match-wins semantics depend on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{
    Action, EntityKind, Episode, EpisodeStatus, EpisodeType, Link, Model, Node, Note, Proxy,
    Variable, VariableStatus,
};
use crate::ids::{EpisodeId, NodeId, VariableId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub nodes: Vec<Node>,
    pub variables: Vec<Variable>,
    pub episodes: Vec<Episode>,
    pub actions: Vec<Action>,
    pub notes: Vec<Note>,
    pub models: Vec<Model>,
    pub links: Vec<Link>,
    pub proxies: Vec<Proxy>,
}

impl State {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    #[must_use]
    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id.as_str() == id)
    }

    #[must_use]
    pub fn episode(&self, id: &str) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id.as_str() == id)
    }

    #[must_use]
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id.as_str() == id)
    }

    #[must_use]
    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id.as_str() == id)
    }

    #[must_use]
    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id.as_str() == id)
    }

    #[must_use]
    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id.as_str() == id)
    }

    #[must_use]
    pub fn proxy(&self, id: &str) -> Option<&Proxy> {
        self.proxies.iter().find(|p| p.id.as_str() == id)
    }

    /// Active Explore episodes owned by `node`.
    #[must_use]
    pub fn active_explore_count(&self, node: &NodeId) -> usize {
        self.episodes
            .iter()
            .filter(|e| e.is_active() && e.episode_type() == EpisodeType::Explore && e.node == *node)
            .count()
    }

    /// Active Stabilize episodes targeting `variable`, across all nodes.
    #[must_use]
    pub fn active_stabilize_count(&self, variable: &VariableId) -> usize {
        self.episodes
            .iter()
            .filter(|e| e.is_active() && e.kind.variable() == Some(variable))
            .count()
    }

    /// Apply a mutation the lifecycle engine approved.
    ///
    /// References are resolved before anything is written, so a failed apply
    /// leaves the state untouched.
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), ApplyError> {
        match mutation {
            Mutation::OpenEpisode(episode) => {
                self.episodes.push(episode);
            }
            Mutation::CreateAction(action) => {
                self.actions.push(action);
            }
            Mutation::SetVariableStatus(update) => {
                let idx = self.variable_index(&update.variable)?;
                self.variables[idx].status = update.status;
            }
            Mutation::CloseEpisode(closure) => self.apply_closure(closure)?,
        }
        Ok(())
    }

    fn apply_closure(&mut self, closure: EpisodeClosure) -> Result<(), ApplyError> {
        let episode_idx = self
            .episodes
            .iter()
            .position(|e| e.id == closure.episode)
            .ok_or_else(|| ApplyError::missing(EntityKind::Episode, closure.episode.as_str()))?;
        let variable_indices = closure
            .variable_updates
            .iter()
            .map(|update| self.variable_index(&update.variable))
            .collect::<Result<Vec<_>, _>>()?;

        for (idx, update) in variable_indices.into_iter().zip(&closure.variable_updates) {
            self.variables[idx].status = update.status;
        }
        for model in closure.model_updates {
            match self.models.iter_mut().find(|m| m.id == model.id) {
                Some(existing) => *existing = model,
                None => self.models.push(model),
            }
        }
        self.notes.push(closure.note);

        let episode = &mut self.episodes[episode_idx];
        episode.status = EpisodeStatus::Closed;
        episode.closed_at = Some(closure.closed_at);
        Ok(())
    }

    fn variable_index(&self, id: &VariableId) -> Result<usize, ApplyError> {
        self.variables
            .iter()
            .position(|v| v.id == *id)
            .ok_or_else(|| ApplyError::missing(EntityKind::Variable, id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableUpdate {
    #[serde(rename = "variableId")]
    pub variable: VariableId,
    pub status: VariableStatus,
}

/// Everything that changes when an episode closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeClosure {
    #[serde(rename = "episodeId")]
    pub episode: EpisodeId,
    pub closed_at: DateTime<Utc>,
    pub note: Note,
    #[serde(default)]
    pub variable_updates: Vec<VariableUpdate>,
    /// Models to create, or to replace in place when the ID already exists.
    #[serde(default)]
    pub model_updates: Vec<Model>,
}

/// A state change the core has approved for the state owner to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    OpenEpisode(Episode),
    CloseEpisode(EpisodeClosure),
    CreateAction(Action),
    SetVariableStatus(VariableUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("cannot apply mutation: {kind} '{id}' not found")]
    Missing { kind: EntityKind, id: String },
}

impl ApplyError {
    fn missing(kind: EntityKind, id: &str) -> Self {
        Self::Missing {
            kind,
            id: id.to_string(),
        }
    }
}
