//! Episode and action lifecycle.
//!
//! Each operation composes the integrity checker, the constraint gate, and the
//! policy resolver into one decision over a state snapshot. Nothing is
//! written here: an approved operation yields a [`Mutation`] for the state
//! owner to apply, along with any advisory warnings.
//!
//! ```text
//! open_episode:   integrity -> gate -> capacity -> Mutation::OpenEpisode
//! close_episode:  integrity (episode active, new IDs free) -> Mutation::CloseEpisode
//! create_action:  integrity -> Mutation::CreateAction
//! signal_variable: integrity -> Mutation::SetVariableStatus
//! ```
//!
//! Closing never consults the gate: constraints govern starting an
//! intervention, not concluding one.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use homeostat_config::RegulatorConfig;
use homeostat_types::{
    Action, ActionId, ActionStatus, EntityKind, Episode, EpisodeClosure, EpisodeId, EpisodeKind,
    EpisodeStatus, Model, Mutation, NodeId, NonEmptyString, Note, NoteId, NoteTag, State,
    VariableId, VariableStatus, VariableUpdate,
};

use crate::integrity::{IntegrityChecker, IntegrityError};
use crate::membrane::{ConstraintGate, GateBlock, GateContext, GateDecision, GateWarning};
use crate::regulator::{CapacityError, PolicyConfigError, PolicyResolver};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error("blocked by model '{}': {}", .0.model_id, .0.reason)]
    Blocked(GateBlock),
}

/// An approved mutation and the warnings collected while approving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Approved {
    pub mutation: Mutation,
    pub warnings: Vec<GateWarning>,
}

impl Approved {
    fn clean(mutation: Mutation) -> Self {
        Self {
            mutation,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEpisodeRequest {
    pub id: EpisodeId,
    pub node: NodeId,
    pub kind: EpisodeKind,
    pub objective: String,
    pub opened_at: DateTime<Utc>,
}

/// The note every closure must leave behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureNote {
    pub id: NoteId,
    pub content: NonEmptyString,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseEpisodeRequest {
    pub episode: EpisodeId,
    pub closed_at: DateTime<Utc>,
    pub note: ClosureNote,
    pub variable_updates: Vec<VariableUpdate>,
    pub model_updates: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateActionRequest {
    pub id: ActionId,
    pub node: NodeId,
    pub episode: Option<EpisodeId>,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleEngine {
    resolver: PolicyResolver,
    gate: ConstraintGate,
}

impl LifecycleEngine {
    #[must_use]
    pub fn new(resolver: PolicyResolver, gate: ConstraintGate) -> Self {
        Self { resolver, gate }
    }

    pub fn from_config(config: &RegulatorConfig) -> Result<Self, PolicyConfigError> {
        Ok(Self::new(PolicyResolver::new(config)?, ConstraintGate::new()))
    }

    #[must_use]
    pub const fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn open_episode(
        &self,
        state: &State,
        request: OpenEpisodeRequest,
    ) -> Result<Approved, LifecycleError> {
        let checker = IntegrityChecker::new(state);
        checker.require_absent(request.id.as_str())?;
        let node = checker.require_node(request.node.as_str())?;
        if let Some(variable) = request.kind.variable() {
            checker.require_variable(variable.as_str())?;
        }

        let episode_type = request.kind.episode_type();
        let report = self
            .gate
            .evaluate(state, &GateContext::open_episode(node, episode_type));
        let warnings = match report.decision {
            GateDecision::Allow => Vec::new(),
            GateDecision::Warn { warnings } => warnings,
            GateDecision::Block(block) => {
                tracing::info!(
                    episode = %request.id,
                    node = %node.id,
                    model = %block.model_id,
                    "Episode open blocked"
                );
                return Err(LifecycleError::Blocked(block));
            }
        };

        let limit = self.resolver.check_capacity(state, node, &request.kind)?;

        tracing::debug!(
            episode = %request.id,
            node = %node.id,
            %episode_type,
            limit = limit.limit(),
            warnings = warnings.len(),
            "Episode open approved"
        );
        Ok(Approved {
            mutation: Mutation::OpenEpisode(Episode {
                id: request.id,
                node: request.node,
                kind: request.kind,
                objective: request.objective,
                status: EpisodeStatus::Active,
                opened_at: request.opened_at,
                closed_at: None,
            }),
            warnings,
        })
    }

    pub fn close_episode(
        &self,
        state: &State,
        request: CloseEpisodeRequest,
    ) -> Result<Approved, LifecycleError> {
        let checker = IntegrityChecker::new(state);
        checker.require_active_episode(request.episode.as_str())?;

        // New IDs introduced by this closure must be free in state and
        // distinct from each other.
        let mut claimed: HashSet<&str> = HashSet::new();
        claim_new_id(&checker, &mut claimed, request.note.id.as_str(), EntityKind::Note)?;
        for model in &request.model_updates {
            if checker.require_model(model.id.as_str()).is_err() {
                claim_new_id(&checker, &mut claimed, model.id.as_str(), EntityKind::Model)?;
            }
        }
        for update in &request.variable_updates {
            checker.require_variable(update.variable.as_str())?;
        }

        tracing::debug!(
            episode = %request.episode,
            variable_updates = request.variable_updates.len(),
            model_updates = request.model_updates.len(),
            "Episode close approved"
        );
        let note = Note {
            id: request.note.id,
            content: request.note.content.into_inner(),
            created_at: request.closed_at,
            tags: BTreeSet::from([NoteTag::ClosureNote]),
            linked_objects: vec![request.episode.as_str().to_string()],
        };
        Ok(Approved::clean(Mutation::CloseEpisode(EpisodeClosure {
            episode: request.episode,
            closed_at: request.closed_at,
            note,
            variable_updates: request.variable_updates,
            model_updates: request.model_updates,
        })))
    }

    /// Actions carry no concurrency limit.
    pub fn create_action(
        &self,
        state: &State,
        request: CreateActionRequest,
    ) -> Result<Approved, LifecycleError> {
        let checker = IntegrityChecker::new(state);
        checker.require_absent(request.id.as_str())?;
        checker.require_node(request.node.as_str())?;
        if let Some(episode) = &request.episode {
            checker.require_episode(episode.as_str())?;
        }

        tracing::debug!(action = %request.id, node = %request.node, "Action creation approved");
        Ok(Approved::clean(Mutation::CreateAction(Action {
            id: request.id,
            node: request.node,
            episode: request.episode,
            description: request.description,
            status: ActionStatus::Pending,
        })))
    }

    pub fn signal_variable(
        &self,
        state: &State,
        variable: &VariableId,
        status: VariableStatus,
    ) -> Result<Approved, LifecycleError> {
        IntegrityChecker::new(state).require_variable(variable.as_str())?;
        Ok(Approved::clean(Mutation::SetVariableStatus(VariableUpdate {
            variable: variable.clone(),
            status,
        })))
    }
}

/// `kind` is what `id` would become; a clash within the request is reported
/// against it.
fn claim_new_id<'r>(
    checker: &IntegrityChecker<'_>,
    claimed: &mut HashSet<&'r str>,
    id: &'r str,
    kind: EntityKind,
) -> Result<(), IntegrityError> {
    checker.require_absent(id)?;
    if claimed.insert(id) {
        Ok(())
    } else {
        Err(IntegrityError::AlreadyExists {
            id: id.to_string(),
            existing: kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use homeostat_config::LimitConfig;
    use homeostat_types::{Enforcement, ModelScope, Node, NodeType, Variable};

    use super::*;
    use crate::regulator::LimitKind;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn base_state() -> State {
        State {
            nodes: vec![
                Node::new("alice", NodeType::Personal),
                Node::new("acme", NodeType::Org),
            ],
            variables: vec![Variable {
                id: "sleep".into(),
                node: "alice".into(),
                name: "Sleep".into(),
                status: VariableStatus::Low,
            }],
            ..State::default()
        }
    }

    fn explore(id: &str, node: &str) -> OpenEpisodeRequest {
        OpenEpisodeRequest {
            id: id.into(),
            node: node.into(),
            kind: EpisodeKind::Explore,
            objective: "look around".into(),
            opened_at: t0(),
        }
    }

    fn stabilize(id: &str, node: &str, variable: &str) -> OpenEpisodeRequest {
        OpenEpisodeRequest {
            id: id.into(),
            node: node.into(),
            kind: EpisodeKind::stabilize(variable),
            objective: "bring it back".into(),
            opened_at: t0(),
        }
    }

    fn close(episode: &str, note: &str) -> CloseEpisodeRequest {
        CloseEpisodeRequest {
            episode: episode.into(),
            closed_at: t0() + Duration::days(7),
            note: ClosureNote {
                id: note.into(),
                content: NonEmptyString::new("done").unwrap(),
            },
            variable_updates: Vec::new(),
            model_updates: Vec::new(),
        }
    }

    fn apply(state: &mut State, approved: Approved) {
        state.apply(approved.mutation).expect("apply");
    }

    #[test]
    fn opens_active_episode() {
        let engine = LifecycleEngine::default();
        let state = base_state();

        let approved = engine.open_episode(&state, explore("ep-1", "alice")).unwrap();
        assert!(approved.warnings.is_empty());
        let Mutation::OpenEpisode(episode) = approved.mutation else {
            panic!("expected open mutation");
        };
        assert_eq!(episode.status, EpisodeStatus::Active);
        assert_eq!(episode.closed_at, None);
    }

    #[test]
    fn explore_limit_counts_per_node_then_frees_on_close() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();

        let approved = engine.open_episode(&state, explore("ep-1", "alice")).unwrap();
        apply(&mut state, approved);

        let err = engine.open_episode(&state, explore("ep-2", "alice")).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Capacity(CapacityError {
                kind: LimitKind::ExplorePerNode,
                target: "node 'alice'".into(),
                limit: 1,
                current: 1,
            })
        );

        // Another node has its own budget.
        assert!(engine.open_episode(&state, explore("ep-3", "acme")).is_ok());

        let approved = engine.close_episode(&state, close("ep-1", "n-1")).unwrap();
        apply(&mut state, approved);
        assert!(engine.open_episode(&state, explore("ep-2", "alice")).is_ok());
    }

    #[test]
    fn stabilize_limit_counts_per_variable_across_nodes() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();

        let approved = engine.open_episode(&state, stabilize("ep-1", "alice", "sleep")).unwrap();
        apply(&mut state, approved);
        let err = engine
            .open_episode(&state, stabilize("ep-2", "acme", "sleep"))
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Capacity(CapacityError {
                kind: LimitKind::StabilizePerVariable,
                current: 1,
                ..
            })
        ));
    }

    #[test]
    fn zero_limit_never_permits() {
        let config = RegulatorConfig {
            max_active_explore_per_node: LimitConfig::new(1.0).with_node_type("org", 0.0),
            max_active_stabilize_per_variable: LimitConfig::new(1.0),
        };
        let engine = LifecycleEngine::from_config(&config).unwrap();
        let err = engine
            .open_episode(&base_state(), explore("ep", "acme"))
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Capacity(CapacityError {
                limit: 0,
                current: 0,
                ..
            })
        ));
    }

    #[test]
    fn stabilize_requires_existing_variable() {
        let engine = LifecycleEngine::default();
        let err = engine
            .open_episode(&base_state(), stabilize("ep", "alice", "mood"))
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Integrity(IntegrityError::NotFound {
                kind: EntityKind::Variable,
                id: "mood".into()
            })
        );
    }

    #[test]
    fn unknown_node_and_duplicate_id_are_reference_errors() {
        let engine = LifecycleEngine::default();
        let state = base_state();

        let err = engine.open_episode(&state, explore("ep", "ghost")).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Integrity(IntegrityError::NotFound {
                kind: EntityKind::Node,
                ..
            })
        ));

        let err = engine.open_episode(&state, explore("sleep", "alice")).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Integrity(IntegrityError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn block_model_aborts_before_capacity() {
        let engine = LifecycleEngine::from_config(&RegulatorConfig {
            max_active_explore_per_node: LimitConfig::new(0.0),
            max_active_stabilize_per_variable: LimitConfig::new(1.0),
        })
        .unwrap();
        let mut state = base_state();
        state.models.push(Model::normative(
            "weekend",
            "no explore on weekends",
            ModelScope::Domain,
            Enforcement::Block,
        ));

        let err = engine.open_episode(&state, explore("ep", "alice")).unwrap_err();
        let LifecycleError::Blocked(block) = err else {
            panic!("expected block, got {err:?}");
        };
        assert_eq!(block.reason, "no explore on weekends");
        assert!(!block.exception_allowed);
    }

    #[test]
    fn warnings_ride_along_with_success() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();
        state.models.push(Model::normative(
            "pace",
            "keep explorations short",
            ModelScope::Personal,
            Enforcement::Warn,
        ));

        let approved = engine.open_episode(&state, explore("ep", "alice")).unwrap();
        assert_eq!(approved.warnings.len(), 1);
        assert_eq!(approved.warnings[0].statement, "keep explorations short");
        assert!(approved.warnings[0].exception_allowed);

        // The personal-scope warning does not reach the org node.
        let approved = engine.open_episode(&state, explore("ep", "acme")).unwrap();
        assert!(approved.warnings.is_empty());
    }

    #[test]
    fn closing_twice_is_an_error() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();
        let approved = engine.open_episode(&state, explore("ep", "alice")).unwrap();
        apply(&mut state, approved);
        let approved = engine.close_episode(&state, close("ep", "n-1")).unwrap();
        apply(&mut state, approved);

        let err = engine.close_episode(&state, close("ep", "n-2")).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Integrity(IntegrityError::EpisodeClosed { id: "ep".into() })
        );
    }

    #[test]
    fn closing_ignores_blocking_models() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();
        let approved = engine.open_episode(&state, explore("ep", "alice")).unwrap();
        apply(&mut state, approved);
        state.models.push(Model::normative(
            "freeze",
            "no changes",
            ModelScope::Domain,
            Enforcement::Block,
        ));

        assert!(engine.close_episode(&state, close("ep", "n-1")).is_ok());
    }

    #[test]
    fn close_applies_note_variables_and_models_together() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();
        let approved = engine.open_episode(&state, stabilize("ep", "alice", "sleep")).unwrap();
        apply(&mut state, approved);

        let mut request = close("ep", "n-1");
        request.variable_updates.push(VariableUpdate {
            variable: "sleep".into(),
            status: VariableStatus::InRange,
        });
        request.model_updates.push(Model::normative(
            "screens",
            "no screens after ten",
            ModelScope::Personal,
            Enforcement::Warn,
        ));
        let approved = engine.close_episode(&state, request).unwrap();
        apply(&mut state, approved);

        let episode = state.episode("ep").unwrap();
        assert_eq!(episode.status, EpisodeStatus::Closed);
        assert_eq!(episode.closed_at, Some(t0() + Duration::days(7)));
        assert_eq!(state.variable("sleep").unwrap().status, VariableStatus::InRange);
        assert!(state.model("screens").is_some());
        let note = state.note("n-1").unwrap();
        assert!(note.tags.contains(&NoteTag::ClosureNote));
        assert_eq!(note.linked_objects, vec!["ep".to_string()]);
    }

    #[test]
    fn close_rejects_colliding_new_ids() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();
        let approved = engine.open_episode(&state, explore("ep", "alice")).unwrap();
        apply(&mut state, approved);

        // Note ID collides with an existing variable.
        let err = engine.close_episode(&state, close("ep", "sleep")).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Integrity(IntegrityError::AlreadyExists { .. })
        ));

        // New model reuses the note's ID within the same request.
        let mut request = close("ep", "n-1");
        request.model_updates.push(Model::normative(
            "n-1",
            "clash",
            ModelScope::Domain,
            Enforcement::None,
        ));
        assert!(engine.close_episode(&state, request).is_err());

        // Unknown variable update.
        let mut request = close("ep", "n-1");
        request.variable_updates.push(VariableUpdate {
            variable: "mood".into(),
            status: VariableStatus::High,
        });
        assert!(engine.close_episode(&state, request).is_err());
    }

    #[test]
    fn action_requires_node_and_optional_episode() {
        let engine = LifecycleEngine::default();
        let state = base_state();

        let approved = engine
            .create_action(
                &state,
                CreateActionRequest {
                    id: "a-1".into(),
                    node: "alice".into(),
                    episode: None,
                    description: "book a doctor visit".into(),
                },
            )
            .unwrap();
        let Mutation::CreateAction(action) = approved.mutation else {
            panic!("expected action mutation");
        };
        assert_eq!(action.status, ActionStatus::Pending);

        let err = engine
            .create_action(
                &state,
                CreateActionRequest {
                    id: "a-2".into(),
                    node: "alice".into(),
                    episode: Some("ep-missing".into()),
                    description: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Integrity(IntegrityError::NotFound {
                kind: EntityKind::Episode,
                ..
            })
        ));
    }

    #[test]
    fn signal_variable_checks_reference() {
        let engine = LifecycleEngine::default();
        let mut state = base_state();

        let approved = engine
            .signal_variable(&state, &"sleep".into(), VariableStatus::High)
            .unwrap();
        apply(&mut state, approved);
        assert_eq!(state.variable("sleep").unwrap().status, VariableStatus::High);

        assert!(
            engine
                .signal_variable(&state, &"mood".into(), VariableStatus::Low)
                .is_err()
        );
    }
}
