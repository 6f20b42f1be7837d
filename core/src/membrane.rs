//! Constraint gate: evaluates Normative models against a proposed mutation.
//!
//! Models are walked in stored order. `warn` models accumulate, the first
//! `block` model ends evaluation. Descriptive and Procedural models never
//! participate. Evaluation is pure: no IO, no state changes.

use serde::Serialize;

use homeostat_types::{Enforcement, EpisodeType, Model, ModelId, Node, State};

/// What is being proposed, as far as the gate cares.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub node: &'a Node,
    /// Set when the mutation opens an episode.
    pub episode_type: Option<EpisodeType>,
}

impl<'a> GateContext<'a> {
    #[must_use]
    pub fn open_episode(node: &'a Node, episode_type: EpisodeType) -> Self {
        Self {
            node,
            episode_type: Some(episode_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateWarning {
    pub model_id: ModelId,
    pub statement: String,
    pub exception_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateBlock {
    pub model_id: ModelId,
    pub reason: String,
    pub exception_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Allow,
    Warn,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum GateDecision {
    /// No model fired.
    Allow,
    /// One or more warnings; the mutation may proceed.
    Warn { warnings: Vec<GateWarning> },
    /// Terminal for this attempt. Only the first blocking model is reported.
    Block(GateBlock),
}

impl GateDecision {
    #[must_use]
    pub const fn kind(&self) -> DecisionKind {
        match self {
            Self::Allow => DecisionKind::Allow,
            Self::Warn { .. } => DecisionKind::Warn,
            Self::Block(_) => DecisionKind::Block,
        }
    }

    #[must_use]
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Self::Block(_))
    }
}

/// A decision plus the models that were looked at, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    #[serde(flatten)]
    pub decision: GateDecision,
    pub evaluated: Vec<ModelId>,
}

/// Blocking models are override-proof unless they say otherwise; warnings
/// may be waived unless they say otherwise.
fn exception_allowed(model: &Model, enforcement: Enforcement) -> bool {
    model
        .exceptions_allowed
        .unwrap_or(matches!(enforcement, Enforcement::Warn))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintGate;

impl ConstraintGate {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn evaluate(&self, state: &State, ctx: &GateContext<'_>) -> GateReport {
        let mut warnings = Vec::new();
        let mut evaluated = Vec::new();

        let applicable = state
            .models
            .iter()
            .filter(|m| m.is_normative() && m.scope().applies_to(ctx.node.node_type));

        for model in applicable {
            evaluated.push(model.id.clone());
            match model.enforcement() {
                Enforcement::None => {}
                Enforcement::Warn => warnings.push(GateWarning {
                    model_id: model.id.clone(),
                    statement: model.statement.clone(),
                    exception_allowed: exception_allowed(model, Enforcement::Warn),
                }),
                Enforcement::Block => {
                    tracing::debug!(
                        node = %ctx.node.id,
                        model = %model.id,
                        episode_type = ?ctx.episode_type,
                        "Normative model blocks mutation"
                    );
                    return GateReport {
                        decision: GateDecision::Block(GateBlock {
                            model_id: model.id.clone(),
                            reason: model.statement.clone(),
                            exception_allowed: exception_allowed(model, Enforcement::Block),
                        }),
                        evaluated,
                    };
                }
            }
        }

        let decision = if warnings.is_empty() {
            GateDecision::Allow
        } else {
            GateDecision::Warn { warnings }
        };
        GateReport {
            decision,
            evaluated,
        }
    }
}
