//! Entity records held by the state container.
//!
//! Every record is an immutable value identified by a caller-supplied ID.
//! Wire names are camelCase to match the snapshot format shared with the
//! state owner.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ActionId, EpisodeId, LinkId, ModelId, NodeId, NoteId, ProxyId, VariableId};

/// Category of a stored entity, used when reporting missing or duplicate IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Variable,
    Episode,
    Action,
    Note,
    Model,
    Link,
    Proxy,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Variable => "variable",
            Self::Episode => "episode",
            Self::Action => "action",
            Self::Note => "note",
            Self::Model => "model",
            Self::Link => "link",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Nodes & Variables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Personal,
    Org,
}

impl NodeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Org => "org",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Self::Personal),
            "org" => Ok(Self::Org),
            _ => Err(UnknownNodeType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node type '{0}' (expected 'personal' or 'org')")]
pub struct UnknownNodeType(pub String);

/// A regulated actor. The type is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableStatus {
    Low,
    InRange,
    High,
}

/// A homeostatic indicator owned by exactly one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: VariableId,
    pub node: NodeId,
    #[serde(default)]
    pub name: String,
    pub status: VariableStatus,
}

// ============================================================================
// Episodes & Actions
// ============================================================================

/// Plain episode tag, used where the referenced variable is irrelevant
/// (limit lookup, gate context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    Stabilize,
    Explore,
}

impl fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stabilize => f.write_str("stabilize"),
            Self::Explore => f.write_str("explore"),
        }
    }
}

/// Episode kind with its payload.
///
/// A Stabilize episode always names its variable and an Explore episode never
/// does; the shape makes the other combinations unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EpisodeKind {
    Stabilize {
        #[serde(rename = "variableId")]
        variable: VariableId,
    },
    Explore,
}

impl EpisodeKind {
    #[must_use]
    pub fn stabilize(variable: impl Into<VariableId>) -> Self {
        Self::Stabilize {
            variable: variable.into(),
        }
    }

    #[must_use]
    pub const fn episode_type(&self) -> EpisodeType {
        match self {
            Self::Stabilize { .. } => EpisodeType::Stabilize,
            Self::Explore => EpisodeType::Explore,
        }
    }

    #[must_use]
    pub fn variable(&self) -> Option<&VariableId> {
        match self {
            Self::Stabilize { variable } => Some(variable),
            Self::Explore => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Active,
    Closed,
}

/// A bounded intervention. `Active -> Closed` is the only transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EpisodeRecord")]
pub struct Episode {
    pub id: EpisodeId,
    pub node: NodeId,
    #[serde(flatten)]
    pub kind: EpisodeKind,
    pub objective: String,
    pub status: EpisodeStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// An episode whose `type` and `variableId` disagree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpisodeShapeError {
    #[error("stabilize episode '{0}' must reference a variable")]
    StabilizeWithoutVariable(EpisodeId),
    #[error("explore episode '{0}' must not reference a variable")]
    ExploreWithVariable(EpisodeId),
}

/// Wire form of an [`Episode`] before the type/variable pairing is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeRecord {
    id: EpisodeId,
    node: NodeId,
    #[serde(rename = "type")]
    episode_type: EpisodeType,
    #[serde(default, rename = "variableId")]
    variable: Option<VariableId>,
    objective: String,
    status: EpisodeStatus,
    opened_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EpisodeRecord> for Episode {
    type Error = EpisodeShapeError;

    fn try_from(record: EpisodeRecord) -> Result<Self, Self::Error> {
        let variable = record
            .variable
            .filter(|v| !v.as_str().trim().is_empty());
        let kind = match (record.episode_type, variable) {
            (EpisodeType::Stabilize, Some(variable)) => EpisodeKind::Stabilize { variable },
            (EpisodeType::Stabilize, None) => {
                return Err(EpisodeShapeError::StabilizeWithoutVariable(record.id));
            }
            (EpisodeType::Explore, None) => EpisodeKind::Explore,
            (EpisodeType::Explore, Some(_)) => {
                return Err(EpisodeShapeError::ExploreWithVariable(record.id));
            }
        };
        Ok(Self {
            id: record.id,
            node: record.node,
            kind,
            objective: record.objective,
            status: record.status,
            opened_at: record.opened_at,
            closed_at: record.closed_at,
        })
    }
}

impl Episode {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EpisodeStatus::Active
    }

    #[must_use]
    pub const fn episode_type(&self) -> EpisodeType {
        self.kind.episode_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    pub node: NodeId,
    #[serde(
        default,
        rename = "episodeId",
        skip_serializing_if = "Option::is_none"
    )]
    pub episode: Option<EpisodeId>,
    pub description: String,
    pub status: ActionStatus,
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Descriptive,
    Procedural,
    Normative,
}

/// Which nodes a Normative model governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelScope {
    Personal,
    Org,
    Domain,
}

impl ModelScope {
    #[must_use]
    pub const fn applies_to(self, node_type: NodeType) -> bool {
        match self {
            Self::Personal => matches!(node_type, NodeType::Personal),
            Self::Org => matches!(node_type, NodeType::Org),
            Self::Domain => true,
        }
    }
}

/// How a Normative model reacts when it applies to a proposed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    #[default]
    None,
    Warn,
    Block,
}

impl Enforcement {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }
}

/// A belief or policy held by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: ModelId,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ModelScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exceptions_allowed: Option<bool>,
}

impl Model {
    /// A Normative model with the given scope and enforcement level.
    #[must_use]
    pub fn normative(
        id: impl Into<ModelId>,
        statement: impl Into<String>,
        scope: ModelScope,
        enforcement: Enforcement,
    ) -> Self {
        Self {
            id: id.into(),
            model_type: ModelType::Normative,
            statement: statement.into(),
            confidence: None,
            scope: Some(scope),
            enforcement: Some(enforcement),
            exceptions_allowed: None,
        }
    }

    #[must_use]
    pub fn with_exceptions_allowed(mut self, allowed: bool) -> Self {
        self.exceptions_allowed = Some(allowed);
        self
    }

    #[must_use]
    pub fn is_normative(&self) -> bool {
        self.model_type == ModelType::Normative
    }

    /// Enforcement level, `None` when unset.
    #[must_use]
    pub fn enforcement(&self) -> Enforcement {
        self.enforcement.unwrap_or_default()
    }

    /// Scope, `Domain` when unset.
    #[must_use]
    pub fn scope(&self) -> ModelScope {
        self.scope.unwrap_or(ModelScope::Domain)
    }
}

// ============================================================================
// Notes, Links, Proxies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteTag {
    Inbox,
    PendingApproval,
    Processed,
    ClosureNote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<NoteTag>,
    /// IDs of any entities this note refers to.
    #[serde(default)]
    pub linked_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: LinkId,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relation: String,
}

/// An observable stand-in for a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub id: ProxyId,
    #[serde(rename = "variableId")]
    pub variable: VariableId,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::{
        Enforcement, Episode, EpisodeKind, EpisodeShapeError, EpisodeStatus, EpisodeType, Model,
        ModelScope, ModelType, NodeType,
    };
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn scope_matching_follows_node_type() {
        assert!(ModelScope::Personal.applies_to(NodeType::Personal));
        assert!(!ModelScope::Personal.applies_to(NodeType::Org));
        assert!(ModelScope::Org.applies_to(NodeType::Org));
        assert!(!ModelScope::Org.applies_to(NodeType::Personal));
        assert!(ModelScope::Domain.applies_to(NodeType::Personal));
        assert!(ModelScope::Domain.applies_to(NodeType::Org));
    }

    #[test]
    fn node_type_parses_case_insensitively() {
        assert_eq!("Org".parse::<NodeType>(), Ok(NodeType::Org));
        assert_eq!(" personal ".parse::<NodeType>(), Ok(NodeType::Personal));
        assert!("team".parse::<NodeType>().is_err());
    }

    #[test]
    fn unset_enforcement_is_none() {
        let model: Model = serde_json::from_value(json!({
            "id": "m1",
            "type": "normative",
            "statement": "rest on sundays",
            "scope": "personal"
        }))
        .expect("model");
        assert_eq!(model.model_type, ModelType::Normative);
        assert_eq!(model.enforcement(), Enforcement::None);
        assert_eq!(model.exceptions_allowed, None);
    }

    #[test]
    fn stabilize_episode_wire_shape_carries_variable() {
        let episode = Episode {
            id: "ep-1".into(),
            node: "n1".into(),
            kind: EpisodeKind::stabilize("sleep"),
            objective: "get back to eight hours".into(),
            status: EpisodeStatus::Active,
            opened_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            closed_at: None,
        };
        let value = serde_json::to_value(&episode).expect("serialize");
        assert_eq!(value["type"], "stabilize");
        assert_eq!(value["variableId"], "sleep");
        assert_eq!(value["status"], "active");
        assert!(value.get("closedAt").is_none());

        let back: Episode = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back.episode_type(), EpisodeType::Stabilize);
        assert_eq!(back.kind.variable().map(|v| v.as_str()), Some("sleep"));
    }

    fn episode_json(episode_type: &str, variable: Option<&str>) -> serde_json::Value {
        let mut value = json!({
            "id": "ep-7",
            "node": "n1",
            "type": episode_type,
            "objective": "see what happens",
            "status": "active",
            "openedAt": "2026-03-01T08:00:00Z"
        });
        if let Some(variable) = variable {
            value["variableId"] = json!(variable);
        }
        value
    }

    #[test]
    fn explore_episode_with_variable_is_rejected() {
        let err = serde_json::from_value::<Episode>(episode_json("explore", Some("sleep")))
            .unwrap_err();
        assert!(
            err.to_string()
                .contains(&EpisodeShapeError::ExploreWithVariable("ep-7".into()).to_string()),
            "unexpected error: {err}"
        );

        let explore: Episode = serde_json::from_value(episode_json("explore", None)).unwrap();
        assert_eq!(explore.kind, EpisodeKind::Explore);
    }

    #[test]
    fn stabilize_episode_without_variable_is_rejected() {
        for value in [
            episode_json("stabilize", None),
            episode_json("stabilize", Some("  ")),
        ] {
            let err = serde_json::from_value::<Episode>(value).unwrap_err();
            assert!(
                err.to_string().contains(
                    &EpisodeShapeError::StabilizeWithoutVariable("ep-7".into()).to_string()
                ),
                "unexpected error: {err}"
            );
        }
    }
}
