//! Concurrency limits for episodes.
//!
//! Two limits are resolved per node, each through the same three tiers
//! (most specific wins):
//!
//! 1. an override for the specific node ID
//! 2. an override for the node's type
//! 3. the global default
//!
//! A limit of zero is legal and forbids that episode type outright.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use homeostat_config::{
    DEFAULT_MAX_ACTIVE_EXPLORE_PER_NODE, DEFAULT_MAX_ACTIVE_STABILIZE_PER_VARIABLE, LimitConfig,
    RegulatorConfig,
};
use homeostat_types::{EpisodeKind, EpisodeType, Node, NodeId, NodeType, State, UnknownNodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    /// Active Explore episodes per node.
    ExplorePerNode,
    /// Active Stabilize episodes per variable.
    StabilizePerVariable,
}

impl LimitKind {
    #[must_use]
    pub const fn for_episode(episode_type: EpisodeType) -> Self {
        match episode_type {
            EpisodeType::Explore => Self::ExplorePerNode,
            EpisodeType::Stabilize => Self::StabilizePerVariable,
        }
    }

    #[must_use]
    pub const fn config_key(self) -> &'static str {
        match self {
            Self::ExplorePerNode => "max_active_explore_per_node",
            Self::StabilizePerVariable => "max_active_stabilize_per_variable",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplorePerNode => f.write_str("explore-per-node"),
            Self::StabilizePerVariable => f.write_str("stabilize-per-variable"),
        }
    }
}

/// Which tier a resolved limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSource {
    Node,
    NodeType(NodeType),
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimit {
    limit: u32,
    source: LimitSource,
}

impl ResolvedLimit {
    #[must_use]
    pub const fn new(limit: u32, source: LimitSource) -> Self {
        Self { limit, source }
    }

    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    #[must_use]
    pub const fn source(self) -> LimitSource {
        self.source
    }

    /// Whether one more episode fits alongside `active` running ones.
    #[must_use]
    pub fn admits(self, active: usize) -> bool {
        active < self.limit as usize
    }
}

/// Effective limits for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub explore_per_node: ResolvedLimit,
    pub stabilize_per_variable: ResolvedLimit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyConfigError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: String, value: f64 },
    #[error("{field} must be non-negative, got {value}")]
    Negative { field: String, value: f64 },
    #[error("{field}: {source}")]
    UnknownNodeType {
        field: String,
        source: UnknownNodeType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} limit reached for {target}: {current} active, limit {limit}")]
pub struct CapacityError {
    pub kind: LimitKind,
    /// The node or variable the limit is counted against.
    pub target: String,
    pub limit: u32,
    pub current: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LimitTable {
    default: u32,
    by_node_type: HashMap<NodeType, u32>,
    by_node: HashMap<NodeId, u32>,
}

impl LimitTable {
    fn uniform(default: u32) -> Self {
        Self {
            default,
            by_node_type: HashMap::new(),
            by_node: HashMap::new(),
        }
    }

    fn from_config(kind: LimitKind, config: &LimitConfig) -> Result<Self, PolicyConfigError> {
        let key = kind.config_key();
        let default = validate_limit(&format!("regulator.{key}.default"), config.default)?;

        let mut by_node_type = HashMap::with_capacity(config.by_node_type.len());
        for (name, value) in &config.by_node_type {
            let field = format!("regulator.{key}.by_node_type.{name}");
            let node_type = name
                .parse::<NodeType>()
                .map_err(|source| PolicyConfigError::UnknownNodeType {
                    field: field.clone(),
                    source,
                })?;
            by_node_type.insert(node_type, validate_limit(&field, *value)?);
        }

        let mut by_node = HashMap::with_capacity(config.by_node.len());
        for (node, value) in &config.by_node {
            let field = format!("regulator.{key}.by_node.{node}");
            by_node.insert(NodeId::new(node.as_str()), validate_limit(&field, *value)?);
        }

        Ok(Self {
            default,
            by_node_type,
            by_node,
        })
    }

    fn resolve(&self, node: &Node) -> ResolvedLimit {
        if let Some(limit) = self.by_node.get(&node.id) {
            return ResolvedLimit::new(*limit, LimitSource::Node);
        }
        if let Some(limit) = self.by_node_type.get(&node.node_type) {
            return ResolvedLimit::new(*limit, LimitSource::NodeType(node.node_type));
        }
        ResolvedLimit::new(self.default, LimitSource::Default)
    }
}

/// Fractional limits round up: with `count >= limit` as the refusal test,
/// a limit of 1.5 refuses at 2, same as a limit of 2.
fn validate_limit(field: &str, value: f64) -> Result<u32, PolicyConfigError> {
    if !value.is_finite() {
        return Err(PolicyConfigError::NonFinite {
            field: field.to_string(),
            value,
        });
    }
    if value < 0.0 {
        return Err(PolicyConfigError::Negative {
            field: field.to_string(),
            value,
        });
    }
    // Float-to-int `as` saturates at u32::MAX.
    Ok(value.ceil() as u32)
}

/// Resolves effective episode limits from validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResolver {
    explore: LimitTable,
    stabilize: LimitTable,
}

impl PolicyResolver {
    /// Validate `config` and build a resolver. Any non-finite or negative
    /// value, or an unknown node type key, is rejected here rather than at
    /// first use.
    pub fn new(config: &RegulatorConfig) -> Result<Self, PolicyConfigError> {
        Ok(Self {
            explore: LimitTable::from_config(
                LimitKind::ExplorePerNode,
                &config.max_active_explore_per_node,
            )?,
            stabilize: LimitTable::from_config(
                LimitKind::StabilizePerVariable,
                &config.max_active_stabilize_per_variable,
            )?,
        })
    }

    #[must_use]
    pub fn resolve(&self, node: &Node) -> ResolvedLimits {
        ResolvedLimits {
            explore_per_node: self.explore.resolve(node),
            stabilize_per_variable: self.stabilize.resolve(node),
        }
    }

    #[must_use]
    pub fn limit_for(&self, node: &Node, kind: LimitKind) -> ResolvedLimit {
        match kind {
            LimitKind::ExplorePerNode => self.explore.resolve(node),
            LimitKind::StabilizePerVariable => self.stabilize.resolve(node),
        }
    }

    /// Refuse when the relevant active count is already at or above the
    /// resolved limit.
    pub fn check_capacity(
        &self,
        state: &State,
        node: &Node,
        kind: &EpisodeKind,
    ) -> Result<ResolvedLimit, CapacityError> {
        let limit_kind = LimitKind::for_episode(kind.episode_type());
        let resolved = self.limit_for(node, limit_kind);
        let (target, current) = match kind {
            EpisodeKind::Explore => (
                format!("node '{}'", node.id),
                state.active_explore_count(&node.id),
            ),
            EpisodeKind::Stabilize { variable } => (
                format!("variable '{variable}'"),
                state.active_stabilize_count(variable),
            ),
        };

        if resolved.admits(current) {
            Ok(resolved)
        } else {
            tracing::debug!(
                node = %node.id,
                kind = %limit_kind,
                limit = resolved.limit(),
                current,
                source = ?resolved.source(),
                "Episode capacity exhausted"
            );
            Err(CapacityError {
                kind: limit_kind,
                target,
                limit: resolved.limit(),
                current,
            })
        }
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self {
            explore: LimitTable::uniform(DEFAULT_MAX_ACTIVE_EXPLORE_PER_NODE as u32),
            stabilize: LimitTable::uniform(DEFAULT_MAX_ACTIVE_STABILIZE_PER_VARIABLE as u32),
        }
    }
}
