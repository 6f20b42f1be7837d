//! Regulatory core for Homeostat.
//!
//! Decides whether a proposed state change may happen. Every operation is a
//! pure function of a [`State`](homeostat_types::State) snapshot and the
//! request: integrity first, then normative gating, then capacity. Approved
//! operations come back as a [`Mutation`](homeostat_types::Mutation); applying
//! and persisting it is the caller's business.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

pub mod integrity;
pub mod lifecycle;
pub mod membrane;
pub mod regulator;

pub use integrity::{IntegrityChecker, IntegrityError};
pub use lifecycle::{
    Approved, CloseEpisodeRequest, ClosureNote, CreateActionRequest, LifecycleEngine,
    LifecycleError, OpenEpisodeRequest,
};
pub use membrane::{
    ConstraintGate, DecisionKind, GateBlock, GateContext, GateDecision, GateReport, GateWarning,
};
pub use regulator::{
    CapacityError, LimitKind, LimitSource, PolicyConfigError, PolicyResolver, ResolvedLimit,
    ResolvedLimits,
};
