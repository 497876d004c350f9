//! Gating policies deciding automation levels and external-call
//! eligibility.
//!
//! Every policy here is a pure function over its inputs: the same
//! request always yields the same decision under a given configuration.
//! Policies never perform I/O and never consult shared mutable state;
//! the coordinator composes their decisions into run mutations and
//! response payloads.

pub mod action_tiering;
pub mod budget;
pub mod routing;
pub mod sensitivity;

pub use action_tiering::{ActionMode, ActionTieringPolicy, ConfidenceOutOfRange, RiskTier};
pub use budget::{BudgetDecision, BudgetGuardrail, BudgetInputError, BudgetStatus};
pub use routing::{Provider, ProviderRouter, RouteReason, RoutingDecision, RoutingInput};
pub use sensitivity::{
    BlockReason, FrontmatterFlags, SensitivityConfigError, SensitivityGate, SensitivityInput,
    SensitivityVerdict,
};
