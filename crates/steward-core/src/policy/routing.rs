//! Provider routing: local-first with explicit cloud fallback.
//!
//! The router never falls back implicitly: a fallback happens only when
//! a trigger fires (timeout, grounding failure, low confidence) *and*
//! cloud use is permitted by the budget and sensitivity gates. When a
//! trigger fires but cloud use is blocked, the request stays local and
//! the decision says why.

use serde::{Deserialize, Serialize};

/// Inference provider target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// On-device provider.
    Local,
    /// Off-device provider.
    Cloud,
}

impl Provider {
    /// Returns the wire name of the provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the router picked its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// The local provider timed out.
    Timeout,
    /// The local answer failed grounding checks.
    GroundingFailure,
    /// The local answer's confidence fell below the threshold.
    LowConfidence,
    /// A fallback trigger fired but cloud use is not permitted.
    CloudBlocked,
    /// No trigger fired; the local answer stands.
    LocalSuccess,
}

impl RouteReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::GroundingFailure => "grounding_failure",
            Self::LowConfidence => "low_confidence",
            Self::CloudBlocked => "cloud_blocked",
            Self::LocalSuccess => "local_success",
        }
    }
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signals from the local attempt plus the composed cloud permission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingInput {
    /// Confidence reported by the local provider.
    pub local_confidence: f64,
    /// The local attempt timed out.
    pub local_timed_out: bool,
    /// The local answer failed grounding.
    pub grounding_failed: bool,
    /// Cloud use permitted (budget, sensitivity, caller opt-in).
    pub cloud_allowed: bool,
}

/// Routing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected provider.
    pub provider: Provider,
    /// Whether this decision is a fallback away from local.
    pub fallback_used: bool,
    /// Why this provider was selected.
    pub reason: RouteReason,
}

/// Local-first router with a configurable confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderRouter {
    /// Local confidence below this value triggers fallback.
    pub local_confidence_threshold: f64,
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self {
            local_confidence_threshold: 0.70,
        }
    }
}

impl ProviderRouter {
    /// Selects a provider for one request.
    ///
    /// Trigger priority: timeout, then grounding failure, then low
    /// confidence. The first firing trigger decides the reason.
    #[must_use]
    pub fn select(&self, input: RoutingInput) -> RoutingDecision {
        let trigger = if input.local_timed_out {
            Some(RouteReason::Timeout)
        } else if input.grounding_failed {
            Some(RouteReason::GroundingFailure)
        } else if input.local_confidence < self.local_confidence_threshold {
            Some(RouteReason::LowConfidence)
        } else {
            None
        };

        match trigger {
            Some(reason) if input.cloud_allowed => RoutingDecision {
                provider: Provider::Cloud,
                fallback_used: true,
                reason,
            },
            Some(_) => RoutingDecision {
                provider: Provider::Local,
                fallback_used: false,
                reason: RouteReason::CloudBlocked,
            },
            None => RoutingDecision {
                provider: Provider::Local,
                fallback_used: false,
                reason: RouteReason::LocalSuccess,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(confidence: f64, timed_out: bool, grounding_failed: bool) -> RoutingInput {
        RoutingInput {
            local_confidence: confidence,
            local_timed_out: timed_out,
            grounding_failed,
            cloud_allowed: true,
        }
    }

    #[test]
    fn test_confident_local_answer_stays_local() {
        let decision = ProviderRouter::default().select(input(0.9, false, false));
        assert_eq!(decision.provider, Provider::Local);
        assert!(!decision.fallback_used);
        assert_eq!(decision.reason, RouteReason::LocalSuccess);
    }

    #[test]
    fn test_timeout_falls_back_to_cloud() {
        let decision = ProviderRouter::default().select(input(0.9, true, false));
        assert_eq!(decision.provider, Provider::Cloud);
        assert!(decision.fallback_used);
        assert_eq!(decision.reason, RouteReason::Timeout);
    }

    #[test]
    fn test_grounding_failure_falls_back_to_cloud() {
        let decision = ProviderRouter::default().select(input(0.9, false, true));
        assert_eq!(decision.provider, Provider::Cloud);
        assert_eq!(decision.reason, RouteReason::GroundingFailure);
    }

    #[test]
    fn test_low_confidence_falls_back_to_cloud() {
        let decision = ProviderRouter::default().select(input(0.69, false, false));
        assert_eq!(decision.provider, Provider::Cloud);
        assert_eq!(decision.reason, RouteReason::LowConfidence);
    }

    #[test]
    fn test_threshold_is_exclusive_at_lower_bound() {
        let decision = ProviderRouter::default().select(input(0.70, false, false));
        assert_eq!(decision.reason, RouteReason::LocalSuccess);
    }

    #[test]
    fn test_timeout_outranks_other_triggers() {
        let decision = ProviderRouter::default().select(input(0.1, true, true));
        assert_eq!(decision.reason, RouteReason::Timeout);
    }

    #[test]
    fn test_grounding_outranks_low_confidence() {
        let decision = ProviderRouter::default().select(input(0.1, false, true));
        assert_eq!(decision.reason, RouteReason::GroundingFailure);
    }

    #[test]
    fn test_blocked_cloud_keeps_request_local() {
        let router = ProviderRouter::default();
        for (timed_out, grounding_failed, confidence) in
            [(true, false, 0.9), (false, true, 0.9), (false, false, 0.1)]
        {
            let decision = router.select(RoutingInput {
                local_confidence: confidence,
                local_timed_out: timed_out,
                grounding_failed,
                cloud_allowed: false,
            });
            assert_eq!(decision.provider, Provider::Local);
            assert!(!decision.fallback_used);
            assert_eq!(decision.reason, RouteReason::CloudBlocked);
        }
    }

    #[test]
    fn test_no_trigger_with_blocked_cloud_is_still_local_success() {
        let decision = ProviderRouter::default().select(RoutingInput {
            local_confidence: 0.95,
            local_timed_out: false,
            grounding_failed: false,
            cloud_allowed: false,
        });
        assert_eq!(decision.reason, RouteReason::LocalSuccess);
    }
}
