//! Authorization decisions for API key requests.
//!
//! Global rules take priority over granular rules: a global rule allows every
//! method and its granular content is never inspected. Anything that cannot be
//! evaluated denies.

use apikey_core_types::{GranularRule, Rule};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Decision outcome categories.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecisionKind {
    Allow = 0,
    Deny = 1,
}

/// Why a decision came out the way it did.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecisionReason {
    /// No rule applies to the key on this path.
    MissingRule,
    GlobalRule,
    VerbMatched,
    /// The rule is granular but lists no verbs.
    NoVerbs,
    VerbNotAllowed,
}

/// High-level decision returned to callers after evaluating a rule.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthzDecision {
    pub kind: DecisionKind,
    pub reason: DecisionReason,
}

impl AuthzDecision {
    fn allow(reason: DecisionReason) -> Self {
        Self {
            kind: DecisionKind::Allow,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            kind: DecisionKind::Deny,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.kind == DecisionKind::Allow
    }
}

/// Whether `method` is a CORS preflight, which bypasses key validation.
pub fn is_preflight(method: &str) -> bool {
    method.eq_ignore_ascii_case("OPTIONS")
}

/// Evaluates `rule` for `method`, returning the decision and its reason.
pub fn evaluate(rule: Option<&Rule>, method: &str) -> AuthzDecision {
    let Some(rule) = rule else {
        return AuthzDecision::deny(DecisionReason::MissingRule);
    };
    if rule.global {
        return AuthzDecision::allow(DecisionReason::GlobalRule);
    }
    let decision = evaluate_granular(rule.granular.as_ref(), method);
    trace!(method, ?decision, "granular rule evaluated");
    decision
}

/// `true` iff `rule` permits `method`.
pub fn authorize(rule: Option<&Rule>, method: &str) -> bool {
    evaluate(rule, method).is_allowed()
}

fn evaluate_granular(granular: Option<&GranularRule>, method: &str) -> AuthzDecision {
    let verbs = match granular {
        Some(granular) if !granular.verbs.is_empty() => &granular.verbs,
        _ => return AuthzDecision::deny(DecisionReason::NoVerbs),
    };
    if verbs.iter().any(|verb| verb.eq_ignore_ascii_case(method)) {
        AuthzDecision::allow(DecisionReason::VerbMatched)
    } else {
        AuthzDecision::deny(DecisionReason::VerbNotAllowed)
    }
}
