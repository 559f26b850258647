use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a payment intent.
///
/// `created -> method_attached -> processing -> {succeeded | requires_action | failed}`,
/// with `requires_action -> processing` once the buyer returns from an external
/// redirect. `succeeded` and `failed` are terminal for the buyer. The one exit
/// from `failed` is `succeeded`, for when the provider settles the payment late.
/// Money the provider collected is always honoured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    MethodAttached,
    Processing,
    RequiresAction,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::MethodAttached => "method_attached",
            PaymentStatus::Processing => "processing",
            PaymentStatus::RequiresAction => "requires_action",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "created" => Some(PaymentStatus::Created),
            "method_attached" => Some(PaymentStatus::MethodAttached),
            "processing" => Some(PaymentStatus::Processing),
            "requires_action" => Some(PaymentStatus::RequiresAction),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;

        if *self == next {
            return !self.is_terminal() || next == Succeeded;
        }

        match (self, next) {
            (Created, MethodAttached) => true,
            (Created, Failed) => true,
            (MethodAttached, Processing | Succeeded | RequiresAction | Failed) => true,
            (Processing, Succeeded | RequiresAction | Failed) => true,
            (RequiresAction, Processing | Succeeded | Failed) => true,
            (Failed, Succeeded) => true,
            _ => false,
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus::*;

    #[test]
    fn terminal_states_never_move_backwards() {
        for next in [Created, MethodAttached, Processing, RequiresAction, Failed] {
            assert!(!Succeeded.can_transition_to(next), "succeeded -> {next}");
        }
        for next in [Created, MethodAttached, Processing, RequiresAction, Failed] {
            assert!(!Failed.can_transition_to(next), "failed -> {next}");
        }
    }

    #[test]
    fn late_settlement_overrides_failure() {
        assert!(Failed.can_transition_to(Succeeded));
    }

    #[test]
    fn repeated_success_is_an_accepted_no_op() {
        assert!(Succeeded.can_transition_to(Succeeded));
    }

    #[test]
    fn redirect_returns_to_processing() {
        assert!(Processing.can_transition_to(RequiresAction));
        assert!(RequiresAction.can_transition_to(Processing));
        assert!(RequiresAction.can_transition_to(Succeeded));
    }

    #[test]
    fn processing_needs_an_attached_method() {
        assert!(!Created.can_transition_to(Processing));
        assert!(Created.can_transition_to(MethodAttached));
        assert!(MethodAttached.can_transition_to(Processing));
    }
}
