use std::fmt;

/// State-changing action the watchdog can submit for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Approve,
    Disapprove,
}

impl ActionKind {
    /// Registry contract action implementing this kind.
    pub fn contract_action(self) -> &'static str {
        match self {
            ActionKind::Approve => "admactivate",
            ActionKind::Disapprove => "admdisable",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Approve => "approve",
            ActionKind::Disapprove => "disapprove",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileAction {
    Approve,
    Disapprove,
    NoOp,
}

impl ReconcileAction {
    pub fn kind(self) -> Option<ActionKind> {
        match self {
            ReconcileAction::Approve => Some(ActionKind::Approve),
            ReconcileAction::Disapprove => Some(ActionKind::Disapprove),
            ReconcileAction::NoOp => None,
        }
    }
}

/// Maps the on-chain activation flag and the probed health to the action
/// that brings the flag in line with reality.
pub fn reconcile(is_active: bool, healthy: bool) -> ReconcileAction {
    match (is_active, healthy) {
        (false, true) => ReconcileAction::Approve,
        (true, false) => ReconcileAction::Disapprove,
        (false, false) | (true, true) => ReconcileAction::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        assert_eq!(reconcile(false, true), ReconcileAction::Approve);
        assert_eq!(reconcile(true, false), ReconcileAction::Disapprove);
        assert_eq!(reconcile(false, false), ReconcileAction::NoOp);
        assert_eq!(reconcile(true, true), ReconcileAction::NoOp);
    }

    #[test]
    fn test_converged_state_is_stable() {
        for (is_active, healthy) in [(false, true), (true, false), (false, false), (true, true)] {
            let first = reconcile(is_active, healthy);
            let is_active = match first {
                ReconcileAction::Approve => true,
                ReconcileAction::Disapprove => false,
                ReconcileAction::NoOp => is_active,
            };
            assert_eq!(reconcile(is_active, healthy), ReconcileAction::NoOp);
        }
    }

    #[test]
    fn test_contract_actions() {
        assert_eq!(ReconcileAction::Approve.kind(), Some(ActionKind::Approve));
        assert_eq!(ReconcileAction::NoOp.kind(), None);
        assert_eq!(ActionKind::Approve.contract_action(), "admactivate");
        assert_eq!(ActionKind::Disapprove.contract_action(), "admdisable");
    }
}
