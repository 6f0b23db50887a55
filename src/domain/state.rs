use crate::error::PaymentError;

/// Lifecycle of a single payment attempt, as rendered by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    Initializing,
    AwaitingGatewayOrWallet,
    Verifying,
    Settled,
    Failed(PaymentError),
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed(_))
    }

    /// Forward edges of the attempt lifecycle. Going back to `Idle` is a reset,
    /// not a transition, and is always allowed.
    pub fn can_transition_to(&self, next: &OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Idle, AwaitingGatewayOrWallet)
                | (Idle, Verifying)
                | (Idle, Failed(_))
                | (Initializing, AwaitingGatewayOrWallet)
                | (Initializing, Failed(_))
                | (AwaitingGatewayOrWallet, Verifying)
                | (AwaitingGatewayOrWallet, Settled)
                | (AwaitingGatewayOrWallet, Failed(_))
                | (Verifying, Settled)
                | (Verifying, Failed(_))
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::AwaitingGatewayOrWallet => "awaiting",
            Self::Verifying => "verifying",
            Self::Settled => "settled",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_path_is_legal() {
        let path = [
            OrchestratorState::Idle,
            OrchestratorState::Initializing,
            OrchestratorState::AwaitingGatewayOrWallet,
            OrchestratorState::Verifying,
            OrchestratorState::Settled,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_terminal_states_do_not_advance() {
        let failed = OrchestratorState::Failed(PaymentError::UserCancelled);
        assert!(failed.is_terminal());
        assert!(!failed.can_transition_to(&OrchestratorState::Verifying));
        assert!(!OrchestratorState::Settled.can_transition_to(&failed));
    }

    #[test]
    fn test_verify_requires_prior_step() {
        assert!(!OrchestratorState::Initializing.can_transition_to(&OrchestratorState::Verifying));
        assert!(!OrchestratorState::Initializing.can_transition_to(&OrchestratorState::Settled));
    }
}
