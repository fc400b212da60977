//! Bootstrap pipeline state.

use serde::{Deserialize, Serialize};

/// Phase state of one bootstrap run. Transitions are strictly forward; the
/// only early exits land in `Failed`, and only before join artifacts exist
/// (topology validation, preparation, initialization).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterBootstrapState {
    #[default]
    NotStarted,
    Preparing,
    Initializing,
    TokensExtracted,
    Joining,
    Verifying,
    Complete,
    Failed,
}

impl ClusterBootstrapState {
    fn rank(self) -> u8 {
        match self {
            ClusterBootstrapState::NotStarted => 0,
            ClusterBootstrapState::Preparing => 1,
            ClusterBootstrapState::Initializing => 2,
            ClusterBootstrapState::TokensExtracted => 3,
            ClusterBootstrapState::Joining => 4,
            ClusterBootstrapState::Verifying => 5,
            ClusterBootstrapState::Complete => 6,
            ClusterBootstrapState::Failed => 7,
        }
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_advance_to(self, next: ClusterBootstrapState) -> bool {
        if next == ClusterBootstrapState::Failed {
            return matches!(
                self,
                ClusterBootstrapState::NotStarted
                    | ClusterBootstrapState::Preparing
                    | ClusterBootstrapState::Initializing
            );
        }
        next.rank() == self.rank() + 1 && self != ClusterBootstrapState::Failed
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClusterBootstrapState::Complete | ClusterBootstrapState::Failed
        )
    }
}

impl std::fmt::Display for ClusterBootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClusterBootstrapState::NotStarted => "not-started",
            ClusterBootstrapState::Preparing => "preparing",
            ClusterBootstrapState::Initializing => "initializing",
            ClusterBootstrapState::TokensExtracted => "tokens-extracted",
            ClusterBootstrapState::Joining => "joining",
            ClusterBootstrapState::Verifying => "verifying",
            ClusterBootstrapState::Complete => "complete",
            ClusterBootstrapState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::ClusterBootstrapState::*;

    #[test]
    fn happy_path_is_strictly_forward() {
        let path = [
            NotStarted,
            Preparing,
            Initializing,
            TokensExtracted,
            Joining,
            Verifying,
            Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_going_back_or_skipping() {
        assert!(!Joining.can_advance_to(Preparing));
        assert!(!Preparing.can_advance_to(TokensExtracted));
        assert!(!Complete.can_advance_to(Failed));
    }

    #[test]
    fn failure_only_before_tokens_exist() {
        assert!(NotStarted.can_advance_to(Failed));
        assert!(Preparing.can_advance_to(Failed));
        assert!(Initializing.can_advance_to(Failed));
        assert!(!TokensExtracted.can_advance_to(Failed));
        assert!(!Joining.can_advance_to(Failed));
        assert!(!Verifying.can_advance_to(Failed));
    }
}
