use std::fmt;

/// Phase of one echo call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayState {
    Idle,
    AcquiringMedia,
    PushNegotiating,
    PullNegotiating,
    Active,
    Closing,
    Closed,
    Failed,
}

impl RelayState {
    /// States in which setup is still running
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            RelayState::AcquiringMedia | RelayState::PushNegotiating | RelayState::PullNegotiating
        )
    }

    pub fn can_transition_to(&self, next: RelayState) -> bool {
        use RelayState::*;
        match (self, next) {
            (Idle, AcquiringMedia) | (Idle, Closed) => true,
            (AcquiringMedia, PushNegotiating)
            | (PushNegotiating, PullNegotiating)
            | (PullNegotiating, Active) => true,
            (from, Failed) | (from, Closing) if from.is_setup() => true,
            (Active, Closing) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Idle => "idle",
            RelayState::AcquiringMedia => "acquiring media",
            RelayState::PushNegotiating => "negotiating push",
            RelayState::PullNegotiating => "negotiating pull",
            RelayState::Active => "active",
            RelayState::Closing => "closing",
            RelayState::Closed => "closed",
            RelayState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RelayState::*;

    #[test]
    fn setup_runs_strictly_in_order() {
        assert!(Idle.can_transition_to(AcquiringMedia));
        assert!(AcquiringMedia.can_transition_to(PushNegotiating));
        assert!(PushNegotiating.can_transition_to(PullNegotiating));
        assert!(PullNegotiating.can_transition_to(Active));

        assert!(!AcquiringMedia.can_transition_to(PullNegotiating));
        assert!(!PushNegotiating.can_transition_to(Active));
        assert!(!Idle.can_transition_to(Active));
    }

    #[test]
    fn failure_only_from_setup() {
        for state in [AcquiringMedia, PushNegotiating, PullNegotiating] {
            assert!(state.can_transition_to(Failed));
            assert!(state.can_transition_to(Closing));
        }
        assert!(!Active.can_transition_to(Failed));
        assert!(!Closed.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states_stay_put() {
        for next in [Idle, AcquiringMedia, Active, Closing, Closed, Failed] {
            assert!(!Closed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Idle.can_transition_to(Closed));
    }
}
