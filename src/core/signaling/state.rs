use std::fmt;

/// Lifecycle of a signaling session.
///
/// ```text
/// Idle -> Negotiating -> GatheringIce -> AwaitingRemoteAnswer -> Established -> Closed
///   \__________\_____________\__________________\_____________________> Failed
/// ```
///
/// `Failed` is reachable from every non-terminal state; `start()` may leave
/// it again. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Negotiating,
    GatheringIce,
    AwaitingRemoteAnswer,
    Established,
    Closed,
    Failed,
}

impl SessionState {
    /// A negotiation is in flight.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            SessionState::Negotiating
                | SessionState::GatheringIce
                | SessionState::AwaitingRemoteAnswer
        )
    }

    /// `start()` is accepted from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Negotiating => write!(f, "Negotiating"),
            SessionState::GatheringIce => write!(f, "GatheringIce"),
            SessionState::AwaitingRemoteAnswer => write!(f, "AwaitingRemoteAnswer"),
            SessionState::Established => write!(f, "Established"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_allowed_states() {
        assert!(SessionState::Idle.can_start());
        assert!(SessionState::Failed.can_start());
        for state in [
            SessionState::Negotiating,
            SessionState::GatheringIce,
            SessionState::AwaitingRemoteAnswer,
            SessionState::Established,
            SessionState::Closed,
        ] {
            assert!(!state.can_start(), "{state} should not accept start");
        }
    }

    #[test]
    fn test_negotiating_states() {
        assert!(SessionState::GatheringIce.is_negotiating());
        assert!(!SessionState::Established.is_negotiating());
        assert!(!SessionState::Idle.is_negotiating());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::AwaitingRemoteAnswer.to_string(), "AwaitingRemoteAnswer");
        assert_eq!(SessionState::default().to_string(), "Idle");
    }
}
