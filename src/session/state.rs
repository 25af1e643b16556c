//! Session state machine.

/// Represents the lifecycle state of the managed chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Manager exists but no engine has been armed yet.
    #[default]
    Uninitialized,
    /// Engine armed; waiting for the login token to be scanned.
    AwaitingLogin,
    /// Authenticated; messages can be sent.
    Active,
    /// Tearing down the current engine and wiping credentials.
    Resetting,
    /// Engine released at process shutdown. Terminal.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Uninitialized -> AwaitingLogin
    /// - AwaitingLogin -> Active
    /// - AwaitingLogin -> Resetting
    /// - Active -> Resetting
    /// - Resetting -> AwaitingLogin
    /// - any state except Closed -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Uninitialized, AwaitingLogin)
                | (AwaitingLogin, Active)
                | (AwaitingLogin, Resetting)
                | (Active, Resetting)
                | (Resetting, AwaitingLogin)
        ) || (target == Closed && *self != Closed)
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::GatewayError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if the session is authenticated and can send.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Check if a login token may be held in this state.
    pub fn accepts_login_token(&self) -> bool {
        matches!(self, SessionState::AwaitingLogin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut state = SessionState::Uninitialized;
        assert!(state.transition_to(SessionState::AwaitingLogin).is_ok());
        assert!(state.transition_to(SessionState::Active).is_ok());
        assert!(state.transition_to(SessionState::Resetting).is_ok());
        assert!(state.transition_to(SessionState::AwaitingLogin).is_ok());
        assert_eq!(state, SessionState::AwaitingLogin);
    }

    #[test]
    fn test_reset_before_login() {
        let mut state = SessionState::AwaitingLogin;
        assert!(state.transition_to(SessionState::Resetting).is_ok());
        assert!(state.transition_to(SessionState::AwaitingLogin).is_ok());
    }

    #[test]
    fn test_invalid_uninitialized_to_active() {
        let mut state = SessionState::Uninitialized;
        assert!(state.transition_to(SessionState::Active).is_err());
        assert_eq!(state, SessionState::Uninitialized);
    }

    #[test]
    fn test_resetting_cannot_activate() {
        let mut state = SessionState::Resetting;
        assert!(state.transition_to(SessionState::Active).is_err());
        assert!(state.transition_to(SessionState::Resetting).is_err());
        assert_eq!(state, SessionState::Resetting);
    }

    #[test]
    fn test_nothing_returns_to_uninitialized() {
        for from in [
            SessionState::AwaitingLogin,
            SessionState::Active,
            SessionState::Resetting,
        ] {
            assert!(!from.can_transition_to(SessionState::Uninitialized));
        }
    }

    #[test]
    fn test_is_connected() {
        assert!(!SessionState::Uninitialized.is_connected());
        assert!(!SessionState::AwaitingLogin.is_connected());
        assert!(SessionState::Active.is_connected());
        assert!(!SessionState::Resetting.is_connected());
        assert!(!SessionState::Closed.is_connected());
    }

    #[test]
    fn test_closed_is_terminal() {
        for from in [
            SessionState::Uninitialized,
            SessionState::AwaitingLogin,
            SessionState::Active,
            SessionState::Resetting,
        ] {
            let mut state = from;
            assert!(state.transition_to(SessionState::Closed).is_ok());
        }

        let mut state = SessionState::Closed;
        assert!(state.transition_to(SessionState::Closed).is_err());
        assert!(state.transition_to(SessionState::AwaitingLogin).is_err());
        assert!(state.transition_to(SessionState::Resetting).is_err());
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn test_accepts_login_token() {
        assert!(SessionState::AwaitingLogin.accepts_login_token());
        assert!(!SessionState::Active.accepts_login_token());
        assert!(!SessionState::Resetting.accepts_login_token());
    }

    #[test]
    fn test_default() {
        assert_eq!(SessionState::default(), SessionState::Uninitialized);
    }
}
