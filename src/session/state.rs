//! Session state machine.

use std::fmt;

/// Represents the lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session object exists but has not been started.
    #[default]
    New,
    /// Session is started and its variables are loaded.
    Active,
    /// Session outlived its expiry time and must be restarted.
    Expired,
    /// Backend refused access because another holder has the record locked.
    Locked,
    /// Session data was written back and released.
    Closed,
    /// Session data was deleted and the identifier invalidated.
    Destroyed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - New / Closed / Destroyed -> Active, Expired, Locked (start)
    /// - Active -> Closed
    /// - Active / Expired / Locked / Closed -> Destroyed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (New | Closed | Destroyed, Active | Expired | Locked)
                | (Active, Closed)
                | (Active | Expired | Locked | Closed, Destroyed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::SessionError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if `start()` may load the session from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::New | SessionState::Closed | SessionState::Destroyed
        )
    }

    /// Check if the session must be restarted before it can be used.
    pub fn needs_restart(&self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Locked)
    }

    /// Lowercase name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::New => "new",
            SessionState::Active => "active",
            SessionState::Expired => "expired",
            SessionState::Locked => "locked",
            SessionState::Closed => "closed",
            SessionState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        // New -> Active
        let mut state = SessionState::New;
        assert!(state.transition_to(SessionState::Active).is_ok());
        assert_eq!(state, SessionState::Active);

        // Active -> Closed
        assert!(state.transition_to(SessionState::Closed).is_ok());
        assert_eq!(state, SessionState::Closed);

        // Closed -> Active (started again)
        assert!(state.transition_to(SessionState::Active).is_ok());

        // Active -> Destroyed
        assert!(state.transition_to(SessionState::Destroyed).is_ok());
        assert_eq!(state, SessionState::Destroyed);

        // Destroyed -> Active (fresh identifier)
        assert!(state.transition_to(SessionState::Active).is_ok());
    }

    #[test]
    fn test_expired_and_locked_only_destroy() {
        for blocked in [SessionState::Expired, SessionState::Locked] {
            let mut state = blocked;
            assert!(state.transition_to(SessionState::Active).is_err());
            assert!(state.transition_to(SessionState::Closed).is_err());
            assert_eq!(state, blocked);
            assert!(state.transition_to(SessionState::Destroyed).is_ok());
        }
    }

    #[test]
    fn test_invalid_new_to_closed() {
        let mut state = SessionState::New;
        assert!(state.transition_to(SessionState::Closed).is_err());
        // State should remain unchanged
        assert_eq!(state, SessionState::New);
    }

    #[test]
    fn test_can_start() {
        assert!(SessionState::New.can_start());
        assert!(SessionState::Closed.can_start());
        assert!(SessionState::Destroyed.can_start());
        assert!(!SessionState::Active.can_start());
        assert!(!SessionState::Expired.can_start());
        assert!(!SessionState::Locked.can_start());
    }

    #[test]
    fn test_needs_restart() {
        assert!(SessionState::Expired.needs_restart());
        assert!(SessionState::Locked.needs_restart());
        assert!(!SessionState::Active.needs_restart());
    }

    #[test]
    fn test_default_and_display() {
        let state = SessionState::default();
        assert_eq!(state, SessionState::New);
        assert_eq!(state.to_string(), "new");
        assert_eq!(SessionState::Destroyed.to_string(), "destroyed");
    }
}
