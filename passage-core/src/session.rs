//! Session state machine.
//!
//! Maps the wallet provider's live status onto `Idle -> Connecting ->
//! Connected`. Local calls only start provider work; `Connected` is entered
//! solely because the provider said so.
//!
//! A logout suppresses connected signals until the next local login. A
//! connect resolving after the user already logged out must not revive the
//! session, whether or not the provider managed to tear down in between.

use tracing::{debug, info};

use crate::types::{Identity, ProviderStatus, SessionState, Transition};

/// Derives the displayed session state from provider signals.
///
/// After `logout` every connected signal is ignored until the next
/// `begin_login`, including one that follows a confirmed teardown. A session
/// the provider opens on its own after a logout therefore stays hidden until
/// the user logs in again here.
///
/// A connected signal carrying a different address while `Connected` is an
/// account switch and is reported as a fresh login (`Connected -> Connected`).
#[derive(Debug, Clone, Default)]
pub struct SessionStateMachine {
    state: SessionState,
    /// Our `connect` call has not returned yet
    login_in_flight: bool,
    /// `connect` returned while the provider was still mid-ceremony
    awaiting_provider: bool,
    /// Last `is_connected` observed from the provider
    provider_connected: bool,
    /// Set by logout; connected signals are stale until the next login
    suppress_connected: bool,
    address: Option<Identity>,
}

impl SessionStateMachine {
    /// New machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Address of the live session, only while connected.
    pub fn identity(&self) -> Option<&Identity> {
        match self.state {
            SessionState::Connected => self.address.as_ref(),
            _ => None,
        }
    }

    /// Start a login. Only legal from `Idle`; otherwise a no-op returning `None`.
    pub fn begin_login(&mut self) -> Option<Transition> {
        if self.state != SessionState::Idle {
            debug!(state = %self.state, "Login ignored, session not idle");
            return None;
        }
        self.login_in_flight = true;
        self.suppress_connected = false;
        self.set(SessionState::Connecting)
    }

    /// The provider's `connect` resolved; settle on its live status.
    pub fn connect_resolved(&mut self, status: &ProviderStatus) -> Option<Transition> {
        self.login_in_flight = false;
        self.awaiting_provider = status.is_connecting && !status.is_connected;
        self.apply_signal(status)
    }

    /// The provider's `connect` rejected.
    pub fn connect_rejected(&mut self) -> Option<Transition> {
        self.login_in_flight = false;
        self.awaiting_provider = false;
        self.rederive()
    }

    /// Local logout: always lands in `Idle`.
    pub fn logout(&mut self) -> Option<Transition> {
        self.login_in_flight = false;
        self.awaiting_provider = false;
        self.suppress_connected = true;
        self.rederive()
    }

    /// Apply a status published by the provider.
    pub fn apply_signal(&mut self, status: &ProviderStatus) -> Option<Transition> {
        if !status.is_connecting {
            self.awaiting_provider = false;
        }
        if status.is_connected && self.suppress_connected {
            debug!("Ignoring stale connected signal after logout");
        }
        let switched = self.state == SessionState::Connected
            && status.is_connected
            && !self.suppress_connected
            && status.address.is_some()
            && status.address != self.address;

        self.provider_connected = status.is_connected;
        self.address = status.address.clone();

        if switched {
            info!(address = ?self.address, "Provider switched accounts");
            return Some(Transition {
                from: SessionState::Connected,
                to: SessionState::Connected,
            });
        }
        self.rederive()
    }

    fn rederive(&mut self) -> Option<Transition> {
        let next = if self.provider_connected && !self.suppress_connected {
            SessionState::Connected
        } else if self.login_in_flight || self.awaiting_provider {
            SessionState::Connecting
        } else {
            SessionState::Idle
        };
        self.set(next)
    }

    fn set(&mut self, next: SessionState) -> Option<Transition> {
        if next == self.state {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        info!(from = %transition.from, to = %transition.to, "Session transition");
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ProviderStatus {
        ProviderStatus::connected("0xabc")
    }

    #[test]
    fn test_login_flow() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.state(), SessionState::Idle);

        let t = machine.begin_login().unwrap();
        assert_eq!(t.to, SessionState::Connecting);

        // Provider reports the ceremony running: still connecting
        assert!(machine.apply_signal(&ProviderStatus::connecting()).is_none());
        assert_eq!(machine.state(), SessionState::Connecting);

        let t = machine.connect_resolved(&connected()).unwrap();
        assert!(t.is_login());
        assert_eq!(machine.identity(), Some(&Identity::new("0xabc")));
    }

    #[test]
    fn test_resolved_connect_waits_for_provider() {
        let mut machine = SessionStateMachine::new();
        machine.begin_login();

        assert!(machine.connect_resolved(&ProviderStatus::connecting()).is_none());
        assert_eq!(machine.state(), SessionState::Connecting);

        // Provider gives up without connecting
        let t = machine.apply_signal(&ProviderStatus::disconnected()).unwrap();
        assert_eq!(t.to, SessionState::Idle);
    }

    #[test]
    fn test_begin_login_ignored_unless_idle() {
        let mut machine = SessionStateMachine::new();
        machine.begin_login();
        assert!(machine.begin_login().is_none());

        machine.apply_signal(&connected());
        assert!(machine.begin_login().is_none());
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_connect_rejected_returns_to_idle() {
        let mut machine = SessionStateMachine::new();
        machine.begin_login();

        let t = machine.connect_rejected().unwrap();
        assert_eq!(t.to, SessionState::Idle);
        assert_eq!(machine.identity(), None);
    }

    #[test]
    fn test_external_signals_are_authoritative() {
        let mut machine = SessionStateMachine::new();

        // Restored session without a local login
        machine.apply_signal(&connected()).unwrap();
        assert_eq!(machine.state(), SessionState::Connected);

        // Remote expiry
        machine.apply_signal(&ProviderStatus::disconnected()).unwrap();
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_logout_always_idle() {
        let mut machine = SessionStateMachine::new();
        machine.apply_signal(&connected());

        let t = machine.logout().unwrap();
        assert_eq!(t.to, SessionState::Idle);

        // Provider failed to tear down and still reports connected
        assert!(machine.apply_signal(&connected()).is_none());
        assert_eq!(machine.state(), SessionState::Idle);

        // Tolerated from idle
        assert!(machine.logout().is_none());
    }

    #[test]
    fn test_stale_connected_after_logout_ignored() {
        let mut machine = SessionStateMachine::new();
        machine.begin_login();
        machine.logout();
        assert_eq!(machine.state(), SessionState::Idle);

        // The abandoned connect resolves late
        assert!(machine.connect_resolved(&connected()).is_none());
        assert_eq!(machine.state(), SessionState::Idle);

        // Still stale after the provider confirms teardown
        machine.apply_signal(&ProviderStatus::disconnected());
        assert!(machine.apply_signal(&connected()).is_none());
        assert_eq!(machine.state(), SessionState::Idle);

        // A fresh login accepts the provider again
        machine.begin_login();
        machine.connect_resolved(&connected());
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_account_switch_is_a_login() {
        let mut machine = SessionStateMachine::new();
        machine.apply_signal(&connected());

        // Same account again: nothing to report
        assert!(machine.apply_signal(&connected()).is_none());

        let t = machine.apply_signal(&ProviderStatus::connected("0xdef")).unwrap();
        assert!(t.is_login());
        assert_eq!(t.from, SessionState::Connected);
        assert_eq!(machine.identity(), Some(&Identity::new("0xdef")));
    }

    #[test]
    fn test_state_tracks_last_signal() {
        let signals = [true, true, false, true, false, false, true];
        let mut machine = SessionStateMachine::new();

        for connected_now in signals {
            let status = if connected_now {
                connected()
            } else {
                ProviderStatus::disconnected()
            };
            machine.apply_signal(&status);
            let expected = if connected_now {
                SessionState::Connected
            } else {
                SessionState::Idle
            };
            assert_eq!(machine.state(), expected);
        }
    }
}
