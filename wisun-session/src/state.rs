//! Scan/join session state machine

use wisun_core::{WiSunError, WiSunResult};

/// Wi-SUN session state
///
/// # State Transitions
/// ```text
/// Idle -> Scanning (on scan)
/// Scanning -> ScanFound (PAN description received)
/// Scanning -> Idle (nothing found or scan failed)
/// Idle | ScanFound -> Joining (on join)
/// Joining -> Joined (EVENT 25)
/// Joining -> Idle (EVENT 24 or command failure)
/// any -> Closed (on close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No PAN selected, no scan in progress (initial state)
    #[default]
    Idle,
    /// Active scan in progress
    Scanning,
    /// A PAN was found and may be joined
    ScanFound,
    /// PANA authentication in progress
    Joining,
    /// Joined; ECHONET Lite frames can be sent
    Joined,
    /// Transport released; the session cannot be reused
    Closed,
}

impl SessionState {
    /// Check if frames can be sent to the meter
    ///
    /// # Returns
    /// `true` if the session is in `Joined` state, `false` otherwise
    pub fn is_joined(&self) -> bool {
        matches!(self, SessionState::Joined)
    }

    /// Validate state transition
    ///
    /// # Arguments
    /// * `new_state` - The target state
    ///
    /// # Returns
    /// `Ok(())` if the transition is valid
    ///
    /// # Errors
    /// Returns `InvalidState` for a transition not listed on [`SessionState`].
    /// `Closed` is terminal: nothing leaves it, and any other state may
    /// enter it.
    pub fn validate_transition(&self, new_state: SessionState) -> WiSunResult<()> {
        let valid = match (*self, new_state) {
            (SessionState::Idle, SessionState::Scanning) => true,
            (SessionState::ScanFound, SessionState::Scanning) => true,
            (SessionState::Scanning, SessionState::ScanFound) => true,
            (SessionState::Scanning, SessionState::Idle) => true,
            (SessionState::Idle, SessionState::Joining) => true,
            (SessionState::ScanFound, SessionState::Joining) => true,
            (SessionState::Joining, SessionState::Joined) => true,
            (SessionState::Joining, SessionState::Idle) => true,
            (SessionState::Closed, _) => false,
            (_, SessionState::Closed) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(WiSunError::InvalidState(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning",
            SessionState::ScanFound => "ScanFound",
            SessionState::Joining => "Joining",
            SessionState::Joined => "Joined",
            SessionState::Closed => "Closed",
        }
    }
}
