//! Wi-SUN modem session layer
//!
//! Provides the request/response command channel over the modem transport,
//! the scan/join state machine, and the connector traits the meter client is
//! written against.

pub mod command;
pub mod connector;
pub mod scan;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use command::{COMMAND_TIMEOUT, CommandChannel, FAIL_MARKER, is_ok, modem_error_reason};
pub use connector::{ConnectorFactory, ModemModel, SerialConnectorFactory, WiSunConnector};
pub use scan::{SCAN_DURATION, parse_pan_lines, parse_scan_reply, scan_timeout};
pub use session::{ConnectionSession, JOIN_DURATION, SCAN_RETRY_PAUSE, SessionTimings};
pub use state::SessionState;
