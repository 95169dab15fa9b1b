use std::time::Duration;
use thiserror::Error;

/// Main error type for the Wi-SUN bridge
///
/// A single error enum is shared by every layer of the stack so that a
/// failure raised deep in the transport can be propagated unchanged up to
/// the orchestration layer, which decides whether to retry or fail fast.
#[derive(Error, Debug)]
pub enum WiSunError {
    /// I/O fault on the underlying serial device (write, read or close)
    #[error("Transport I/O error: {0}")]
    TransportIo(#[from] std::io::Error),

    /// The transport's reader task has stopped; no further records will arrive
    #[error("Transport closed")]
    TransportClosed,

    /// A record did not match the expected grammar
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Frame shorter than the fixed 12-byte header
    #[error("Invalid frame: frame is too short ({0} bytes)")]
    FrameTooShort(usize),

    /// Frame does not start with the ECHONET Lite marker
    #[error("Invalid frame: unsupported header 0x{0:04X}")]
    UnsupportedHeader(u16),

    /// An EPC/PDC pair is truncated
    #[error("Invalid frame: EPC or PDC is missing for property #{index}")]
    PropertyHeaderMissing { index: usize },

    /// Fewer than PDC bytes remain for a property
    #[error("Invalid frame: EDT of 0x{epc:02X} is incomplete (expected {expected} bytes, {remaining} remaining)")]
    PropertyDataIncomplete {
        epc: u8,
        expected: usize,
        remaining: usize,
    },

    /// Requested property is absent from the frame
    #[error("Property not found: 0x{0:02X}")]
    PropertyNotFound(u8),

    /// Property is wider than a machine-native accessor can expose
    #[error("Property 0x{epc:02X} is {pdc} bytes wide; use the arbitrary-precision accessor")]
    ValueTooWide { epc: u8, pdc: u8 },

    /// Frame carries more properties than the 1-byte OPC can count
    #[error("Invalid frame: {0} properties exceed the OPC range")]
    TooManyProperties(usize),

    /// Property value does not fit its declared length
    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    /// Failure marker reported by the modem
    #[error(
        "Command failed. errorCode:{code}{}",
        .reason.map(|r| format!(" ({r})")).unwrap_or_default()
    )]
    Modem {
        code: String,
        reason: Option<&'static str>,
    },

    /// No terminal or failure record arrived before the deadline
    #[error("Command \"{command}\" timed out after {}ms", .timeout.as_millis())]
    CommandTimeout { command: String, timeout: Duration },

    /// Every scan attempt finished without finding a PAN
    #[error("Wi-SUN scan failed after {attempts} attempts")]
    ScanExhausted { attempts: u32 },

    /// The join attempt ended with the failure event
    #[error("Connection failed: {event}")]
    JoinRejected { event: String },

    /// Operation requires a joined session
    #[error("Not connected to the device")]
    NotConnected,

    /// Operation is not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Correlated response carries an error service code
    #[error("Application error response: esv=0x{esv:02X}")]
    Application { esv: u8 },

    /// No correlated response arrived before the deadline
    #[error("No response within {}ms", .0.as_millis())]
    ResponseTimeout(Duration),

    /// Every GET attempt failed; the session has been discarded
    #[error("Request failed after {attempts} attempts: {last}")]
    FetchExhausted {
        attempts: u32,
        #[source]
        last: Box<WiSunError>,
    },

    /// Configuration value out of range or unknown
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network info cache could not be serialized or parsed
    #[error("Cache error: {0}")]
    Cache(#[from] serde_json::Error),

    /// Network info cache file could not be written
    #[error("Cannot write cache file {path}: {source}")]
    CacheWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Wi-SUN operations
pub type WiSunResult<T> = Result<T, WiSunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modem_error_message_with_reason() {
        let err = WiSunError::Modem {
            code: "ER04".to_string(),
            reason: Some("unsupported command"),
        };
        assert_eq!(
            err.to_string(),
            "Command failed. errorCode:ER04 (unsupported command)"
        );
    }

    #[test]
    fn test_modem_error_message_without_reason() {
        let err = WiSunError::Modem {
            code: "ER99".to_string(),
            reason: None,
        };
        assert_eq!(err.to_string(), "Command failed. errorCode:ER99");
    }

    #[test]
    fn test_command_timeout_names_command_and_bound() {
        let err = WiSunError::CommandTimeout {
            command: "SKSCAN 2 FFFFFFFF 6".to_string(),
            timeout: Duration::from_millis(1500),
        };
        let message = err.to_string();
        assert!(message.contains("SKSCAN 2 FFFFFFFF 6"));
        assert!(message.contains("1500ms"));
    }
}
