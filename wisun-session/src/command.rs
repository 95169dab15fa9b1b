//! Request/response command channel over the modem transport
//!
//! A command is written to the device, then every inbound text record is
//! collected (starting with the device's echo of the command) until a
//! record satisfies the caller's terminal predicate or the device reports
//! `FAIL <code>`.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use wisun_core::{WiSunError, WiSunResult};
use wisun_transport::{CRLF, ModemTransport};

/// Default bound for ordinary commands
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Prefix of the record the modem sends when a command fails
pub const FAIL_MARKER: &str = "FAIL";

/// Known modem error codes; ER01-ER03 and ER07-ER08 are reserved
static MODEM_ERRORS: [(&str, &str); 5] = [
    ("ER04", "The specified command is not supported"),
    ("ER05", "The number of arguments of the specified command is incorrect"),
    (
        "ER06",
        "The argument format or value range of the specified command is incorrect",
    ),
    ("ER09", "A UART input error occurred"),
    (
        "ER10",
        "The specified command was accepted but its execution failed",
    ),
];

/// Look up the human-readable reason of a modem error code
pub fn modem_error_reason(code: &str) -> Option<&'static str> {
    MODEM_ERRORS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, reason)| *reason)
}

/// Default terminal predicate: the record starts with `OK`
pub fn is_ok(record: &str) -> bool {
    record.starts_with("OK")
}

/// Parse a failure record, returning the error it reports
fn parse_failure(record: &str) -> Option<WiSunError> {
    let code = record.strip_prefix(FAIL_MARKER)?.strip_prefix(' ')?.trim();
    if code.is_empty() {
        return None;
    }
    Some(WiSunError::Modem {
        code: code.to_string(),
        reason: modem_error_reason(code),
    })
}

/// Single-flight command channel
///
/// Concurrent callers are serialized on an internal slot; a command only
/// sees records that arrive after it was issued.
pub struct CommandChannel {
    transport: Arc<ModemTransport>,
    slot: Mutex<()>,
}

impl CommandChannel {
    pub fn new(transport: Arc<ModemTransport>) -> Self {
        Self {
            transport,
            slot: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<ModemTransport> {
        &self.transport
    }

    /// Send a text command built from space-joined tokens
    ///
    /// CRLF is appended. Returns every record received up to and including
    /// the terminal one.
    ///
    /// # Errors
    /// * `Modem` if the device answers with a failure record
    /// * `CommandTimeout` if no terminal record arrives within `timeout`
    /// * `TransportIo` if the write fails or the device reports a read error
    pub async fn send_text<P>(
        &self,
        tokens: &[&str],
        is_terminal: P,
        timeout: Duration,
    ) -> WiSunResult<Vec<String>>
    where
        P: Fn(&str) -> bool + Send,
    {
        let command = tokens.join(" ");
        let mut bytes = Vec::with_capacity(command.len() + CRLF.len());
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(CRLF);
        self.exchange(&command, &bytes, is_terminal, timeout).await
    }

    /// Send a pre-built command exactly as given
    ///
    /// `label` names the command in logs and timeout errors.
    pub async fn send_raw<P>(
        &self,
        label: &str,
        bytes: &[u8],
        is_terminal: P,
        timeout: Duration,
    ) -> WiSunResult<Vec<String>>
    where
        P: Fn(&str) -> bool + Send,
    {
        self.exchange(label, bytes, is_terminal, timeout).await
    }

    async fn exchange<P>(
        &self,
        label: &str,
        bytes: &[u8],
        is_terminal: P,
        timeout: Duration,
    ) -> WiSunResult<Vec<String>>
    where
        P: Fn(&str) -> bool + Send,
    {
        let _slot = self.slot.lock().await;

        // subscribe before writing so that no reply can be missed
        let records = self.transport.subscribe_records();
        let errors = self.transport.subscribe_errors();

        log::debug!(">> {}", label);
        self.transport.write(bytes).await?;

        match tokio::time::timeout(timeout, collect(records, errors, is_terminal)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Command \"{}\" timed out after {:?}", label, timeout);
                Err(WiSunError::CommandTimeout {
                    command: label.to_string(),
                    timeout,
                })
            }
        }
    }
}

async fn collect<P>(
    mut records: broadcast::Receiver<String>,
    mut errors: broadcast::Receiver<Arc<io::Error>>,
    is_terminal: P,
) -> WiSunResult<Vec<String>>
where
    P: Fn(&str) -> bool,
{
    let mut responses = Vec::new();
    loop {
        tokio::select! {
            record = records.recv() => match record {
                Ok(record) => {
                    if let Some(err) = parse_failure(&record) {
                        log::error!("{}", err);
                        return Err(err);
                    }
                    let done = is_terminal(&record);
                    responses.push(record);
                    if done {
                        return Ok(responses);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Command reply stream lagged, {} records skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(WiSunError::TransportClosed),
            },
            error = errors.recv() => match error {
                Ok(error) => {
                    return Err(WiSunError::TransportIo(io::Error::new(
                        error.kind(),
                        error.to_string(),
                    )));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(WiSunError::TransportClosed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeModem, lines};

    const SHORT: Duration = Duration::from_millis(200);

    #[test]
    fn test_modem_error_table() {
        assert_eq!(
            modem_error_reason("ER04"),
            Some("The specified command is not supported")
        );
        assert!(modem_error_reason("ER10").is_some());
        assert!(modem_error_reason("ER01").is_none());
        assert!(modem_error_reason("ER99").is_none());
    }

    #[test]
    fn test_parse_failure() {
        assert!(parse_failure("OK").is_none());
        assert!(parse_failure("FAILURE").is_none());
        assert!(matches!(
            parse_failure("FAIL ER05"),
            Some(WiSunError::Modem { code, reason: Some(_) }) if code == "ER05"
        ));
    }

    #[tokio::test]
    async fn test_send_text_collects_until_ok() {
        let modem = FakeModem::start(|command| match command {
            "SKVER" => lines(&["EVER 1.2.10", "OK"]),
            _ => Vec::new(),
        });
        let channel = CommandChannel::new(modem.transport());

        let responses = channel.send_text(&["SKVER"], is_ok, SHORT).await.unwrap();
        assert_eq!(responses, vec!["SKVER", "EVER 1.2.10", "OK"]);
        assert_eq!(modem.commands(), vec!["SKVER"]);
    }

    #[tokio::test]
    async fn test_send_text_custom_terminal() {
        let modem = FakeModem::start(|_| lines(&["OK", "EVENT 21 FE80", "EVENT 22 FE80"]));
        let channel = CommandChannel::new(modem.transport());

        let responses = channel
            .send_text(&["SKSCAN", "2"], |r| r.starts_with("EVENT 22"), SHORT)
            .await
            .unwrap();
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0], "SKSCAN 2");
        assert_eq!(responses[3], "EVENT 22 FE80");
    }

    #[tokio::test]
    async fn test_known_failure_code_has_reason() {
        let modem = FakeModem::start(|_| lines(&["FAIL ER04"]));
        let channel = CommandChannel::new(modem.transport());

        let err = channel.send_text(&["SKBOGUS"], is_ok, SHORT).await.unwrap_err();
        assert!(err.to_string().contains("The specified command is not supported"));
        assert!(err.to_string().contains("ER04"));
    }

    #[tokio::test]
    async fn test_unknown_failure_code_without_reason() {
        let modem = FakeModem::start(|_| lines(&["FAIL ER99"]));
        let channel = CommandChannel::new(modem.transport());

        let err = channel.send_text(&["SKBOGUS"], is_ok, SHORT).await.unwrap_err();
        match err {
            WiSunError::Modem { code, reason } => {
                assert_eq!(code, "ER99");
                assert!(reason.is_none());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_wins_over_terminal_predicate() {
        let modem = FakeModem::start(|_| lines(&["FAIL ER10"]));
        let channel = CommandChannel::new(modem.transport());

        let result = channel
            .send_text(&["SKJOIN", "FE80"], |r| r.starts_with("FAIL"), SHORT)
            .await;
        assert!(matches!(result, Err(WiSunError::Modem { .. })));
    }

    #[tokio::test]
    async fn test_timeout_names_command() {
        let modem = FakeModem::start(|_| Vec::new());
        let channel = CommandChannel::new(modem.transport());

        let err = channel
            .send_text(&["SKSREG", "S2", "21"], is_ok, Duration::from_millis(50))
            .await
            .unwrap_err();
        match &err {
            WiSunError::CommandTimeout { command, timeout } => {
                assert_eq!(command, "SKSREG S2 21");
                assert_eq!(*timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.to_string(), "Command \"SKSREG S2 21\" timed out after 50ms");
    }

    #[tokio::test]
    async fn test_send_raw_writes_bytes_verbatim() {
        let modem = FakeModem::start(|_| lines(&["EVENT 21 FE80 0 00", "OK"]));
        let channel = CommandChannel::new(modem.transport());

        let mut bytes = b"SKSENDTO 1 FE80 0E1A 1 0002 ".to_vec();
        bytes.extend_from_slice(&[0x10, 0x81]);
        let responses = channel
            .send_raw("SKSENDTO", &bytes, is_ok, SHORT)
            .await
            .unwrap();
        assert_eq!(responses.last().map(String::as_str), Some("OK"));
        assert_eq!(modem.commands(), vec!["SKSENDTO 1 FE80 0E1A 1 0002 1081"]);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let modem = FakeModem::start(|_| Vec::new());
        let channel = CommandChannel::new(modem.transport());
        channel.transport().close().await;

        let result = channel.send_text(&["SKVER"], is_ok, SHORT).await;
        assert!(matches!(result, Err(WiSunError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_io_error_without_waiting() {
        let (local, remote) = tokio::io::duplex(64);
        drop(remote);
        let channel = CommandChannel::new(Arc::new(ModemTransport::spawn(local)));

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            channel.send_text(&["SKVER"], is_ok, Duration::from_secs(30)),
        )
        .await
        .expect("a failed write must not wait for the command timeout");
        match result {
            Err(WiSunError::TransportIo(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
