//! Wi-SUN connection session: authentication, scan, join and send

use crate::command::{COMMAND_TIMEOUT, CommandChannel, is_ok};
use crate::scan::{SCAN_DONE_EVENT, SCAN_DURATION, parse_scan_reply, scan_timeout};
use crate::state::SessionState;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wisun_core::{NetworkInfo, WiSunError, WiSunResult};
use wisun_echonet::Frame;
use wisun_transport::ModemTransport;

/// Extra time the device may take to complete PANA authentication
pub const JOIN_DURATION: Duration = Duration::from_secs(38);

/// Pause between two scan attempts
pub const SCAN_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Destination port token of `SKSENDTO` (3610)
const ECHONET_PORT_HEX: &str = "0E1A";

/// Join outcome: `EVENT 25` on success, `EVENT 24` on failure
static JOIN_EVENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^EVENT (24|25)").expect("join event pattern is valid"));

const JOIN_SUCCESS_EVENT: &str = "EVENT 25";

/// Timeouts used by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimings {
    pub command: Duration,
    pub scan: Duration,
    pub join: Duration,
    pub scan_pause: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            command: COMMAND_TIMEOUT,
            scan: scan_timeout(SCAN_DURATION),
            join: JOIN_DURATION + COMMAND_TIMEOUT,
            scan_pause: SCAN_RETRY_PAUSE,
        }
    }
}

/// A session with one Wi-SUN modem
pub struct ConnectionSession {
    channel: CommandChannel,
    side: Option<u8>,
    timings: SessionTimings,
    state: SessionState,
    address: Option<String>,
    network_info: Option<NetworkInfo>,
}

impl ConnectionSession {
    /// Create a session over a running transport
    ///
    /// `side` is the interface selector appended to `SKSCAN` and `SKSENDTO`
    /// on modems that have one.
    pub fn new(transport: ModemTransport, side: Option<u8>) -> Self {
        Self::with_timings(Arc::new(transport), side, SessionTimings::default())
    }

    pub fn with_timings(
        transport: Arc<ModemTransport>,
        side: Option<u8>,
        timings: SessionTimings,
    ) -> Self {
        Self {
            channel: CommandChannel::new(transport),
            side,
            timings,
            state: SessionState::default(),
            address: None,
            network_info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    fn transition(&mut self, new_state: SessionState) -> WiSunResult<()> {
        self.state.validate_transition(new_state)?;
        log::debug!("Session state: {} -> {}", self.state.as_str(), new_state.as_str());
        self.state = new_state;
        Ok(())
    }

    fn side_token(&self) -> Option<String> {
        self.side.map(|side| side.to_string())
    }

    /// Register the Route-B credentials with the modem
    ///
    /// # Arguments
    /// * `id` - 32-character Route-B authentication id (`SKSETRBID`)
    /// * `password` - Route-B password (`SKSETPWD`, length in hex)
    ///
    /// # Errors
    /// `Modem` if the device rejects either command, `CommandTimeout` if it
    /// does not answer.
    pub async fn set_auth(&mut self, id: &str, password: &str) -> WiSunResult<()> {
        if self.state == SessionState::Closed {
            return Err(WiSunError::InvalidState("session is closed".to_string()));
        }
        log::info!("Setting authentication credentials...");
        self.channel
            .send_text(&["SKSETRBID", id], is_ok, self.timings.command)
            .await?;
        self.channel
            .send_text(&["SKSETPWD", "C", password], is_ok, self.timings.command)
            .await?;
        Ok(())
    }

    /// Run one active scan
    ///
    /// The scan covers every channel with duration code 6 and completes on
    /// `EVENT 22`. The state moves to `Scanning` while it runs and to
    /// `ScanFound` or back to `Idle` afterwards.
    ///
    /// # Returns
    /// `Some(info)` for the first usable PAN description, `None` if none was
    /// reported
    pub async fn scan_once(&mut self) -> WiSunResult<Option<NetworkInfo>> {
        self.transition(SessionState::Scanning)?;
        log::info!("Starting PAN scan...");

        let duration = SCAN_DURATION.to_string();
        let side = self.side_token();
        let mut tokens = vec!["SKSCAN", "2", "FFFFFFFF", duration.as_str()];
        tokens.extend(side.as_deref());

        let result = self
            .channel
            .send_text(&tokens, |r| r.starts_with(SCAN_DONE_EVENT), self.timings.scan)
            .await;
        let responses = match result {
            Ok(responses) => responses,
            Err(e) => {
                self.transition(SessionState::Idle)?;
                return Err(e);
            }
        };

        match parse_scan_reply(&responses) {
            Some(info) => {
                log::info!("PAN scan completed: channel={} pan_id={}", info.channel, info.pan_id);
                self.transition(SessionState::ScanFound)?;
                Ok(Some(info))
            }
            None => {
                self.transition(SessionState::Idle)?;
                Ok(None)
            }
        }
    }

    /// Scan until a PAN is found, at most `max_retries` times
    ///
    /// # Errors
    /// `ScanExhausted` once every attempt came back empty; command failures
    /// are returned as they occur.
    pub async fn scan(&mut self, max_retries: u32) -> WiSunResult<NetworkInfo> {
        for attempt in 1..=max_retries {
            if let Some(info) = self.scan_once().await? {
                return Ok(info);
            }
            log::warn!("Scan attempt {}/{} failed", attempt, max_retries);
            if attempt < max_retries {
                tokio::time::sleep(self.timings.scan_pause).await;
            }
        }
        log::error!("Scan failed after {} attempts", max_retries);
        Err(WiSunError::ScanExhausted {
            attempts: max_retries,
        })
    }

    /// Join the PAN described by `info`
    ///
    /// Sets the channel (`SKSREG S2`) and PAN id (`SKSREG S3`), resolves the
    /// meter's link-local address with `SKLL64`, then starts PANA with
    /// `SKJOIN` and waits for `EVENT 24`/`EVENT 25`.
    ///
    /// # Arguments
    /// * `info` - Network parameters from a scan or the cache
    ///
    /// # Errors
    /// `JoinRejected` if the modem reports the failure event. On any error
    /// the session returns to `Idle` and may be joined again.
    pub async fn join(&mut self, info: &NetworkInfo) -> WiSunResult<()> {
        self.transition(SessionState::Joining)?;
        log::info!("Configuring Wi-SUN connection...");

        match self.join_steps(info).await {
            Ok(address) => {
                self.transition(SessionState::Joined)?;
                log::info!("Joined PAN {} as {}", info.pan_id, address);
                self.address = Some(address);
                self.network_info = Some(info.clone());
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Idle)?;
                Err(e)
            }
        }
    }

    async fn join_steps(&self, info: &NetworkInfo) -> WiSunResult<String> {
        let timeout = self.timings.command;
        self.channel
            .send_text(&["SKSREG", "S2", info.channel.as_str()], is_ok, timeout)
            .await?;
        self.channel
            .send_text(&["SKSREG", "S3", info.pan_id.as_str()], is_ok, timeout)
            .await?;

        // the reply to SKLL64 is the bare address, right after the echo
        let responses = self
            .channel
            .send_text(&["SKLL64", info.addr.as_str()], |r| !r.starts_with("SKLL64"), timeout)
            .await?;
        let address = responses
            .get(1)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| WiSunError::MalformedRecord("SKLL64 returned no address".to_string()))?;

        let responses = self
            .channel
            .send_text(&["SKJOIN", address.as_str()], |r| JOIN_EVENT.is_match(r), self.timings.join)
            .await?;
        let event = responses.last().cloned().unwrap_or_default();
        if !event.starts_with(JOIN_SUCCESS_EVENT) {
            log::error!("Connection failed: {}", event);
            return Err(WiSunError::JoinRejected { event });
        }
        Ok(address)
    }

    /// Send an encoded ECHONET Lite frame to the joined meter
    ///
    /// The payload is written as binary after the `SKSENDTO` header. The
    /// meter's answer arrives later on the frame stream, not as the return
    /// value.
    ///
    /// # Errors
    /// `NotConnected` unless joined
    pub async fn send_echonet_lite(&self, payload: &[u8]) -> WiSunResult<()> {
        let address = self.address()?;
        log::debug!("Request message: {}", hex::encode(payload));

        let mut header = format!("SKSENDTO 1 {} {} 1", address, ECHONET_PORT_HEX);
        if let Some(side) = self.side {
            header.push_str(&format!(" {}", side));
        }
        header.push_str(&format!(" {:04X} ", payload.len()));

        let mut command = header.clone().into_bytes();
        command.extend_from_slice(payload);
        self.channel
            .send_raw(header.trim_end(), &command, is_ok, self.timings.command)
            .await?;
        Ok(())
    }

    /// Network parameters of the joined PAN
    pub fn network_info(&self) -> WiSunResult<&NetworkInfo> {
        match (&self.state, &self.network_info) {
            (SessionState::Joined, Some(info)) => Ok(info),
            _ => Err(WiSunError::NotConnected),
        }
    }

    /// IPv6 link-local address of the joined meter
    pub fn address(&self) -> WiSunResult<&str> {
        match (&self.state, &self.address) {
            (SessionState::Joined, Some(address)) => Ok(address.as_str()),
            _ => Err(WiSunError::NotConnected),
        }
    }

    /// Decoded frames received from the meter
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.channel.transport().subscribe_frames()
    }

    /// Release the transport
    ///
    /// Never fails; release problems are logged.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        log::info!("Closing serial port...");
        self.state = SessionState::Closed;
        self.address = None;
        self.network_info = None;
        self.channel.transport().close().await;
        log::info!("Serial port closed");
    }
}
