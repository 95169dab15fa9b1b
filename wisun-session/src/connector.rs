//! Connector abstraction and the serial modem implementation
//!
//! The client drives a meter through the [`WiSunConnector`] trait and obtains
//! a fresh connector from a [`ConnectorFactory`] on every bring-up, so that a
//! discarded session can be replaced without the client knowing how the
//! device is opened.

use crate::session::{ConnectionSession, SessionTimings};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use wisun_core::{NetworkInfo, WiSunError, WiSunResult};
use wisun_echonet::Frame;
use wisun_transport::{ModemTransport, SerialSettings};

/// Operations the client needs from a Wi-SUN link
#[async_trait]
pub trait WiSunConnector: Send + Sync {
    /// Register Route-B credentials
    async fn set_auth(&mut self, id: &str, password: &str) -> WiSunResult<()>;

    /// Scan for the meter's PAN, at most `max_retries` times
    async fn scan(&mut self, max_retries: u32) -> WiSunResult<NetworkInfo>;

    /// Join the PAN described by `info`
    async fn join(&mut self, info: &NetworkInfo) -> WiSunResult<()>;

    /// Send an encoded ECHONET Lite frame to the meter
    async fn send_echonet_lite(&mut self, payload: &[u8]) -> WiSunResult<()>;

    /// Frames received from the meter
    fn subscribe_frames(&self) -> broadcast::Receiver<Frame>;

    /// Parameters of the joined PAN
    fn network_info(&self) -> WiSunResult<NetworkInfo>;

    /// Release the link; never fails
    async fn close(&mut self);
}

/// Creates a new connector for every bring-up
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    type Connector: WiSunConnector;

    async fn create(&self) -> WiSunResult<Self::Connector>;
}

#[async_trait]
impl WiSunConnector for ConnectionSession {
    async fn set_auth(&mut self, id: &str, password: &str) -> WiSunResult<()> {
        ConnectionSession::set_auth(self, id, password).await
    }

    async fn scan(&mut self, max_retries: u32) -> WiSunResult<NetworkInfo> {
        ConnectionSession::scan(self, max_retries).await
    }

    async fn join(&mut self, info: &NetworkInfo) -> WiSunResult<()> {
        ConnectionSession::join(self, info).await
    }

    async fn send_echonet_lite(&mut self, payload: &[u8]) -> WiSunResult<()> {
        ConnectionSession::send_echonet_lite(self, payload).await
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        ConnectionSession::subscribe_frames(self)
    }

    fn network_info(&self) -> WiSunResult<NetworkInfo> {
        ConnectionSession::network_info(self).cloned()
    }

    async fn close(&mut self) {
        ConnectionSession::close(self).await
    }
}

/// Supported Wi-SUN modems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemModel {
    Bp35a1,
    Bp35c0,
    Bp35c2,
    Wsr35a1,
    RsWsuhaP,
}

impl ModemModel {
    pub const ALL: [ModemModel; 5] = [
        ModemModel::Bp35a1,
        ModemModel::Bp35c0,
        ModemModel::Bp35c2,
        ModemModel::Wsr35a1,
        ModemModel::RsWsuhaP,
    ];

    /// Interface selector for `SKSCAN`/`SKSENDTO`; 0 is the B-route side
    pub fn side(&self) -> Option<u8> {
        match self {
            ModemModel::Bp35a1 | ModemModel::Wsr35a1 => None,
            ModemModel::Bp35c0 | ModemModel::Bp35c2 | ModemModel::RsWsuhaP => Some(0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModemModel::Bp35a1 => "BP35A1",
            ModemModel::Bp35c0 => "BP35C0",
            ModemModel::Bp35c2 => "BP35C2",
            ModemModel::Wsr35a1 => "WSR35A1-00",
            ModemModel::RsWsuhaP => "RS-WSUHA-P",
        }
    }
}

impl fmt::Display for ModemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModemModel {
    type Err = WiSunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModemModel::ALL
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WiSunError::InvalidConfig(format!("Unsupported Wi-SUN modem: {}", s)))
    }
}

/// Opens the serial device and wraps it in a [`ConnectionSession`]
#[derive(Debug, Clone)]
pub struct SerialConnectorFactory {
    model: ModemModel,
    settings: SerialSettings,
    timings: SessionTimings,
}

impl SerialConnectorFactory {
    pub fn new(model: ModemModel, device_path: impl Into<String>) -> Self {
        Self {
            model,
            settings: SerialSettings::new(device_path),
            timings: SessionTimings::default(),
        }
    }

    pub fn with_settings(model: ModemModel, settings: SerialSettings) -> Self {
        Self {
            model,
            settings,
            timings: SessionTimings::default(),
        }
    }

    pub fn model(&self) -> ModemModel {
        self.model
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl ConnectorFactory for SerialConnectorFactory {
    type Connector = ConnectionSession;

    async fn create(&self) -> WiSunResult<ConnectionSession> {
        log::info!("Opening {} on {}", self.model, self.settings.port_name);
        let transport = ModemTransport::open(&self.settings)?;
        Ok(ConnectionSession::with_timings(
            Arc::new(transport),
            self.model.side(),
            self.timings.clone(),
        ))
    }
}
