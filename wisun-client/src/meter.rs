//! Smart meter client: bring-up, GET with retry and state updates

use crate::cache::NetworkInfoCache;
use crate::config::ClientConfig;
use crate::device::{BRING_UP_EPCS, DeviceInfo};
use tokio::sync::broadcast;
use wisun_core::{WiSunError, WiSunResult};
use wisun_echonet::Frame;
use wisun_session::{ConnectorFactory, WiSunConnector};

/// Drives one smart meter through a [`ConnectorFactory`]
///
/// # Lifecycle
/// 1. [`initialize`](Self::initialize) authenticates, joins the PAN (cached
///    or freshly scanned) and reads the meter's identity and calibration.
/// 2. [`request`](Self::request) polls every sensor.
/// 3. When a fetch exhausts its retries the session is discarded; the next
///    fetch runs bring-up again before sending.
pub struct MeterClient<F: ConnectorFactory> {
    factory: F,
    config: ClientConfig,
    cache: NetworkInfoCache,
    connector: Option<F::Connector>,
    device: Option<DeviceInfo>,
    generation: u64,
}

impl<F: ConnectorFactory> MeterClient<F> {
    pub fn new(factory: F, config: ClientConfig) -> Self {
        let cache = NetworkInfoCache::new(config.cache_path.clone());
        Self {
            factory,
            config,
            cache,
            connector: None,
            device: None,
            generation: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Identity and catalog, once initialized
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Whether a joined session is currently held
    pub fn is_connected(&self) -> bool {
        self.connector.is_some()
    }

    /// Number of sessions established so far
    ///
    /// Changes whenever bring-up replaces the session, which also replaces
    /// the stream behind [`subscribe_frames`](Self::subscribe_frames).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames received on the current session, including unsolicited ones
    pub fn subscribe_frames(&self) -> Option<broadcast::Receiver<Frame>> {
        self.connector.as_ref().map(|c| c.subscribe_frames())
    }

    /// Bring up the link and read the meter's identity
    ///
    /// Any failure closes the session and is returned as is; bring-up is
    /// not retried here.
    pub async fn initialize(&mut self) -> WiSunResult<&DeviceInfo> {
        self.config.validate()?;
        self.connect().await?;

        let response = self.fetch_data(&BRING_UP_EPCS).await?;
        let device = match self.identify(&response) {
            Ok(device) => device,
            Err(e) => {
                log::error!("Cannot identify the meter: {}", e);
                self.discard_session().await;
                return Err(e);
            }
        };

        log::info!(
            "Smart meter {} ready with {} entities",
            device.device_id,
            device.entities.len()
        );
        Ok(&*self.device.insert(device))
    }

    fn identify(&self, response: &Frame) -> WiSunResult<DeviceInfo> {
        let connector = self.connector.as_ref().ok_or(WiSunError::NotConnected)?;
        let network = connector.network_info()?;
        DeviceInfo::from_bring_up(&network, response)
    }

    /// Create a session and join the meter's PAN
    ///
    /// A session still held from an earlier bring-up is closed first.
    async fn connect(&mut self) -> WiSunResult<()> {
        self.discard_session().await;
        let mut connector = self.factory.create().await?;
        match self.establish(&mut connector).await {
            Ok(()) => {
                self.connector = Some(connector);
                self.generation += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("Bring-up failed: {}", e);
                connector.close().await;
                Err(e)
            }
        }
    }

    async fn establish(&self, connector: &mut F::Connector) -> WiSunResult<()> {
        connector
            .set_auth(&self.config.route_b_id, &self.config.route_b_password)
            .await?;

        if let Some(info) = self.cache.load().await {
            log::info!("Joining cached PAN {} on channel {}", info.pan_id, info.channel);
            match connector.join(&info).await {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("Cached PAN join failed: {}; scanning", e),
            }
        }

        let info = connector.scan(self.config.scan_retries).await?;
        connector.join(&info).await?;
        if let Err(e) = self.cache.store(&info).await {
            log::warn!("{}", e);
        }
        Ok(())
    }

    async fn discard_session(&mut self) {
        if let Some(mut connector) = self.connector.take() {
            connector.close().await;
        }
    }

    /// Read `epcs` from the meter
    ///
    /// A fresh request (new transaction id) is sent for every attempt. When
    /// all attempts fail the session is discarded.
    ///
    /// # Errors
    /// `FetchExhausted` carrying the last attempt's error; bring-up errors if
    /// no session was held and bring-up failed.
    pub async fn fetch_data(&mut self, epcs: &[u8]) -> WiSunResult<Frame> {
        if self.connector.is_none() {
            log::info!("No active session, running bring-up");
            self.connect().await?;
        }

        let attempts = self.config.get_attempts();
        let mut last_error = WiSunError::NotConnected;
        for attempt in 1..=attempts {
            let request = Frame::get_request(epcs);
            match self.get_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    log::warn!("GET attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
            }
        }

        log::error!("GET failed after {} attempts, discarding session", attempts);
        self.discard_session().await;
        Err(WiSunError::FetchExhausted {
            attempts,
            last: Box::new(last_error),
        })
    }

    async fn get_once(&mut self, request: &Frame) -> WiSunResult<Frame> {
        let connector = self.connector.as_mut().ok_or(WiSunError::NotConnected)?;

        let mut frames = connector.subscribe_frames();
        log::debug!("Sending request: {}", request);
        connector.send_echonet_lite(&request.encode()?).await?;

        let timeout = self.config.get_timeout;
        let response = tokio::time::timeout(timeout, wait_for_response(&mut frames, request))
            .await
            .map_err(|_| WiSunError::ResponseTimeout(timeout))??;

        if response.esv().is_error() {
            return Err(WiSunError::Application {
                esv: response.esv().0,
            });
        }
        Ok(response)
    }

    /// Poll every sensor once
    pub async fn request(&mut self) -> WiSunResult<Vec<(String, String)>> {
        let epcs = self
            .device
            .as_ref()
            .map(DeviceInfo::request_epcs)
            .ok_or_else(|| WiSunError::InvalidState("client is not initialized".to_string()))?;
        let response = self.fetch_data(&epcs).await?;
        Ok(self.updates_from(&response))
    }

    /// Map a frame from the meter to `(entity id, value)` pairs
    pub fn updates_from(&self, frame: &Frame) -> Vec<(String, String)> {
        match &self.device {
            Some(device) => device.updates_from(frame),
            None => {
                log::warn!("Ignoring frame before initialization: {}", frame);
                Vec::new()
            }
        }
    }

    /// Updates carried by an unsolicited notification (INF/INFC)
    ///
    /// Responses to this client's own requests are left to
    /// [`request`](Self::request).
    pub fn notification_updates(&self, frame: &Frame) -> Vec<(String, String)> {
        if !frame.esv().is_notification() {
            return Vec::new();
        }
        self.updates_from(frame)
    }

    /// Release the session
    pub async fn close(&mut self) {
        self.discard_session().await;
    }
}

async fn wait_for_response(
    frames: &mut broadcast::Receiver<Frame>,
    request: &Frame,
) -> WiSunResult<Frame> {
    loop {
        match frames.recv().await {
            Ok(frame) if request.is_correlated_response(&frame) => {
                log::debug!("Received response: {}", frame);
                return Ok(frame);
            }
            Ok(frame) => log::debug!("Ignoring uncorrelated frame: {}", frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Frame stream lagged, {} frames skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Err(WiSunError::TransportClosed),
        }
    }
}
