//! Serial port settings for the Wi-SUN modem

use tokio_serial::SerialStream;
use wisun_core::{WiSunError, WiSunResult};

/// Baud rate used by every supported modem
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Create settings for `port_name` with the modem defaults (115200 8N1)
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_baud_rate(port_name, DEFAULT_BAUD_RATE)
    }

    /// Create settings with a non-default baud rate
    pub fn with_baud_rate(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }

    /// Open the serial device
    ///
    /// # Errors
    /// Returns `TransportIo` if the device cannot be opened
    pub fn open(&self) -> WiSunResult<SerialStream> {
        let builder = tokio_serial::new(&self.port_name, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            WiSunError::TransportIo(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.port_name, e
            )))
        })?;

        log::info!(
            "Opened serial port {} at {} baud",
            self.port_name,
            self.baud_rate
        );
        Ok(stream)
    }
}
