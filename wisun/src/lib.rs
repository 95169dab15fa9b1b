//! Wi-SUN Route-B smart meter bridge
//!
//! Reads a low-voltage smart meter over a Wi-SUN modem and reports its
//! sensors as `(entity id, value)` pairs.
//!
//! # Architecture
//!
//! - `wisun-core`: error type and PAN network info
//! - `wisun-echonet`: ECHONET Lite frame codec
//! - `wisun-transport`: serial modem transport, record framing, ERXUDP reassembly
//! - `wisun-session`: command channel, scan/join session, connector traits
//! - `wisun-client`: meter client, sensor catalog, network info cache
//!
//! # Usage
//!
//! ```no_run
//! use wisun::client::{ClientConfig, MeterClient};
//! use wisun::session::{ModemModel, SerialConnectorFactory};
//!
//! # async fn run() -> wisun::WiSunResult<()> {
//! let factory = SerialConnectorFactory::new(ModemModel::Bp35c2, "/dev/ttyUSB0");
//! let mut client = MeterClient::new(factory, ClientConfig::new("ROUTE-B-ID", "PASSWORD"));
//! client.initialize().await?;
//! for (entity_id, value) in client.request().await? {
//!     println!("{} = {}", entity_id, value);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub use wisun_core::{NetworkInfo, WiSunError, WiSunResult};

pub mod echonet {
    pub use wisun_echonet::*;
}

pub mod transport {
    pub use wisun_transport::*;
}

pub mod session {
    pub use wisun_session::*;
}

pub mod client {
    pub use wisun_client::*;
}
