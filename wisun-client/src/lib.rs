//! Smart meter client
//!
//! Brings up the Wi-SUN link, reads the meter's identity and calibration,
//! and turns ECHONET Lite responses into `(entity id, value)` updates for
//! the message bus.

pub mod cache;
pub mod config;
pub mod device;
pub mod entity;
pub mod meter;
pub mod publisher;

pub use cache::NetworkInfoCache;
pub use config::ClientConfig;
pub use device::{BRING_UP_EPCS, DeviceInfo};
pub use entity::{Calibration, Converter, CurrentPhases, Domain, Entity, catalog};
pub use meter::MeterClient;
pub use publisher::{LogPublisher, StatePublisher, publish_all};
