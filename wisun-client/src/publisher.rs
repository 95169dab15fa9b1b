//! Upward boundary to the message bus

use async_trait::async_trait;
use wisun_core::WiSunResult;

/// Receives one `(entity id, value)` pair per updated sensor
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(&self, entity_id: &str, value: &str) -> WiSunResult<()>;
}

/// Publisher that writes every update to the log
#[derive(Debug, Clone)]
pub struct LogPublisher {
    device_id: String,
}

impl LogPublisher {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

#[async_trait]
impl StatePublisher for LogPublisher {
    async fn publish(&self, entity_id: &str, value: &str) -> WiSunResult<()> {
        log::info!("{}/{} = {}", self.device_id, entity_id, value);
        Ok(())
    }
}

/// Publish every update, returning how many were accepted
///
/// A failing update is logged and does not stop the others.
pub async fn publish_all<P>(publisher: &P, updates: &[(String, String)]) -> usize
where
    P: StatePublisher + ?Sized,
{
    let mut published = 0;
    for (entity_id, value) in updates {
        match publisher.publish(entity_id, value).await {
            Ok(()) => published += 1,
            Err(e) => log::error!("Failed to publish {}: {}", entity_id, e),
        }
    }
    published
}
