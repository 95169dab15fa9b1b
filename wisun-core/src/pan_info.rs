//! PAN (network) information discovered by an active scan

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters of the meter's PAN, needed to join its network
///
/// All fields are the textual hex values reported by the modem. The JSON
/// form uses the modem's own key names so that a cache file written by
/// the bridge can be inspected against a raw `EPANDESC` dump.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "Channel", default)]
    pub channel: String,
    #[serde(rename = "PanID", alias = "Pan ID", default)]
    pub pan_id: String,
    #[serde(rename = "Addr", default)]
    pub addr: String,
    #[serde(rename = "LQI", default, skip_serializing_if = "Option::is_none")]
    pub lqi: Option<String>,
    #[serde(rename = "PairID", default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,
    #[serde(rename = "Side", default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(
        rename = "Channel Page",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_page: Option<String>,
}

impl NetworkInfo {
    /// Create network info from the three required fields
    pub fn new(
        channel: impl Into<String>,
        pan_id: impl Into<String>,
        addr: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            pan_id: pan_id.into(),
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Build network info from `Key:Value` pairs as printed by the modem
    ///
    /// Returns `None` when the pairs do not describe a usable PAN.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Option<Self> {
        let get = |key: &str| pairs.get(key).cloned();
        let info = Self {
            channel: get("Channel").unwrap_or_default(),
            pan_id: get("Pan ID").or_else(|| get("PanID")).unwrap_or_default(),
            addr: get("Addr").unwrap_or_default(),
            lqi: get("LQI"),
            pair_id: get("PairID"),
            side: get("Side"),
            channel_page: get("Channel Page"),
        };
        info.is_usable().then_some(info)
    }

    /// Channel, PAN id and address must all be present to join
    pub fn is_usable(&self) -> bool {
        !self.channel.is_empty() && !self.pan_id.is_empty() && !self.addr.is_empty()
    }
}
