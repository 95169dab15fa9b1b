//! Active scan parameters and PAN description parsing

use crate::command::COMMAND_TIMEOUT;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use wisun_core::NetworkInfo;

/// Scan duration code passed to `SKSCAN`
pub const SCAN_DURATION: u8 = 6;

/// Number of channels swept by one scan
pub const SCAN_CHANNEL_COUNT: u64 = 28;

/// Per-channel scan time unit (9.6 ms)
const SCAN_UNIT: Duration = Duration::from_micros(9_600);

/// Event reported when the active scan has finished
pub const SCAN_DONE_EVENT: &str = "EVENT 22";

static PAN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {2}(?P<key>[A-Za-z][A-Za-z ]*):(?P<value>[0-9A-Za-z]+)")
        .expect("PAN line pattern is valid")
});

/// Time the device needs to sweep every channel, plus command headroom
pub fn scan_timeout(duration: u8) -> Duration {
    let per_channel = SCAN_UNIT * 2u32.pow(u32::from(duration) + 1);
    per_channel * SCAN_CHANNEL_COUNT as u32 + COMMAND_TIMEOUT
}

/// Collect the indented `  Key:Value` lines of a scan reply
///
/// Lines without a colon separator are ignored.
pub fn parse_pan_lines<'a, I>(records: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a String>,
{
    records
        .into_iter()
        .filter_map(|record| PAN_LINE.captures(record))
        .map(|caps| (caps["key"].to_string(), caps["value"].to_string()))
        .collect()
}

/// Extract the PAN description from a complete scan reply
pub fn parse_scan_reply(records: &[String]) -> Option<NetworkInfo> {
    let pairs = parse_pan_lines(records);
    if pairs.is_empty() {
        return None;
    }
    let info = NetworkInfo::from_pairs(&pairs);
    if info.is_none() {
        log::warn!("Incomplete PAN description: {:?}", pairs);
    }
    info
}
