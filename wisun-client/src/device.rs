//! Identity and sensor set of the joined meter

use crate::entity::{
    Calibration, CurrentPhases, EPC_COEFFICIENT, EPC_ENERGY_UNIT, EPC_INSTANTANEOUS_CURRENT,
    EPC_MANUFACTURER_CODE, Entity, catalog,
};
use wisun_core::{NetworkInfo, WiSunError, WiSunResult};
use wisun_echonet::Frame;

/// Properties read once during bring-up
pub const BRING_UP_EPCS: [u8; 4] = [
    EPC_MANUFACTURER_CODE,
    EPC_ENERGY_UNIT,
    EPC_COEFFICIENT,
    EPC_INSTANTANEOUS_CURRENT,
];

/// The meter as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub manufacturer: String,
    pub calibration: Calibration,
    pub entities: Vec<Entity>,
}

impl DeviceInfo {
    /// Build from the joined PAN and the bring-up GET response
    ///
    /// # Errors
    /// `PropertyNotFound` if the manufacturer code or energy unit is missing,
    /// `InvalidProperty` if the energy unit code is unknown.
    pub fn from_bring_up(network: &NetworkInfo, response: &Frame) -> WiSunResult<Self> {
        let manufacturer = format!("{:06X}", response.numeric_value(EPC_MANUFACTURER_CODE)?);

        let unit_code = response.numeric_value(EPC_ENERGY_UNIT)?;
        let unit_code = u8::try_from(unit_code).map_err(|_| {
            WiSunError::InvalidProperty(format!("Invalid E1 value: 0x{:X}", unit_code))
        })?;

        let coefficient = match response.property(EPC_COEFFICIENT) {
            Some(property) if property.pdc() > 0 => {
                let value = response.numeric_value(EPC_COEFFICIENT)?;
                u32::try_from(value).map_err(|_| {
                    WiSunError::InvalidProperty(format!("Invalid D3 value: 0x{:X}", value))
                })?
            }
            _ => 1,
        };
        let calibration = Calibration::from_unit_code(unit_code, coefficient)?;
        let phases = CurrentPhases::detect(response.property(EPC_INSTANTANEOUS_CURRENT));

        log::info!(
            "Meter {}: manufacturer={} unit=10^{} coefficient={} current={:?}",
            network.addr,
            manufacturer,
            calibration.exponent(),
            coefficient,
            phases
        );

        Ok(Self {
            device_id: format!("smartMeter_{}", network.addr),
            manufacturer,
            calibration,
            entities: catalog(calibration, phases),
        })
    }

    /// Property codes to poll, deduplicated in catalog order
    pub fn request_epcs(&self) -> Vec<u8> {
        let mut epcs: Vec<u8> = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            if !epcs.contains(&entity.epc) {
                epcs.push(entity.epc);
            }
        }
        epcs
    }

    /// Map every property of `frame` to `(entity id, value)` pairs
    ///
    /// Properties without a catalog entry, empty properties and values
    /// that fail conversion are logged and skipped.
    pub fn updates_from(&self, frame: &Frame) -> Vec<(String, String)> {
        let mut updates = Vec::new();
        for property in frame.properties() {
            if property.pdc() == 0 {
                log::debug!("Property 0x{:02X} has no data", property.epc());
                continue;
            }
            let mut matched = false;
            for entity in self.entities.iter().filter(|e| e.epc == property.epc()) {
                matched = true;
                match entity.convert(property) {
                    Ok(value) => updates.push((entity.id.to_string(), value)),
                    Err(e) => log::error!("Cannot convert {}: {}", entity.id, e),
                }
            }
            if !matched {
                log::debug!("No entity for property 0x{:02X}", property.epc());
            }
        }
        updates
    }
}
