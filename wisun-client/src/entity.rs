//! Sensor catalog of the low-voltage smart meter
//!
//! Each [`Entity`] maps one ECHONET Lite property to a textual state. The
//! cumulative energy entities close over a [`Calibration`] fetched once
//! during bring-up.

use wisun_core::{WiSunError, WiSunResult};
use wisun_echonet::{BigUint, Property};

pub const EPC_OPERATION_STATUS: u8 = 0x80;
pub const EPC_FAULT_STATUS: u8 = 0x88;
pub const EPC_MANUFACTURER_CODE: u8 = 0x8A;
pub const EPC_COEFFICIENT: u8 = 0xD3;
pub const EPC_NORMAL_ENERGY: u8 = 0xE0;
pub const EPC_ENERGY_UNIT: u8 = 0xE1;
pub const EPC_REVERSE_ENERGY: u8 = 0xE3;
pub const EPC_INSTANTANEOUS_POWER: u8 = 0xE7;
pub const EPC_INSTANTANEOUS_CURRENT: u8 = 0xE8;

/// Current reading meaning "no measurement" (single-phase two-wire meters report it for T)
pub const CURRENT_NOT_MEASURED: u16 = 0x7FFE;

/// Cumulative energy unit codes (0xE1) and their power-of-ten exponent
static ENERGY_UNITS: [(u8, i8); 9] = [
    (0x00, 0),
    (0x01, -1),
    (0x02, -2),
    (0x03, -3),
    (0x04, -4),
    (0x0A, 1),
    (0x0B, 2),
    (0x0C, 3),
    (0x0D, 4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Sensor,
    BinarySensor,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Sensor => "sensor",
            Domain::BinarySensor => "binary_sensor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Running,
    Problem,
    Power,
    Current,
    Energy,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Running => "running",
            DeviceClass::Problem => "problem",
            DeviceClass::Power => "power",
            DeviceClass::Current => "current",
            DeviceClass::Energy => "energy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

impl StateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateClass::Measurement => "measurement",
            StateClass::TotalIncreasing => "total_increasing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeValue {
    Int,
    Float,
}

/// Multiplier and coefficient applied to cumulative energy readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    exponent: i8,
    coefficient: u32,
}

impl Calibration {
    /// Build from the unit code (0xE1) and coefficient (0xD3)
    ///
    /// # Errors
    /// `InvalidProperty` for an unknown unit code
    pub fn from_unit_code(unit_code: u8, coefficient: u32) -> WiSunResult<Self> {
        let exponent = ENERGY_UNITS
            .iter()
            .find(|(code, _)| *code == unit_code)
            .map(|(_, exponent)| *exponent)
            .ok_or_else(|| {
                WiSunError::InvalidProperty(format!("Invalid E1 value: 0x{:02X}", unit_code))
            })?;
        Ok(Self {
            exponent,
            coefficient,
        })
    }

    pub fn exponent(&self) -> i8 {
        self.exponent
    }

    pub fn coefficient(&self) -> u32 {
        self.coefficient
    }

    /// Decimal places implied by the multiplier
    pub fn precision(&self) -> u8 {
        if self.exponent < 0 {
            self.exponent.unsigned_abs()
        } else {
            0
        }
    }

    /// Render `value * coefficient * 10^exponent` exactly
    pub fn format(&self, value: &BigUint) -> String {
        let scaled = value * self.coefficient;
        if self.exponent >= 0 {
            return (scaled * BigUint::from(10u32).pow(self.exponent as u32)).to_string();
        }

        let precision = self.precision() as usize;
        let digits = format!("{:0>width$}", scaled.to_string(), width = precision + 1);
        let (integer, fraction) = digits.split_at(digits.len() - precision);
        format!("{}.{}", integer, fraction)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            exponent: 0,
            coefficient: 1,
        }
    }
}

/// Phase of a two-phase current reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    R,
    T,
}

/// Number of current entities the meter supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentPhases {
    /// Single-phase two-wire: only the R phase is measured
    Single,
    /// Single-phase three-wire: R and T phases
    Dual,
}

impl CurrentPhases {
    /// Decide from the bring-up reading of 0xE8; dual when unknown
    pub fn detect(reading: Option<&Property>) -> Self {
        let t_phase = reading
            .filter(|p| p.pdc() > 0)
            .and_then(|p| u32::try_from(p.edt()).ok())
            .map(|value| value as u16);
        match t_phase {
            Some(CURRENT_NOT_MEASURED) => CurrentPhases::Single,
            _ => CurrentPhases::Dual,
        }
    }
}

/// How a property value becomes a state string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converter {
    /// `ON` if the value equals `on`, else `OFF`
    OnOff { on: u8 },
    /// Signed 32-bit integer
    SignedInt,
    /// One phase of the 0xE8 reading in 0.1 A steps
    Current(Phase),
    /// Cumulative energy scaled by the meter's calibration
    Energy(Calibration),
}

impl Converter {
    pub fn convert(&self, property: &Property) -> WiSunResult<String> {
        let value = || {
            u32::try_from(property.edt()).map_err(|_| {
                WiSunError::InvalidProperty(format!(
                    "EDT of 0x{:02X} exceeds 4 bytes",
                    property.epc()
                ))
            })
        };

        match self {
            Converter::OnOff { on } => {
                let state = if value()? == u32::from(*on) { "ON" } else { "OFF" };
                Ok(state.to_string())
            }
            Converter::SignedInt => Ok((value()? as i32).to_string()),
            Converter::Current(phase) => {
                let raw = value()?;
                let phase_value = match phase {
                    Phase::R => (raw >> 16) as u16,
                    Phase::T => raw as u16,
                };
                Ok(format_current(phase_value))
            }
            Converter::Energy(calibration) => Ok(calibration.format(property.edt())),
        }
    }
}

fn format_current(raw: u16) -> String {
    if raw == CURRENT_NOT_MEASURED {
        return "0".to_string();
    }
    let deciamps = raw as i16;
    let sign = if deciamps < 0 { "-" } else { "" };
    let magnitude = deciamps.unsigned_abs();
    format!("{}{}.{}", sign, magnitude / 10, magnitude % 10)
}

/// A sensor exposed upward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: &'static str,
    pub name: &'static str,
    pub domain: Domain,
    pub device_class: DeviceClass,
    pub state_class: Option<StateClass>,
    pub unit: Option<&'static str>,
    pub native_value: Option<NativeValue>,
    pub unit_precision: Option<u8>,
    pub epc: u8,
    pub converter: Converter,
}

impl Entity {
    pub fn convert(&self, property: &Property) -> WiSunResult<String> {
        self.converter.convert(property)
    }
}

fn binary_sensor(id: &'static str, name: &'static str, device_class: DeviceClass, epc: u8, on: u8) -> Entity {
    Entity {
        id,
        name,
        domain: Domain::BinarySensor,
        device_class,
        state_class: None,
        unit: None,
        native_value: None,
        unit_precision: None,
        epc,
        converter: Converter::OnOff { on },
    }
}

fn current(id: &'static str, name: &'static str, phase: Phase) -> Entity {
    Entity {
        id,
        name,
        domain: Domain::Sensor,
        device_class: DeviceClass::Current,
        state_class: Some(StateClass::Measurement),
        unit: Some("A"),
        native_value: Some(NativeValue::Float),
        unit_precision: Some(1),
        epc: EPC_INSTANTANEOUS_CURRENT,
        converter: Converter::Current(phase),
    }
}

fn energy(id: &'static str, name: &'static str, epc: u8, calibration: Calibration) -> Entity {
    Entity {
        id,
        name,
        domain: Domain::Sensor,
        device_class: DeviceClass::Energy,
        state_class: Some(StateClass::TotalIncreasing),
        unit: Some("kWh"),
        native_value: Some(NativeValue::Float),
        unit_precision: Some(calibration.precision()),
        epc,
        converter: Converter::Energy(calibration),
    }
}

/// Build the catalog for a meter
pub fn catalog(calibration: Calibration, phases: CurrentPhases) -> Vec<Entity> {
    let mut entities = vec![
        binary_sensor(
            "operationStatus",
            "Operation status",
            DeviceClass::Running,
            EPC_OPERATION_STATUS,
            0x30,
        ),
        binary_sensor(
            "faultStatus",
            "Fault status",
            DeviceClass::Problem,
            EPC_FAULT_STATUS,
            0x41,
        ),
        Entity {
            id: "instantaneousElectricPower",
            name: "Instantaneous electric power",
            domain: Domain::Sensor,
            device_class: DeviceClass::Power,
            state_class: Some(StateClass::Measurement),
            unit: Some("W"),
            native_value: Some(NativeValue::Int),
            unit_precision: None,
            epc: EPC_INSTANTANEOUS_POWER,
            converter: Converter::SignedInt,
        },
    ];

    match phases {
        CurrentPhases::Single => {
            entities.push(current("instantaneousCurrent", "Instantaneous current", Phase::R));
        }
        CurrentPhases::Dual => {
            entities.push(current(
                "instantaneousCurrentR",
                "Instantaneous current R phase",
                Phase::R,
            ));
            entities.push(current(
                "instantaneousCurrentT",
                "Instantaneous current T phase",
                Phase::T,
            ));
        }
    }

    entities.push(energy(
        "normalDirectionCumulativeElectricEnergy",
        "Cumulative electric energy (normal direction)",
        EPC_NORMAL_ENERGY,
        calibration,
    ));
    entities.push(energy(
        "reverseDirectionCumulativeElectricEnergy",
        "Cumulative electric energy (reverse direction)",
        EPC_REVERSE_ENERGY,
        calibration,
    ));
    entities
}
