//! ECHONET Lite frame (EHD 0x1081, format 1) encoding and decoding
//!
//! # Wire layout
//! ```text
//! 0x10 0x81 | TID(2) | SEOJ(3) | DEOJ(3) | ESV(1) | OPC(1) | (EPC(1) PDC(1) EDT(PDC))*
//! ```
//! All multi-byte fields are big-endian.

use crate::object::{Eoj, Esv};
use num_bigint::BigUint;
use std::fmt;
use wisun_core::{WiSunError, WiSunResult};

/// Fixed protocol marker (EHD1 = ECHONET Lite, EHD2 = specified message format)
pub const EHD: [u8; 2] = [0x10, 0x81];
/// Length of the fixed part: EHD, TID, SEOJ, DEOJ, ESV, OPC
pub const HEADER_LENGTH: usize = 12;
/// Widest property that [`Frame::numeric_value`] can expose
pub const MAX_NUMERIC_PDC: u8 = 6;

/// One property of a frame: code, declared length and unsigned value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    epc: u8,
    pdc: u8,
    edt: BigUint,
}

impl Property {
    /// Create a property whose length is the minimal byte count of `value` (at least 1)
    pub fn new(epc: u8, value: u64) -> Self {
        let significant = (u64::BITS - value.leading_zeros()).div_ceil(8);
        Self {
            epc,
            pdc: significant.max(1) as u8,
            edt: BigUint::from(value),
        }
    }

    /// Create a property with an explicit length
    ///
    /// Fails when `edt` does not fit in `pdc` bytes.
    pub fn with_pdc(epc: u8, pdc: u8, edt: BigUint) -> WiSunResult<Self> {
        if edt.bits() > u64::from(pdc) * 8 {
            return Err(WiSunError::InvalidProperty(format!(
                "EDT 0x{:x} of 0x{:02X} does not fit in {} bytes",
                edt, epc, pdc
            )));
        }
        Ok(Self { epc, pdc, edt })
    }

    /// Zero-length placeholder used in read requests
    pub fn request(epc: u8) -> Self {
        Self {
            epc,
            pdc: 0,
            edt: BigUint::default(),
        }
    }

    pub fn epc(&self) -> u8 {
        self.epc
    }

    pub fn pdc(&self) -> u8 {
        self.pdc
    }

    pub fn edt(&self) -> &BigUint {
        &self.edt
    }

    /// EDT as exactly `pdc` big-endian bytes
    pub fn edt_bytes(&self) -> Vec<u8> {
        let pdc = self.pdc as usize;
        let raw = if self.edt.bits() == 0 {
            Vec::new()
        } else {
            self.edt.to_bytes_be()
        };
        let mut bytes = vec![0u8; pdc.saturating_sub(raw.len())];
        bytes.extend_from_slice(&raw);
        bytes
    }
}

/// An immutable ECHONET Lite frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tid: u16,
    seoj: Eoj,
    deoj: Eoj,
    esv: Esv,
    properties: Vec<Property>,
}

impl Frame {
    /// Create a frame with a transaction id drawn uniformly from the 16-bit space
    pub fn new(seoj: Eoj, deoj: Eoj, esv: Esv, properties: Vec<Property>) -> Self {
        Self::with_tid(rand::random::<u16>(), seoj, deoj, esv, properties)
    }

    /// Create a frame with a caller-chosen transaction id
    pub fn with_tid(tid: u16, seoj: Eoj, deoj: Eoj, esv: Esv, properties: Vec<Property>) -> Self {
        Self {
            tid,
            seoj,
            deoj,
            esv,
            properties,
        }
    }

    /// Read request from the controller to the smart meter for `epcs`
    pub fn get_request(epcs: &[u8]) -> Self {
        Self::new(
            Eoj::CONTROLLER,
            Eoj::SMART_METER,
            Esv::GET,
            epcs.iter().copied().map(Property::request).collect(),
        )
    }

    pub fn tid(&self) -> u16 {
        self.tid
    }

    pub fn seoj(&self) -> Eoj {
        self.seoj
    }

    pub fn deoj(&self) -> Eoj {
        self.deoj
    }

    pub fn esv(&self) -> Esv {
        self.esv
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// First property with the given code
    pub fn property(&self, epc: u8) -> Option<&Property> {
        self.properties.iter().find(|p| p.epc == epc)
    }

    /// Encode the frame to its wire representation
    ///
    /// # Errors
    /// `TooManyProperties` if the property count does not fit the 1-byte OPC
    pub fn encode(&self) -> WiSunResult<Vec<u8>> {
        let opc = u8::try_from(self.properties.len())
            .map_err(|_| WiSunError::TooManyProperties(self.properties.len()))?;
        let body: usize = self
            .properties
            .iter()
            .map(|p| 2 + p.pdc as usize)
            .sum();
        let mut out = Vec::with_capacity(HEADER_LENGTH + body);

        out.extend_from_slice(&EHD);
        out.extend_from_slice(&self.tid.to_be_bytes());
        out.extend_from_slice(&self.seoj.to_bytes());
        out.extend_from_slice(&self.deoj.to_bytes());
        out.push(self.esv.0);
        out.push(opc);

        for property in &self.properties {
            out.push(property.epc);
            out.push(property.pdc);
            out.extend_from_slice(&property.edt_bytes());
        }
        Ok(out)
    }

    /// Decode a frame from its wire representation
    ///
    /// A frame with zero properties is accepted; some device responses
    /// legitimately carry none.
    ///
    /// # Errors
    /// - `FrameTooShort` if fewer than 12 bytes are given
    /// - `UnsupportedHeader` if the marker is not `0x1081`
    /// - `PropertyHeaderMissing` if an EPC/PDC pair is truncated
    /// - `PropertyDataIncomplete` if fewer than PDC bytes remain
    pub fn decode(bytes: &[u8]) -> WiSunResult<Self> {
        if bytes.len() < HEADER_LENGTH {
            return Err(WiSunError::FrameTooShort(bytes.len()));
        }
        if bytes[0..2] != EHD {
            return Err(WiSunError::UnsupportedHeader(u16::from_be_bytes([
                bytes[0], bytes[1],
            ])));
        }

        let tid = u16::from_be_bytes([bytes[2], bytes[3]]);
        let seoj = Eoj::from_bytes([bytes[4], bytes[5], bytes[6]]);
        let deoj = Eoj::from_bytes([bytes[7], bytes[8], bytes[9]]);
        let esv = Esv(bytes[10]);
        let opc = bytes[11] as usize;

        let mut properties = Vec::with_capacity(opc);
        let mut pos = HEADER_LENGTH;
        for index in 0..opc {
            if bytes.len() < pos + 2 {
                return Err(WiSunError::PropertyHeaderMissing { index });
            }
            let epc = bytes[pos];
            let pdc = bytes[pos + 1];
            pos += 2;

            let remaining = bytes.len() - pos;
            if remaining < pdc as usize {
                return Err(WiSunError::PropertyDataIncomplete {
                    epc,
                    expected: pdc as usize,
                    remaining,
                });
            }
            let edt = BigUint::from_bytes_be(&bytes[pos..pos + pdc as usize]);
            pos += pdc as usize;

            properties.push(Property { epc, pdc, edt });
        }

        Ok(Self {
            tid,
            seoj,
            deoj,
            esv,
            properties,
        })
    }

    /// Whether `response` answers this request
    ///
    /// Addressing must be reversed and the transaction id shared. The
    /// service code plays no part in correlation.
    pub fn is_correlated_response(&self, response: &Frame) -> bool {
        response.seoj == self.deoj && response.deoj == self.seoj && response.tid == self.tid
    }

    /// Value of a property as a native integer
    ///
    /// # Errors
    /// `PropertyNotFound` if absent, `ValueTooWide` if wider than 6 bytes.
    pub fn numeric_value(&self, epc: u8) -> WiSunResult<u64> {
        let property = self.property(epc).ok_or(WiSunError::PropertyNotFound(epc))?;
        if property.pdc > MAX_NUMERIC_PDC {
            return Err(WiSunError::ValueTooWide {
                epc,
                pdc: property.pdc,
            });
        }
        Ok(property
            .edt_bytes()
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Value of a property as an arbitrary-precision integer
    pub fn big_value(&self, epc: u8) -> WiSunResult<BigUint> {
        self.property(epc)
            .map(|p| p.edt.clone())
            .ok_or(WiSunError::PropertyNotFound(epc))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties = self
            .properties
            .iter()
            .map(|p| format!("epc=0x{:02x}, pdc={}, edt=0x{:x}", p.epc, p.pdc, p.edt))
            .collect::<Vec<_>>()
            .join(" | ");
        write!(
            f,
            "tid=0x{:04x} | seoj={} | deoj={} | esv={} | properties=[{}] | all=0x{}",
            self.tid,
            self.seoj,
            self.deoj,
            self.esv,
            properties,
            self.encode().map(hex::encode).unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Frame {
        Frame::with_tid(
            0x0099,
            Eoj::CONTROLLER,
            Eoj::SMART_METER,
            Esv::GET,
            vec![Property::request(0x80), Property::request(0xE7)],
        )
    }

    #[test]
    fn test_decode_meter_response_and_reencode() {
        let response = "10810fa502880105ff017207800130880142e7040000016ee804001e000ae0040004f3c1e3040000000bff00";
        let bytes = hex::decode(response).unwrap();

        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.tid(), 0x0fa5);
        assert_eq!(frame.seoj(), Eoj::SMART_METER);
        assert_eq!(frame.deoj(), Eoj::CONTROLLER);
        assert_eq!(frame.esv(), Esv::GET_RES);
        assert_eq!(frame.properties().len(), 7);
        assert_eq!(frame.numeric_value(0xE7).unwrap(), 0x016e);
        assert_eq!(frame.property(0xFF).unwrap().pdc(), 0);

        assert_eq!(frame.encode().unwrap(), bytes);
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let frame = Frame::with_tid(
            0xBEEF,
            Eoj::SMART_METER,
            Eoj::CONTROLLER,
            Esv::INF,
            vec![
                Property::new(0x80, 0x30),
                Property::with_pdc(0xE0, 4, BigUint::from(0x0004_f3c1u32)).unwrap(),
                Property::request(0x89),
            ],
        );

        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.properties()[1].pdc(), 4);
        assert_eq!(decoded.properties()[1].edt_bytes(), vec![0x00, 0x04, 0xf3, 0xc1]);
    }

    #[test]
    fn test_decode_header_fields() {
        let frame = Frame::decode(&hex::decode("1081000102880105FF016201E00100").unwrap()).unwrap();
        assert_eq!(frame.tid(), 0x0001);
        assert_eq!(frame.seoj().as_u32(), 0x028801);
        assert_eq!(frame.deoj().as_u32(), 0x05ff01);
        assert_eq!(frame.esv(), Esv::GET);
        assert_eq!(frame.properties().len(), 1);
    }

    #[test]
    fn test_decode_zero_properties() {
        let frame = Frame::decode(&hex::decode("1081000102880105FF017200").unwrap()).unwrap();
        assert!(frame.properties().is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Frame::decode(&hex::decode("1081FFFF").unwrap()),
            Err(WiSunError::FrameTooShort(4))
        ));
        assert!(matches!(
            Frame::decode(&hex::decode("FFFF000102880105FF017200").unwrap()),
            Err(WiSunError::UnsupportedHeader(0xFFFF))
        ));
        assert!(matches!(
            Frame::decode(&hex::decode("1081000102880105FF016201E0").unwrap()),
            Err(WiSunError::PropertyHeaderMissing { index: 0 })
        ));
        assert!(matches!(
            Frame::decode(&hex::decode("1081000102880105FF016201E00200").unwrap()),
            Err(WiSunError::PropertyDataIncomplete {
                epc: 0xE0,
                expected: 2,
                remaining: 1
            })
        ));
    }

    #[test]
    fn test_decode_variable_widths() {
        let frame = Frame::decode(&hex::decode("10810fa502880105ff017203800130880200428900").unwrap()).unwrap();
        let props = frame.properties();
        assert_eq!((props[0].epc(), props[0].pdc()), (0x80, 1));
        assert_eq!(props[0].edt(), &BigUint::from(0x30u8));
        assert_eq!((props[1].epc(), props[1].pdc()), (0x88, 2));
        assert_eq!(props[1].edt(), &BigUint::from(0x42u8));
        assert_eq!((props[2].epc(), props[2].pdc()), (0x89, 0));
    }

    #[test]
    fn test_property_minimal_length() {
        assert_eq!(Property::new(0x88, 0x0000_5678).pdc(), 2);
        assert_eq!(Property::new(0x88, 0).pdc(), 1);
        assert_eq!(Property::new(0x88, u64::MAX).pdc(), 8);
        assert_eq!(Property::request(0x88).pdc(), 0);
    }

    #[test]
    fn test_property_value_must_fit() {
        assert!(Property::with_pdc(0x10, 1, BigUint::from(0x1234u16)).is_err());
        assert!(Property::with_pdc(0x10, 2, BigUint::from(0x1234u16)).is_ok());
        assert!(Property::with_pdc(0x10, 0, BigUint::default()).is_ok());
    }

    #[test]
    fn test_numeric_accessor_limits() {
        let six = Property::with_pdc(0x10, 6, BigUint::from(0xFFFF_FFFF_FFFFu64)).unwrap();
        let seven = Property::with_pdc(0x11, 7, BigUint::from(0xFF_FFFF_FFFF_FFFFu64)).unwrap();
        let frame = Frame::with_tid(
            1,
            Eoj::CONTROLLER,
            Eoj::SMART_METER,
            Esv::GET,
            vec![six, seven],
        );

        assert_eq!(frame.numeric_value(0x10).unwrap(), 0xFFFF_FFFF_FFFF);
        assert!(matches!(
            frame.numeric_value(0x11),
            Err(WiSunError::ValueTooWide { epc: 0x11, pdc: 7 })
        ));
        assert_eq!(
            frame.big_value(0x11).unwrap(),
            BigUint::from(0xFF_FFFF_FFFF_FFFFu64)
        );
        assert!(matches!(
            frame.numeric_value(0xFF),
            Err(WiSunError::PropertyNotFound(0xFF))
        ));
        assert!(frame.big_value(0xFF).is_err());
    }

    #[test]
    fn test_correlated_response() {
        let request = sample_request();
        let response = Frame::with_tid(0x0099, Eoj::SMART_METER, Eoj::CONTROLLER, Esv::GET_RES, vec![]);
        assert!(request.is_correlated_response(&response));

        let error_response =
            Frame::with_tid(0x0099, Eoj::SMART_METER, Eoj::CONTROLLER, Esv::GET_SNA, vec![]);
        assert!(request.is_correlated_response(&error_response));
    }

    #[test]
    fn test_uncorrelated_when_any_field_differs() {
        let request = sample_request();
        let other_tid = Frame::with_tid(0x00FF, Eoj::SMART_METER, Eoj::CONTROLLER, Esv::GET_RES, vec![]);
        let other_seoj =
            Frame::with_tid(0x0099, Eoj::new(0x02, 0x88, 0x02), Eoj::CONTROLLER, Esv::GET_RES, vec![]);
        let other_deoj =
            Frame::with_tid(0x0099, Eoj::SMART_METER, Eoj::new(0x05, 0xFF, 0x02), Esv::GET_RES, vec![]);

        assert!(!request.is_correlated_response(&other_tid));
        assert!(!request.is_correlated_response(&other_seoj));
        assert!(!request.is_correlated_response(&other_deoj));
    }

    #[test]
    fn test_get_request_uses_placeholders() {
        let request = Frame::get_request(&[0x80, 0x88, 0xE7, 0xE8, 0xE0, 0xE3]);
        assert_eq!(request.seoj(), Eoj::CONTROLLER);
        assert_eq!(request.deoj(), Eoj::SMART_METER);
        assert_eq!(request.esv(), Esv::GET);
        assert_eq!(request.encode().unwrap().len(), HEADER_LENGTH + 6 * 2);
        assert!(request.properties().iter().all(|p| p.pdc() == 0));
    }

    #[test]
    fn test_display() {
        let frame = Frame::decode(&hex::decode("10810fa502880105ff017202800130880142").unwrap()).unwrap();
        assert_eq!(
            frame.to_string(),
            "tid=0x0fa5 | seoj=0x028801 | deoj=0x05ff01 | esv=0x72 | properties=[epc=0x80, pdc=1, edt=0x30 | epc=0x88, pdc=1, edt=0x42] | all=0x10810fa502880105ff017202800130880142"
        );
    }

    #[test]
    fn test_encode_rejects_property_count_over_opc_range() {
        let properties = (0..=255u16).map(|i| Property::request(i as u8)).collect();
        let frame = Frame::with_tid(1, Eoj::CONTROLLER, Eoj::SMART_METER, Esv::GET, properties);
        assert!(matches!(
            frame.encode(),
            Err(WiSunError::TooManyProperties(256))
        ));

        let properties = (0..255u16).map(|i| Property::request(i as u8)).collect();
        let frame = Frame::with_tid(1, Eoj::CONTROLLER, Eoj::SMART_METER, Esv::GET, properties);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[11], 0xFF);
    }
}
