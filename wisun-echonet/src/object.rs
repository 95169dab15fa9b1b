//! ECHONET object identifiers and service codes

use std::fmt;

/// ECHONET object (EOJ): class group code, class code and instance code
///
/// On the wire an EOJ occupies 3 bytes, big-endian, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eoj {
    class_group: u8,
    class: u8,
    instance: u8,
}

impl Eoj {
    /// Controller (class group 0x05, class 0xFF)
    pub const CONTROLLER: Eoj = Eoj::new(0x05, 0xFF, 0x01);
    /// Low-voltage smart electric energy meter (class group 0x02, class 0x88)
    pub const SMART_METER: Eoj = Eoj::new(0x02, 0x88, 0x01);

    /// Create an object identifier from its three codes
    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Self {
            class_group,
            class,
            instance,
        }
    }

    /// Build an EOJ from the low 24 bits of `value`
    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// The EOJ as a 24-bit integer
    pub const fn as_u32(&self) -> u32 {
        ((self.class_group as u32) << 16) | ((self.class as u32) << 8) | self.instance as u32
    }

    pub const fn to_bytes(&self) -> [u8; 3] {
        [self.class_group, self.class, self.instance]
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

impl fmt::Display for Eoj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.as_u32())
    }
}

/// ECHONET Lite service code (ESV)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Esv(pub u8);

impl Esv {
    /// Property value read request
    pub const GET: Esv = Esv(0x62);
    /// Property value read response
    pub const GET_RES: Esv = Esv(0x72);
    /// Property value read request not possible
    pub const GET_SNA: Esv = Esv(0x52);
    /// Property value notification
    pub const INF: Esv = Esv(0x73);
    /// Property value notification requiring a response
    pub const INFC: Esv = Esv(0x74);

    /// Service codes 0x50..=0x5F are the "not possible" error responses
    pub fn is_error(&self) -> bool {
        (0x50..=0x5F).contains(&self.0)
    }

    /// Unsolicited property notifications (INF, INFC)
    pub fn is_notification(&self) -> bool {
        *self == Self::INF || *self == Self::INFC
    }
}

impl fmt::Display for Esv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eoj_u32_conversion() {
        let eoj = Eoj::from_u32(0x028801);
        assert_eq!(eoj, Eoj::SMART_METER);
        assert_eq!(eoj.as_u32(), 0x028801);
        assert_eq!(eoj.to_bytes(), [0x02, 0x88, 0x01]);
        assert_eq!(eoj.to_string(), "0x028801");
    }

    #[test]
    fn test_esv_error_range() {
        assert!(Esv::GET_SNA.is_error());
        assert!(Esv(0x5E).is_error());
        assert!(!Esv::GET_RES.is_error());
        assert!(!Esv::INF.is_error());
    }

    #[test]
    fn test_esv_notification() {
        assert!(Esv::INF.is_notification());
        assert!(Esv::INFC.is_notification());
        assert!(!Esv::GET_RES.is_notification());
        assert!(!Esv::GET_SNA.is_notification());
    }
}
