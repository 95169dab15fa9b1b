//! ERXUDP record grammar and binary payload reassembly
//!
//! The modem reports every received UDP datagram as
//!
//! ```text
//! ERXUDP <sender> <dest> <rport> <lport> <senderlla> <secured> [<side>] <datalen> <raw bytes>
//! ```
//!
//! followed by CRLF. The raw bytes are binary and may themselves contain
//! CRLF, in which case the record splitter hands over a chunk shorter than
//! header + `datalen`. The assembler puts the swallowed delimiter back and
//! keeps appending the following chunks until the declared length is reached.

use crate::splitter::CRLF;
use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Record keyword announcing a received datagram
pub const KEYWORD: &[u8] = b"ERXUDP";

/// UDP port of ECHONET Lite (0x0E1A)
pub const ECHONET_PORT: u16 = 3610;

static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?-u)^ERXUDP (?P<sender>.{39}) (?P<dest>.{39}) (?P<rport>[0-9A-F]{4}) (?P<lport>[0-9A-F]{4}) (?P<lla>[0-9A-F]{16}) (?P<secured>.) (?:(?P<side>.) )?(?P<datalen>[0-9A-F]{4}) ",
    )
    .expect("ERXUDP header pattern is valid")
});

/// Parsed ERXUDP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErxudpHeader {
    pub sender: String,
    pub dest: String,
    pub rport: u16,
    pub lport: u16,
    pub sender_lla: String,
    pub secured: u8,
    pub side: Option<u8>,
    pub data_len: usize,
    /// Length of the textual header including the space before the payload
    pub header_len: usize,
}

impl ErxudpHeader {
    /// Parse the header at the start of `record`
    ///
    /// Returns `None` if the record does not follow the grammar.
    pub fn parse(record: &[u8]) -> Option<Self> {
        let caps = HEADER_PATTERN.captures(record)?;
        let text = |name: &str| {
            caps.name(name)
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        };
        let hex = |name: &str| text(name).and_then(|v| u16::from_str_radix(&v, 16).ok());

        Some(Self {
            sender: text("sender")?,
            dest: text("dest")?,
            rport: hex("rport")?,
            lport: hex("lport")?,
            sender_lla: text("lla")?,
            secured: caps.name("secured")?.as_bytes()[0],
            side: caps.name("side").map(|m| m.as_bytes()[0]),
            data_len: hex("datalen")? as usize,
            header_len: caps.get(0)?.end(),
        })
    }

    /// Length of header plus payload
    pub fn total_len(&self) -> usize {
        self.header_len + self.data_len
    }
}

/// A fully received datagram
#[derive(Debug, Clone)]
pub struct ErxudpDatagram {
    pub header: ErxudpHeader,
    pub payload: Bytes,
}

/// Outcome of feeding one record to the assembler
#[derive(Debug)]
pub enum Assembled {
    /// Not an ERXUDP record; to be forwarded verbatim
    Text(Bytes),
    /// ERXUDP record that does not match the header grammar
    Malformed(Bytes),
    /// Part of a datagram whose payload contained the delimiter
    Pending,
    /// A complete datagram
    Datagram(ErxudpDatagram),
}

struct PendingDatagram {
    header: ErxudpHeader,
    buffer: BytesMut,
}

/// Reassembles ERXUDP records split by the record splitter
///
/// At most one datagram is held at a time. The pending state is cleared as
/// soon as the declared length is reached, whatever the outcome of decoding.
#[derive(Default)]
pub struct ErxudpAssembler {
    pending: Option<PendingDatagram>,
}

impl ErxudpAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partial datagram is being held
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed the next record produced by the splitter
    pub fn feed(&mut self, record: Bytes) -> Assembled {
        if let Some(mut pending) = self.pending.take() {
            pending.buffer.extend_from_slice(&record);
            return self.complete_or_hold(pending);
        }

        if !is_erxudp(&record) {
            return Assembled::Text(record);
        }
        let Some(header) = ErxudpHeader::parse(&record) else {
            return Assembled::Malformed(record);
        };
        self.complete_or_hold(PendingDatagram {
            header,
            buffer: BytesMut::from(&record[..]),
        })
    }

    fn complete_or_hold(&mut self, mut pending: PendingDatagram) -> Assembled {
        if pending.buffer.len() < pending.header.total_len() {
            // the splitter consumed a delimiter that belonged to the payload
            pending.buffer.extend_from_slice(CRLF);
        }
        if pending.buffer.len() < pending.header.total_len() {
            self.pending = Some(pending);
            return Assembled::Pending;
        }

        let start = pending.header.header_len;
        let end = pending.header.total_len();
        let payload = Bytes::copy_from_slice(&pending.buffer[start..end]);
        Assembled::Datagram(ErxudpDatagram {
            header: pending.header,
            payload,
        })
    }
}

fn is_erxudp(record: &[u8]) -> bool {
    record.starts_with(KEYWORD)
        && (record.len() == KEYWORD.len() || record[KEYWORD.len()] == b' ')
}
