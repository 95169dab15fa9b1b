//! Splits the modem's byte stream into CRLF-delimited records

use bytes::{Buf, Bytes, BytesMut};

/// Record delimiter used by the modem in both directions
pub const CRLF: &[u8; 2] = b"\r\n";

/// Accumulates raw bytes and yields complete records without their delimiter
///
/// The splitter knows nothing about record contents: a binary payload that
/// happens to contain CRLF is split like any other text. Reassembly of such
/// payloads is done one level up by the ERXUDP assembler.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    buffer: BytesMut,
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the device
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete record, if any
    pub fn next_record(&mut self) -> Option<Bytes> {
        let pos = self.buffer.windows(CRLF.len()).position(|w| w == CRLF)?;
        let record = self.buffer.split_to(pos).freeze();
        self.buffer.advance(CRLF.len());
        Some(record)
    }

    /// Bytes received after the last delimiter
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_records() {
        let mut splitter = RecordSplitter::new();
        splitter.push(b"SKSREG S2 21\r\nOK\r\nEVE");

        assert_eq!(splitter.next_record().unwrap(), &b"SKSREG S2 21"[..]);
        assert_eq!(splitter.next_record().unwrap(), &b"OK"[..]);
        assert!(splitter.next_record().is_none());
        assert_eq!(splitter.buffered(), 3);

        splitter.push(b"NT 22 FE80\r");
        assert!(splitter.next_record().is_none());
        splitter.push(b"\n");
        assert_eq!(splitter.next_record().unwrap(), &b"EVENT 22 FE80"[..]);
    }

    #[test]
    fn test_empty_record() {
        let mut splitter = RecordSplitter::new();
        splitter.push(b"\r\n");
        assert_eq!(splitter.next_record().unwrap(), &b""[..]);
        assert_eq!(splitter.buffered(), 0);
    }
}
