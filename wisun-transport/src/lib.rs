//! Serial transport to the Wi-SUN modem
//!
//! Splits the device byte stream into CRLF records, reassembles ERXUDP
//! datagrams whose binary payload contains the delimiter, and publishes the
//! result as text records and decoded ECHONET Lite frames.

pub mod erxudp;
pub mod modem;
pub mod serial;
pub mod splitter;

pub use erxudp::{Assembled, ECHONET_PORT, ErxudpAssembler, ErxudpDatagram, ErxudpHeader};
pub use modem::{ModemTransport, RecordDispatcher, STREAM_CAPACITY};
pub use serial::{DEFAULT_BAUD_RATE, SerialSettings};
pub use splitter::{CRLF, RecordSplitter};
