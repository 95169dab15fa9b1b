//! Modem transport: reader task and record/frame streams

use crate::erxudp::{Assembled, ECHONET_PORT, ErxudpAssembler};
use crate::serial::SerialSettings;
use crate::splitter::RecordSplitter;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, broadcast};
use tokio::task::AbortHandle;
use wisun_core::{WiSunError, WiSunResult};
use wisun_echonet::Frame;

/// Capacity of each broadcast stream
pub const STREAM_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Turns raw device bytes into text records and decoded frames
///
/// Empty records are dropped. ERXUDP records that do not match the header
/// grammar are logged and forwarded as text, complete datagrams are only
/// published on the frame stream.
pub struct RecordDispatcher {
    splitter: RecordSplitter,
    assembler: ErxudpAssembler,
    records: broadcast::Sender<String>,
    frames: broadcast::Sender<Frame>,
}

impl RecordDispatcher {
    pub fn new(records: broadcast::Sender<String>, frames: broadcast::Sender<Frame>) -> Self {
        Self {
            splitter: RecordSplitter::new(),
            assembler: ErxudpAssembler::new(),
            records,
            frames,
        }
    }

    /// Process a chunk of bytes read from the device
    pub fn push(&mut self, data: &[u8]) {
        self.splitter.push(data);
        while let Some(record) = self.splitter.next_record() {
            self.dispatch(record);
        }
    }

    fn dispatch(&mut self, record: Bytes) {
        match self.assembler.feed(record) {
            Assembled::Text(record) => self.publish_text(&record),
            Assembled::Malformed(record) => {
                log::warn!(
                    "Malformed ERXUDP record: {}",
                    String::from_utf8_lossy(&record)
                );
                self.publish_text(&record);
            }
            Assembled::Pending => {
                log::trace!("ERXUDP payload contains CRLF, waiting for the rest");
            }
            Assembled::Datagram(datagram) => {
                if datagram.header.rport != ECHONET_PORT {
                    log::debug!(
                        "Ignoring datagram from {} port {:04X}",
                        datagram.header.sender,
                        datagram.header.rport
                    );
                    return;
                }
                match Frame::decode(&datagram.payload) {
                    Ok(frame) => {
                        log::debug!("Received frame: {}", frame);
                        // no subscriber is not an error
                        let _ = self.frames.send(frame);
                    }
                    Err(e) => log::warn!(
                        "Dropping undecodable payload 0x{}: {}",
                        hex::encode(&datagram.payload),
                        e
                    ),
                }
            }
        }
    }

    fn publish_text(&self, record: &[u8]) {
        if record.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(record).into_owned();
        log::debug!("<< {}", line);
        let _ = self.records.send(line);
    }
}

/// Byte-stream connection to the Wi-SUN modem
///
/// A background task reads the device and publishes three streams: text
/// records, decoded ECHONET Lite frames and read errors. Any number of
/// subscribers may listen; a subscriber only sees items published after it
/// subscribed.
pub struct ModemTransport {
    writer: Mutex<Option<BoxedWriter>>,
    records: broadcast::Sender<String>,
    frames: broadcast::Sender<Frame>,
    errors: broadcast::Sender<Arc<io::Error>>,
    reader: AbortHandle,
}

impl ModemTransport {
    /// Start a transport over an already opened byte stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (records, _) = broadcast::channel(STREAM_CAPACITY);
        let (frames, _) = broadcast::channel(STREAM_CAPACITY);
        let (errors, _) = broadcast::channel(STREAM_CAPACITY);

        let dispatcher = RecordDispatcher::new(records.clone(), frames.clone());
        let task = tokio::spawn(read_loop(reader, dispatcher, errors.clone()));

        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            records,
            frames,
            errors,
            reader: task.abort_handle(),
        }
    }

    /// Open the serial device and start the transport
    pub fn open(settings: &SerialSettings) -> WiSunResult<Self> {
        let stream = settings.open()?;
        Ok(Self::spawn(stream))
    }

    /// Write raw bytes to the device
    pub async fn write(&self, data: &[u8]) -> WiSunResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(WiSunError::TransportClosed)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn subscribe_records(&self) -> broadcast::Receiver<String> {
        self.records.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.frames.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<io::Error>> {
        self.errors.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }

    /// Stop the reader and release the device
    pub async fn close(&self) {
        self.reader.abort();
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                log::debug!("Error shutting down modem stream: {}", e);
            }
        }
    }
}

impl Drop for ModemTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut dispatcher: RecordDispatcher,
    errors: broadcast::Sender<Arc<io::Error>>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("Modem stream closed");
                let _ = errors.send(Arc::new(io::Error::from(io::ErrorKind::UnexpectedEof)));
                break;
            }
            Ok(n) => dispatcher.push(&buf[..n]),
            Err(e) => {
                log::error!("Error reading from modem: {}", e);
                let _ = errors.send(Arc::new(e));
                break;
            }
        }
    }
}
