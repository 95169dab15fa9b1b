//! Scripted fake modem for driving the session over an in-memory stream

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use wisun_transport::ModemTransport;

static SENDTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)^SKSENDTO 1 \S+ 0E1A 1 (?:[0-9] )?(?P<len>[0-9A-F]{4}) ").unwrap()
});

/// Turn text records into CRLF-terminated chunks
pub fn lines(records: &[&str]) -> Vec<Vec<u8>> {
    records
        .iter()
        .map(|record| format!("{}\r\n", record).into_bytes())
        .collect()
}

/// The far end of a modem transport
///
/// Every command is echoed back, then answered with whatever the script
/// returns. `SKSENDTO` payloads are recorded as hex after the text header.
pub struct FakeModem {
    transport: Arc<ModemTransport>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeModem {
    pub fn start<F>(script: F) -> Self
    where
        F: FnMut(&str) -> Vec<Vec<u8>> + Send + 'static,
    {
        let (client, device) = duplex(4096);
        let transport = Arc::new(ModemTransport::spawn(client));
        let commands = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(run(device, script, commands.clone()));
        Self {
            transport,
            commands,
        }
    }

    pub fn transport(&self) -> Arc<ModemTransport> {
        self.transport.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

async fn run<F>(mut device: DuplexStream, mut script: F, commands: Arc<Mutex<Vec<String>>>)
where
    F: FnMut(&str) -> Vec<Vec<u8>>,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match device.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        while let Some((echo, command, used)) = next_command(&buffer) {
            buffer.drain(..used);
            commands.lock().unwrap().push(command.clone());

            let mut replies = vec![format!("{}\r\n", echo).into_bytes()];
            replies.extend(script(&command));
            for reply in replies {
                if device.write_all(&reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Returns the echo text, the recorded command and the bytes consumed
fn next_command(buffer: &[u8]) -> Option<(String, String, usize)> {
    if let Some(caps) = SENDTO.captures(buffer) {
        let header_len = caps.get(0)?.end();
        let len = std::str::from_utf8(&caps["len"]).ok()?;
        let data_len = usize::from_str_radix(len, 16).ok()?;
        if buffer.len() < header_len + data_len {
            return None;
        }
        let header = String::from_utf8_lossy(&buffer[..header_len]).into_owned();
        let payload = hex::encode(&buffer[header_len..header_len + data_len]);
        let echo = header.trim_end().to_string();
        return Some((echo, format!("{}{}", header, payload), header_len + data_len));
    }
    if buffer.starts_with(b"SKSENDTO") {
        return None;
    }
    let pos = buffer.windows(2).position(|w| w == b"\r\n")?;
    let command = String::from_utf8_lossy(&buffer[..pos]).into_owned();
    Some((command.clone(), command, pos + 2))
}
