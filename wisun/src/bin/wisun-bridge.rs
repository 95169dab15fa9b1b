//! Polls a Route-B smart meter and publishes its sensor states

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use wisun::client::config::{DEFAULT_CACHE_PATH, DEFAULT_SCAN_RETRIES};
use wisun::client::{ClientConfig, LogPublisher, MeterClient, StatePublisher, publish_all};
use wisun::echonet::Frame;
use wisun::session::{ConnectorFactory, ModemModel, SerialConnectorFactory};

#[derive(Debug, Parser)]
#[command(name = "wisun-bridge", version, about = "Wi-SUN Route-B smart meter bridge")]
struct Args {
    /// Wi-SUN modem model (BP35A1, BP35C0, BP35C2, WSR35A1-00, RS-WSUHA-P)
    #[arg(long, env = "WISUN_CONNECTOR_MODEL")]
    model: ModemModel,

    /// Serial device of the modem
    #[arg(long, env = "WISUN_CONNECTOR_DEVICE_PATH", default_value = "/dev/ttyUSB0")]
    device_path: String,

    /// Scan attempts before giving up
    #[arg(long, env = "WISUN_SCAN_RETRIES", default_value_t = DEFAULT_SCAN_RETRIES)]
    scan_retries: u32,

    /// File caching the joined PAN
    #[arg(long, env = "PAN_INFO_PATH", default_value = DEFAULT_CACHE_PATH)]
    pan_info_path: PathBuf,

    /// Route-B authentication id
    #[arg(long, env = "ROUTE_B_ID", hide_env_values = true)]
    route_b_id: String,

    /// Route-B password
    #[arg(long, env = "ROUTE_B_PASSWORD", hide_env_values = true)]
    route_b_password: String,

    /// Wait for a GET response, in milliseconds
    #[arg(long, env = "ECHONET_GET_TIMEOUT", default_value_t = 8000)]
    get_timeout: u64,

    /// GET retries after the first attempt
    #[arg(long, env = "ECHONET_GET_RETRIES", default_value_t = 2)]
    get_retries: u32,

    /// Polling interval, in milliseconds
    #[arg(long, env = "AUTO_REQUEST_INTERVAL", default_value_t = 300_000)]
    request_interval: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.route_b_id, &self.route_b_password)
            .with_scan_retries(self.scan_retries)
            .with_get_timeout(Duration::from_millis(self.get_timeout))
            .with_get_retries(self.get_retries)
            .with_cache_path(&self.pan_info_path)
            .with_poll_interval(Duration::from_millis(self.request_interval))
    }
}

async fn poll<F: ConnectorFactory>(client: &mut MeterClient<F>, publisher: &dyn StatePublisher) {
    match client.request().await {
        Ok(updates) => {
            let published = publish_all(publisher, &updates).await;
            log::debug!("Published {}/{} updates", published, updates.len());
        }
        // the next poll runs bring-up again if the session was discarded
        Err(e) => log::error!("Smart meter request failed: {}", e),
    }
}

async fn publish_notification<F: ConnectorFactory>(
    client: &MeterClient<F>,
    publisher: &dyn StatePublisher,
    frame: &Frame,
) {
    let updates = client.notification_updates(frame);
    if !updates.is_empty() {
        let published = publish_all(publisher, &updates).await;
        log::debug!("Published {}/{} pushed updates", published, updates.len());
    }
}

/// Next frame of the current session
///
/// Pends forever while no session is held. A closed stream clears `frames`
/// so that the caller re-subscribes after the next bring-up.
async fn next_frame(frames: &mut Option<broadcast::Receiver<Frame>>) -> Option<Frame> {
    loop {
        let Some(receiver) = frames.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Frame stream lagged, {} frames skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                *frames = None;
                return None;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    log::info!("start");
    let config = args.client_config();
    config.validate().context("invalid configuration")?;

    let factory = SerialConnectorFactory::new(args.model, args.device_path.clone());
    let mut client = MeterClient::new(factory, config);
    let device_id = client
        .initialize()
        .await
        .context("smart meter bring-up failed")?
        .device_id
        .clone();
    let publisher = LogPublisher::new(device_id);
    log::info!("ready");

    let mut ticker = tokio::time::interval(client.config().poll_interval);
    let mut frames = client.subscribe_frames();
    let mut generation = client.generation();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll(&mut client, &publisher).await;
                if client.generation() != generation || frames.is_none() {
                    generation = client.generation();
                    frames = client.subscribe_frames();
                }
            }
            Some(frame) = next_frame(&mut frames) => {
                publish_notification(&client, &publisher, &frame).await;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::error!("Cannot listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    log::info!("shutdown");
    client.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "wisun-bridge",
        "--model",
        "BP35C2",
        "--route-b-id",
        "0123456789ABCDEF",
        "--route-b-password",
        "PASSWORD",
    ];

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(REQUIRED).unwrap();
        assert_eq!(args.model, ModemModel::Bp35c2);
        assert_eq!(args.device_path, "/dev/ttyUSB0");

        let config = args.client_config();
        assert_eq!(config.scan_retries, 5);
        assert_eq!(config.get_timeout, Duration::from_secs(8));
        assert_eq!(config.get_retries, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.cache_path, PathBuf::from(".paninfo.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut argv = REQUIRED.to_vec();
        argv.extend([
            "--get-timeout",
            "4000",
            "--get-retries",
            "0",
            "--request-interval",
            "60000",
            "--pan-info-path",
            "/var/lib/wisun/pan.json",
        ]);
        let config = Args::try_parse_from(argv).unwrap().client_config();
        assert_eq!(config.get_timeout, Duration::from_secs(4));
        assert_eq!(config.get_attempts(), 1);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.cache_path, PathBuf::from("/var/lib/wisun/pan.json"));
    }

    #[tokio::test]
    async fn test_next_frame_clears_closed_stream() {
        let (sender, receiver) = broadcast::channel(4);
        let mut frames = Some(receiver);
        let frame = Frame::get_request(&[0xE7]);
        sender.send(frame.clone()).unwrap();
        drop(sender);

        assert_eq!(next_frame(&mut frames).await, Some(frame));
        assert_eq!(next_frame(&mut frames).await, None);
        assert!(frames.is_none());

        let pending =
            tokio::time::timeout(Duration::from_millis(20), next_frame(&mut frames)).await;
        assert!(pending.is_err());
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let mut argv = REQUIRED.to_vec();
        argv[2] = "BP99";
        assert!(Args::try_parse_from(argv).is_err());
    }
}
