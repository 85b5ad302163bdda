use std::error::Error;

use clap::{Arg, Command};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use blobsink_core::config::SinkConfig;
use blobsink_core::driver::SinkDriver;
use blobsink_core::source::generator::{Generator, GeneratorConfig};
use blobsink_core::source::{AckerHandle, streaming_read};
use blobsink_core::storage::ObjectStoreBlob;

mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("blobsink")
        .about("Writes a partitioned log out as objects in a cloud blob store")
        .arg(
            Arg::new("config")
                .long("config")
                .required(true)
                .help("Path to the sink configuration JSON file"),
        )
        .get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .expect("--config is required");

    let raw = std::fs::read_to_string(config_path)?;
    let config: SinkConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    info!(
        provider = config.provider,
        bucket = config.bucket,
        format = config.format_type,
        partitioner = config.partitioner_type,
        "loaded sink configuration"
    );

    let store = ObjectStoreBlob::from_config(&config)?;
    let cancel = CancellationToken::new();

    // Generator-backed run: a real deployment embeds SinkDriver behind its
    // own log client instead.
    let (reader, acker) = Generator::new(GeneratorConfig::default());
    let (records, reader_handle) =
        streaming_read(reader, config.batch_size * 2, cancel.clone());
    let driver = SinkDriver::new(&config, store, AckerHandle::new(acker))?;
    let mut driver_handle = tokio::spawn(driver.run(records, cancel.clone()));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining");
            cancel.cancel();
        }
        result = &mut driver_handle => {
            reader_handle.await??;
            return Ok(result??);
        }
    }

    driver_handle.await??;
    reader_handle.await??;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("installing ctrl-c handler");
    };
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
