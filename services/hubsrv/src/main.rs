//! hubsrv entry point

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hubsrv::{logging, shutdown, AppConfig, Args, Command, HubService};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(&args.log_level, args.no_color)?;

    let config = AppConfig::load(&args.config)?;
    info!(
        "Loaded configuration '{}' from {}",
        config.name,
        args.config.display()
    );

    let command = args.command();
    if command == Command::Validate {
        let entities = config.validate()?;
        info!(
            "Configuration is valid: {} entities, device {}:{} (slave {})",
            entities.len(),
            config.hub.host,
            config.hub.port,
            config.hub.slave_id
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let service = HubService::start(config, shutdown.clone()).await?;

    match service.probe_serial_number().await {
        Ok(Some(serial)) => info!("Device serial number: {}", serial),
        Ok(None) => warn!("Device serial number not available"),
        Err(e) => warn!("Failed to read device serial number: {}", e),
    }

    let result = match command {
        Command::Run => {
            let _signal_task = shutdown::cancel_on_signal(shutdown.clone());
            service.run().await
        },
        Command::Read => service.read_once().await.map(|()| {
            for (entity, state) in service.entity_states() {
                match state {
                    Ok(state) => println!("{}: {}", entity.key(), state),
                    Err(e) => println!("{}: error: {}", entity.key(), e),
                }
            }
        }),
        Command::Switch { key, state } => service
            .switch(&key, state)
            .await
            .with_context(|| format!("Failed to switch '{}'", key)),
        Command::Validate => Ok(()),
    };

    service.stop().await;
    result
}
