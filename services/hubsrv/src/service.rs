//! Hub service runtime
//!
//! Wires one device connection, its coordinator and the configured entities
//! together, and runs the polling loop with reconnection.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voltage_hub::{
    decode_registers, derive_registers, CoordinatorEvent, EntityState, ModbusCoordinator,
    ModbusEntity, ModbusHub, ModbusSimulator, RegisterType, RegisterValue, TcpTransport,
};

use crate::cli::SwitchState;
use crate::config::AppConfig;

pub struct HubService {
    config: AppConfig,
    entities: Vec<ModbusEntity>,
    hub: Arc<ModbusHub>,
    coordinator: Arc<ModbusCoordinator>,
    simulator: Option<ModbusSimulator>,
    shutdown: CancellationToken,
}

impl HubService {
    /// Validate the configuration, connect to the device and register entities
    ///
    /// With simulation enabled an in-process device is started first and the
    /// hub connects to it instead of the configured host.
    pub async fn start(mut config: AppConfig, shutdown: CancellationToken) -> Result<Self> {
        let entities = config.validate()?;

        let simulator = if config.simulation.enabled {
            let simulator = seed_simulator(&config);
            let addr = simulator
                .start(&config.simulation.bind, shutdown.child_token())
                .await
                .context("Failed to start Modbus simulator")?;
            info!("Simulation enabled, using simulator at {}", addr);
            config.hub.host = addr.ip().to_string();
            config.hub.port = addr.port();
            Some(simulator)
        } else {
            None
        };

        let transport = TcpTransport::new(config.hub.tcp_params());
        let hub = Arc::new(
            ModbusHub::new(transport, config.hub.message_wait())
                .with_batch_limits(config.hub.batch),
        );

        if !hub.connect().await? {
            bail!(
                "Could not connect to the Modbus device at {}:{}",
                config.hub.host,
                config.hub.port
            );
        }

        let coordinator = Arc::new(ModbusCoordinator::new(
            config.name.clone(),
            Arc::clone(&hub),
            config.hub.slave_id,
            config.hub.update_interval(),
        ));
        for entity in &entities {
            coordinator.add_entity(entity)?;
        }
        info!(
            "[{}] {} entities registered, {} registers in demand",
            config.name,
            entities.len(),
            coordinator.demand().len()
        );

        Ok(Self {
            config,
            entities,
            hub,
            coordinator,
            simulator,
            shutdown,
        })
    }

    pub fn coordinator(&self) -> &Arc<ModbusCoordinator> {
        &self.coordinator
    }

    pub fn entities(&self) -> &[ModbusEntity] {
        &self.entities
    }

    pub fn simulator(&self) -> Option<&ModbusSimulator> {
        self.simulator.as_ref()
    }

    /// Read the device serial number from the identity registers
    ///
    /// Returns `None` when the device does not expose them.
    pub async fn probe_serial_number(&self) -> Result<Option<String>> {
        let identity = self.config.identity;
        let registers =
            derive_registers(identity.address, RegisterType::String, Some(identity.count))?;
        let data = self
            .hub
            .batch_read(registers.iter().copied(), self.config.hub.slave_id)
            .await?;

        let Some(words) = registers
            .iter()
            .map(|register| data.get(register).copied())
            .collect::<Option<Vec<u16>>>()
        else {
            warn!(
                "Serial number registers {}..{} not available",
                identity.address,
                identity.address as u32 + identity.count as u32
            );
            return Ok(None);
        };

        match decode_registers(&words, RegisterType::String)? {
            RegisterValue::Text(serial) if !serial.is_empty() => Ok(Some(serial)),
            _ => Ok(None),
        }
    }

    /// Current state of every entity, in configuration order
    pub fn entity_states(&self) -> Vec<(&ModbusEntity, voltage_hub::Result<EntityState>)> {
        let data = self.coordinator.snapshot();
        self.entities
            .iter()
            .map(|entity| (entity, entity.state(&data)))
            .collect()
    }

    pub fn log_entity_states(&self) {
        for (entity, state) in self.entity_states() {
            match state {
                Ok(state) => info!("  {} = {}", entity.name(), state),
                Err(e) => warn!("  {}: {}", entity.name(), e),
            }
        }
    }

    /// One refresh cycle
    pub async fn read_once(&self) -> Result<()> {
        self.coordinator.refresh().await?;
        Ok(())
    }

    pub async fn switch(&self, key: &str, state: SwitchState) -> Result<()> {
        let entity = self
            .entities
            .iter()
            .find(|entity| entity.key() == key)
            .ok_or_else(|| anyhow!("Unknown entity '{}'", key))?;

        match state {
            SwitchState::On => entity.turn_on(&self.coordinator).await?,
            SwitchState::Off => entity.turn_off(&self.coordinator).await?,
        }
        info!("{} switched {:?}", entity.name(), state);
        Ok(())
    }

    /// Poll until the shutdown token is cancelled
    pub async fn run(&self) -> Result<()> {
        let mut events = self.coordinator.subscribe();
        let polling = self.coordinator.start_polling(self.shutdown.child_token());
        if polling.is_none() {
            info!("No update interval configured, running one refresh only");
            // Failures come back through the event stream below
            let _ = self.coordinator.refresh().await;
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(CoordinatorEvent::Refreshed { registers }) => {
                        debug!("Refreshed {} registers", registers);
                        self.log_entity_states();
                    },
                    Ok(CoordinatorEvent::Patched { address, value }) => {
                        debug!("Register {} patched to {}", address, value);
                        self.log_entity_states();
                    },
                    Ok(CoordinatorEvent::Failed { error }) => {
                        self.handle_cycle_failure(&error).await;
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event listener lagged, {} events skipped", skipped);
                    },
                    Err(RecvError::Closed) => break,
                },
            }
        }

        if let Some(handle) = polling {
            if let Err(e) = handle.await {
                error!("Polling task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Reconnect when a failed cycle left the transport disconnected
    async fn handle_cycle_failure(&self, reason: &str) {
        if self.hub.is_connected().await {
            debug!("Cycle failed with the link still up: {}", reason);
            return;
        }

        warn!("Connection to the Modbus device lost, attempting reconnection...");
        match reconnect(&self.hub, &self.shutdown).await {
            Some(Ok(true)) => info!("Reconnected to the Modbus device"),
            Some(Ok(false)) => warn!("Reconnection failed, retrying on the next failed cycle"),
            Some(Err(e)) => error!("Reconnection error: {}", e),
            None => debug!("Shutdown requested, reconnection abandoned"),
        }
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.hub.close().await;
        info!("[{}] Stopped", self.config.name);
    }
}

/// Reconnect the hub unless `shutdown` fires first
///
/// Returns `None` when shutdown interrupted the attempt.
async fn reconnect(
    hub: &ModbusHub,
    shutdown: &CancellationToken,
) -> Option<voltage_hub::Result<bool>> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        result = hub.connect() => Some(result),
    }
}

fn seed_simulator(config: &AppConfig) -> ModbusSimulator {
    let simulator = ModbusSimulator::with_registers(
        config
            .simulation
            .registers
            .iter()
            .map(|register| (register.address, register.value)),
    );
    if let Some(serial) = &config.simulation.serial_number {
        simulator.set_string(config.identity.address, config.identity.count, serial);
    }
    simulator
}
