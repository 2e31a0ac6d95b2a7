//! Demand aggregation coordinator
//!
//! Consumers register the registers they need once. Every refresh cycle the
//! coordinator reads the union of that demand through the hub in a single
//! batched call and publishes the result. Consumers only ever read the
//! published mapping; the write path is the one mutator outside a cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entity::ModbusEntity;
use crate::error::{HubError, Result};
use crate::hub::{ModbusHub, RegisterMap};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification sent to consumers whenever the published mapping changes or a
/// cycle fails
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A cycle replaced the published mapping
    Refreshed { registers: usize },
    /// A successful write patched one register out of cycle
    Patched { address: u16, value: u16 },
    /// A cycle failed; the previous mapping is still published
    Failed { error: String },
}

/// What a call to [`ModbusCoordinator::refresh`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another cycle was already running; nothing was done
    Coalesced,
    /// No registered demand; no transaction was issued
    Idle,
    /// The mapping was replaced with `registers` fresh values
    Refreshed { registers: usize },
}

pub struct ModbusCoordinator {
    name: String,
    hub: Arc<ModbusHub>,
    slave_id: u8,
    update_interval: Option<Duration>,
    consumers: RwLock<HashMap<String, Vec<u16>>>,
    data: RwLock<RegisterMap>,
    last_update_success: AtomicBool,
    refresh_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl ModbusCoordinator {
    /// `update_interval` of `None` means refresh on demand only
    pub fn new(
        name: impl Into<String>,
        hub: Arc<ModbusHub>,
        slave_id: u8,
        update_interval: Option<Duration>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            hub,
            slave_id,
            update_interval,
            consumers: RwLock::new(HashMap::new()),
            data: RwLock::new(RegisterMap::new()),
            last_update_success: AtomicBool::new(true),
            refresh_gate: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &Arc<ModbusHub> {
        &self.hub
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval
    }

    // ========== Consumer registry ==========

    /// Register (or replace) the demand of one consumer
    pub fn add_consumer(&self, key: impl Into<String>, registers: Vec<u16>) -> Result<()> {
        let key = key.into();
        if registers.is_empty() {
            return Err(HubError::config(format!(
                "consumer '{key}' requires no registers"
            )));
        }
        debug!(
            "[{}] Consumer '{}' requires {} registers",
            self.name,
            key,
            registers.len()
        );
        self.consumers.write().insert(key, registers);
        Ok(())
    }

    pub fn add_entity(&self, entity: &ModbusEntity) -> Result<()> {
        self.add_consumer(entity.key(), entity.registers().to_vec())
    }

    /// Returns true if the consumer was registered
    pub fn remove_consumer(&self, key: &str) -> bool {
        self.consumers.write().remove(key).is_some()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.read().len()
    }

    /// Union of every registered consumer's registers
    pub fn demand(&self) -> BTreeSet<u16> {
        self.consumers
            .read()
            .values()
            .flat_map(|registers| registers.iter().copied())
            .collect()
    }

    // ========== Refresh cycle ==========

    /// Run one aggregation cycle
    ///
    /// At most one cycle runs at a time; a call made while one is in flight
    /// returns [`RefreshOutcome::Coalesced`] immediately. On failure the
    /// previously published mapping stays visible.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let Ok(_cycle) = self.refresh_gate.try_lock() else {
            debug!("[{}] Refresh already in progress, skipping", self.name);
            return Ok(RefreshOutcome::Coalesced);
        };

        let demand = self.demand();
        if demand.is_empty() {
            debug!("[{}] No registers requested, skipping read", self.name);
            return Ok(RefreshOutcome::Idle);
        }

        let result = match self.hub.batch_read(demand, self.slave_id).await {
            Ok(data) if data.is_empty() => Err(HubError::protocol("read returned no data")),
            other => other,
        };

        match result {
            Ok(data) => {
                let registers = data.len();
                *self.data.write() = data;
                self.last_update_success.store(true, Ordering::Release);
                debug!("[{}] Refreshed {} registers", self.name, registers);
                let _ = self.events.send(CoordinatorEvent::Refreshed { registers });
                Ok(RefreshOutcome::Refreshed { registers })
            },
            Err(e) => {
                self.last_update_success.store(false, Ordering::Release);
                warn!("[{}] Update failed: {}", self.name, e);
                let _ = self.events.send(CoordinatorEvent::Failed {
                    error: e.to_string(),
                });
                Err(HubError::update_failed(e))
            },
        }
    }

    /// Refresh every `update_interval` until `shutdown` is cancelled
    ///
    /// Returns `None` when the coordinator has no interval.
    pub fn start_polling(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.update_interval?;
        let coordinator = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                "[{}] Polling started, interval {:?}",
                coordinator.name, period
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("[{}] Polling stopped", coordinator.name);
                        break;
                    }
                    _ = interval.tick() => {
                        // Failures are already logged and broadcast by refresh()
                        let _ = coordinator.refresh().await;
                    }
                }
            }
        }))
    }

    // ========== Published mapping ==========

    pub fn get(&self, address: u16) -> Option<u16> {
        self.data.read().get(&address).copied()
    }

    pub fn snapshot(&self) -> RegisterMap {
        self.data.read().clone()
    }

    pub fn contains_all(&self, registers: &[u16]) -> bool {
        let data = self.data.read();
        registers.iter().all(|register| data.contains_key(register))
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    // ========== Write path ==========

    /// Write one register and patch the published mapping on success
    pub async fn write_register(&self, address: u16, value: u16) -> Result<()> {
        self.hub
            .write_register(address, value, self.slave_id)
            .await?;

        self.data.write().insert(address, value);
        let _ = self.events.send(CoordinatorEvent::Patched { address, value });
        Ok(())
    }
}

impl std::fmt::Debug for ModbusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusCoordinator")
            .field("name", &self.name)
            .field("slave_id", &self.slave_id)
            .field("update_interval", &self.update_interval)
            .field("consumers", &self.consumer_count())
            .finish_non_exhaustive()
    }
}
