//! Connection manager: the single owner of all connection records.
//!
//! # Responsibilities
//! - Serialize every read and write of the record map through one task
//! - Apply the breaker rules and emit one event per state-affecting operation
//! - Run the periodic sweep on the same task, re-armed after every pass
//!
//! # Design Decisions
//! - `ConnectionManager` is a cheap, cloneable handle; requests travel over
//!   an mpsc channel and are answered on a oneshot, so each call is atomic
//!   with respect to every other call and to the sweep
//! - Events are handed to the dispatcher before the reply is sent and never
//!   block the owner task
//! - The task exits when every handle is dropped or on shutdown; later calls
//!   fail with `ManagerStopped`

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::events::{EventData, EventDispatcher, EventFilter, EventType, Subscription, SubscriptionId};
use crate::lifecycle::wait_for_shutdown;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{ConnectionRecord, Outcome};
use crate::resilience::sweep::{self, SweepAction, SweepReport};
use crate::resilience::types::{ConfigureOptions, ConnectionOptions};
use crate::types::{BreakerError, BreakerResult, CircuitState, ConnectionKey};

const COMMAND_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Register {
        key: ConnectionKey,
        options: ConnectionOptions,
        reply: Reply<BreakerResult<ConnectionRecord>>,
    },
    Unregister {
        key: ConnectionKey,
        reply: Reply<()>,
    },
    Status {
        key: ConnectionKey,
        reply: Reply<BreakerResult<ConnectionRecord>>,
    },
    Available {
        key: ConnectionKey,
        reply: Reply<bool>,
    },
    Success {
        key: ConnectionKey,
        reply: Reply<BreakerResult<()>>,
    },
    Failure {
        key: ConnectionKey,
        reason: Option<String>,
        reply: Reply<BreakerResult<()>>,
    },
    Open {
        key: ConnectionKey,
        reason: Option<String>,
        expiry_ms: Option<u64>,
        reply: Reply<BreakerResult<()>>,
    },
    Close {
        key: ConnectionKey,
        reason: Option<String>,
        reply: Reply<BreakerResult<()>>,
    },
    Reset {
        key: ConnectionKey,
        reason: Option<String>,
        reply: Reply<BreakerResult<()>>,
    },
    Configure {
        key: Option<ConnectionKey>,
        options: ConfigureOptions,
        reply: Reply<BreakerResult<()>>,
    },
    List {
        reply: Reply<Vec<ConnectionRecord>>,
    },
    Config {
        reply: Reply<GlobalConfig>,
    },
    Sweep {
        reply: Reply<SweepReport>,
    },
}

/// Handle to the connection manager task.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    dispatcher: EventDispatcher,
}

impl ConnectionManager {
    /// Start the manager task with its own event dispatcher.
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: GlobalConfig) -> Self {
        Self::spawn_with_dispatcher(config, EventDispatcher::spawn(), None)
    }

    /// Start the manager and its dispatcher, both stopping on `shutdown`.
    pub fn spawn_with_shutdown(config: GlobalConfig, shutdown: &crate::lifecycle::Shutdown) -> Self {
        let dispatcher = EventDispatcher::spawn_with_shutdown(shutdown.subscribe());
        Self::spawn_with_dispatcher(config, dispatcher, Some(shutdown.subscribe()))
    }

    /// Start the manager publishing to an existing dispatcher.
    pub fn spawn_with_dispatcher(
        config: GlobalConfig,
        dispatcher: EventDispatcher,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        tracing::info!(
            max_attempts = ?config.max_attempts,
            expiry_ms = config.expiry_ms,
            cleanup_interval_ms = config.cleanup_interval_ms,
            inactive_threshold_ms = config.inactive_threshold_ms,
            "Connection manager starting"
        );

        let owner = Owner {
            records: HashMap::new(),
            clock: dispatcher.clock(),
            dispatcher: dispatcher.clone(),
            config,
        };
        tokio::spawn(owner.run(rx, shutdown));

        Self { commands, dispatcher }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Start tracking a connection in the Closed state.
    pub async fn register(
        &self,
        key: impl Into<ConnectionKey>,
        options: ConnectionOptions,
    ) -> BreakerResult<ConnectionRecord> {
        let key = key.into();
        self.request(|reply| Command::Register { key, options, reply }).await?
    }

    /// Stop tracking a connection. Unknown connections are not an error.
    pub async fn unregister(&self, key: impl Into<ConnectionKey>) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Unregister { key, reply }).await
    }

    /// Snapshot of a connection's record.
    pub async fn status(&self, key: impl Into<ConnectionKey>) -> BreakerResult<ConnectionRecord> {
        let key = key.into();
        self.request(|reply| Command::Status { key, reply }).await?
    }

    /// Whether calls may go through. Unknown connections, or a stopped
    /// manager, count as unavailable.
    pub async fn is_available(&self, key: impl Into<ConnectionKey>) -> bool {
        let key = key.into();
        self.request(|reply| Command::Available { key, reply })
            .await
            .unwrap_or(false)
    }

    /// Report a successful call.
    pub async fn success(&self, key: impl Into<ConnectionKey>) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Success { key, reply }).await?
    }

    /// Report a failed call.
    pub async fn failure(&self, key: impl Into<ConnectionKey>, reason: Option<String>) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Failure { key, reason, reply }).await?
    }

    /// Force the circuit open. Without `expiry_ms` the connection's strategy
    /// decides how long it stays open.
    pub async fn open_circuit(
        &self,
        key: impl Into<ConnectionKey>,
        reason: Option<String>,
        expiry_ms: Option<u64>,
    ) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Open { key, reason, expiry_ms, reply }).await?
    }

    /// Force the circuit closed, keeping the failure count.
    pub async fn close_circuit(&self, key: impl Into<ConnectionKey>, reason: Option<String>) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Close { key, reason, reply }).await?
    }

    /// Force the circuit closed and clear the failure count.
    pub async fn reset_circuit(&self, key: impl Into<ConnectionKey>, reason: Option<String>) -> BreakerResult<()> {
        let key = key.into();
        self.request(|reply| Command::Reset { key, reason, reply }).await?
    }

    /// Update one connection's tunables, or merge into the global defaults
    /// when `key` is `None`.
    pub async fn configure(&self, key: Option<ConnectionKey>, options: ConfigureOptions) -> BreakerResult<()> {
        self.request(|reply| Command::Configure { key, options, reply }).await?
    }

    /// Snapshots of every tracked connection.
    pub async fn list(&self) -> BreakerResult<Vec<ConnectionRecord>> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Current global defaults.
    pub async fn global_config(&self) -> BreakerResult<GlobalConfig> {
        self.request(|reply| Command::Config { reply }).await
    }

    /// Run the sweep now instead of waiting for the timer.
    pub async fn sweep(&self) -> BreakerResult<SweepReport> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    pub fn subscribe(&self, filter: EventFilter) -> BreakerResult<Subscription> {
        self.dispatcher.subscribe(filter)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> BreakerResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| BreakerError::ManagerStopped)?;
        rx.await.map_err(|_| BreakerError::ManagerStopped)
    }
}

/// State owned by the manager task.
struct Owner {
    records: HashMap<ConnectionKey, ConnectionRecord>,
    config: GlobalConfig,
    clock: Clock,
    dispatcher: EventDispatcher,
}

impl Owner {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut shutdown: Option<broadcast::Receiver<()>>) {
        let sweep_timer = time::sleep(self.cleanup_interval());
        tokio::pin!(sweep_timer);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let interval = self.config.cleanup_interval_ms;
                    self.handle(command);
                    if self.config.cleanup_interval_ms != interval {
                        tracing::debug!(
                            cleanup_interval_ms = self.config.cleanup_interval_ms,
                            "Sweep timer re-armed"
                        );
                        sweep_timer.as_mut().reset(Instant::now() + self.cleanup_interval());
                    }
                }
                _ = &mut sweep_timer => {
                    self.sweep();
                    sweep_timer.as_mut().reset(Instant::now() + self.cleanup_interval());
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("Connection manager received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        tracing::debug!(connections = self.records.len(), "Connection manager stopped");
    }

    fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.config.cleanup_interval_ms)
    }

    fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller went away; the operation
        // still took effect.
        match command {
            Command::Register { key, options, reply } => {
                let _ = reply.send(self.register(key, options));
            }
            Command::Unregister { key, reply } => {
                self.unregister(key);
                let _ = reply.send(());
            }
            Command::Status { key, reply } => {
                let _ = reply.send(self.get(&key).cloned());
            }
            Command::Available { key, reply } => {
                let available = self.records.get(&key).is_some_and(ConnectionRecord::is_available);
                let _ = reply.send(available);
            }
            Command::Success { key, reply } => {
                let _ = reply.send(self.success(key));
            }
            Command::Failure { key, reason, reply } => {
                let _ = reply.send(self.failure(key, reason));
            }
            Command::Open { key, reason, expiry_ms, reply } => {
                let _ = reply.send(self.open(key, reason, expiry_ms));
            }
            Command::Close { key, reason, reply } => {
                let _ = reply.send(self.close(key, reason, false));
            }
            Command::Reset { key, reason, reply } => {
                let _ = reply.send(self.close(key, reason, true));
            }
            Command::Configure { key, options, reply } => {
                let _ = reply.send(self.configure(key, options));
            }
            Command::List { reply } => {
                let mut records: Vec<_> = self.records.values().cloned().collect();
                records.sort_by(|a, b| (&a.scope, &a.identifier).cmp(&(&b.scope, &b.identifier)));
                let _ = reply.send(records);
            }
            Command::Config { reply } => {
                let _ = reply.send(self.config.clone());
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.sweep());
            }
        }
    }

    fn get(&self, key: &ConnectionKey) -> BreakerResult<&ConnectionRecord> {
        self.records
            .get(key)
            .ok_or_else(|| BreakerError::NotFound(key.clone()))
    }

    fn get_mut(&mut self, key: &ConnectionKey) -> BreakerResult<&mut ConnectionRecord> {
        self.records
            .get_mut(key)
            .ok_or_else(|| BreakerError::NotFound(key.clone()))
    }

    fn register(&mut self, key: ConnectionKey, options: ConnectionOptions) -> BreakerResult<ConnectionRecord> {
        options.validate()?;
        if self.records.contains_key(&key) {
            return Err(BreakerError::AlreadyRegistered(key));
        }

        let record = ConnectionRecord::new(key.clone(), options, &self.config, self.clock.now_ms());
        record.check_expiry_bounds()?;

        tracing::info!(
            connection = %record.identifier,
            scope = ?record.scope,
            max_attempts = ?record.max_attempts,
            expiry_ms = record.expiry_ms,
            strategy = ?record.expiry_strategy,
            "Connection registered"
        );

        self.emit(
            EventType::Registration,
            &key,
            EventData::Registered {
                max_attempts: record.max_attempts,
                expiry_ms: record.expiry_ms,
                expiry_strategy: record.expiry_strategy,
            },
        );
        self.records.insert(key, record.clone());
        metrics::record_connection_count(self.records.len());

        Ok(record)
    }

    fn unregister(&mut self, key: ConnectionKey) {
        let Some(record) = self.records.remove(&key) else {
            tracing::debug!(connection = %key, "Unregister of unknown connection ignored");
            return;
        };

        tracing::info!(connection = %record.identifier, scope = ?record.scope, "Connection unregistered");
        self.emit(
            EventType::ConnectionUnregistered,
            &key,
            EventData::Removed {
                state: record.state,
                failure_count: record.failure_count,
                last_activity: record.last_activity(),
            },
        );
        metrics::record_connection_count(self.records.len());
    }

    fn success(&mut self, key: ConnectionKey) -> BreakerResult<()> {
        let now = self.clock.now_ms();
        let record = self.get_mut(&key)?;
        let outcome = record.record_success(now);
        let state = record.state;
        let failure_count = record.failure_count;

        match outcome {
            Outcome::Closed { from } => {
                tracing::info!(connection = %key, from = %from, "Circuit closed after successful probe");
                metrics::record_transition(CircuitState::Closed);
                self.emit(
                    EventType::CircuitClosed,
                    &key,
                    EventData::StateChanged {
                        previous: from,
                        new: state,
                        reason: None,
                        failure_count,
                        expiry_ms: None,
                    },
                );
            }
            _ => {
                tracing::trace!(connection = %key, state = %state, "Success recorded");
                self.emit(EventType::Success, &key, EventData::SuccessRecorded { state });
            }
        }
        Ok(())
    }

    fn failure(&mut self, key: ConnectionKey, reason: Option<String>) -> BreakerResult<()> {
        let now = self.clock.now_ms();
        let record = self.get_mut(&key)?;
        let outcome = record.record_failure(now, reason.as_deref());
        let failure_count = record.failure_count;
        let expiry_ms = record.expiry_ms;
        metrics::record_failure();

        match outcome {
            Outcome::Opened { from } => {
                tracing::warn!(
                    connection = %key,
                    from = %from,
                    failure_count,
                    expiry_ms,
                    reason = ?reason,
                    "Circuit opened"
                );
                metrics::record_transition(CircuitState::Open);
                self.emit(
                    EventType::CircuitOpened,
                    &key,
                    EventData::StateChanged {
                        previous: from,
                        new: CircuitState::Open,
                        reason,
                        failure_count,
                        expiry_ms: Some(expiry_ms),
                    },
                );
            }
            _ => {
                tracing::debug!(connection = %key, failure_count, reason = ?reason, "Failure recorded");
                self.emit(
                    EventType::Failure,
                    &key,
                    EventData::FailureRecorded {
                        reason,
                        count: failure_count,
                    },
                );
            }
        }
        Ok(())
    }

    fn open(&mut self, key: ConnectionKey, reason: Option<String>, expiry_ms: Option<u64>) -> BreakerResult<()> {
        let now = self.clock.now_ms();
        let record = self.get_mut(&key)?;
        let from = record.open(now, expiry_ms);
        let failure_count = record.failure_count;
        let expiry_ms = record.expiry_ms;

        tracing::warn!(connection = %key, from = %from, expiry_ms, reason = ?reason, "Circuit forced open");
        metrics::record_transition(CircuitState::Open);
        self.emit(
            EventType::CircuitOpened,
            &key,
            EventData::StateChanged {
                previous: from,
                new: CircuitState::Open,
                reason,
                failure_count,
                expiry_ms: Some(expiry_ms),
            },
        );
        Ok(())
    }

    fn close(&mut self, key: ConnectionKey, reason: Option<String>, reset: bool) -> BreakerResult<()> {
        let record = self.get_mut(&key)?;
        let from = if reset { record.reset() } else { record.close() };
        let failure_count = record.failure_count;

        let event_type = if reset {
            EventType::CircuitReset
        } else {
            EventType::CircuitClosed
        };

        tracing::info!(connection = %key, from = %from, reason = ?reason, event = %event_type, "Circuit forced closed");
        metrics::record_transition(CircuitState::Closed);
        self.emit(
            event_type,
            &key,
            EventData::StateChanged {
                previous: from,
                new: CircuitState::Closed,
                reason,
                failure_count,
                expiry_ms: None,
            },
        );
        Ok(())
    }

    fn configure(&mut self, key: Option<ConnectionKey>, options: ConfigureOptions) -> BreakerResult<()> {
        options.validate()?;

        let Some(key) = key else {
            options.apply_to(&mut self.config);
            tracing::info!(
                max_attempts = ?self.config.max_attempts,
                expiry_ms = self.config.expiry_ms,
                cleanup_interval_ms = self.config.cleanup_interval_ms,
                inactive_threshold_ms = self.config.inactive_threshold_ms,
                "Global configuration updated"
            );
            return Ok(());
        };

        let record = self.get_mut(&key)?;
        let mut updated = record.clone();
        updated.apply(&options);
        updated.check_expiry_bounds()?;
        *record = updated;
        let data = EventData::Configured {
            max_attempts: record.max_attempts,
            expiry_ms: record.expiry_ms,
            expiry_strategy: record.expiry_strategy,
        };

        tracing::info!(connection = %key, options = ?options, "Connection reconfigured");
        self.emit(EventType::ConnectionConfigured, &key, data);
        Ok(())
    }

    fn sweep(&mut self) -> SweepReport {
        let now = self.clock.now_ms();
        let actions = sweep::sweep(&mut self.records, now, self.config.inactive_threshold_ms);
        let report = SweepReport::from_actions(&actions);

        for action in actions {
            match action {
                SweepAction::Removed(record) => {
                    let key = record.key();
                    tracing::info!(
                        connection = %key,
                        idle_ms = now.saturating_sub(record.last_activity()),
                        "Inactive connection removed"
                    );
                    self.emit(
                        EventType::ConnectionRemoved,
                        &key,
                        EventData::Removed {
                            state: record.state,
                            failure_count: record.failure_count,
                            last_activity: record.last_activity(),
                        },
                    );
                }
                SweepAction::HalfOpened(key) => {
                    let failure_count = self.records.get(&key).map_or(0, |r| r.failure_count);
                    tracing::info!(connection = %key, "Circuit expired, half-open for probing");
                    metrics::record_transition(CircuitState::HalfOpen);
                    self.emit(
                        EventType::CircuitHalfOpened,
                        &key,
                        EventData::StateChanged {
                            previous: CircuitState::Open,
                            new: CircuitState::HalfOpen,
                            reason: None,
                            failure_count,
                            expiry_ms: None,
                        },
                    );
                }
            }
        }

        if report.removed > 0 {
            metrics::record_connection_count(self.records.len());
        }
        metrics::record_sweep(report.removed, report.half_opened);
        tracing::debug!(
            removed = report.removed,
            half_opened = report.half_opened,
            remaining = self.records.len(),
            "Sweep complete"
        );

        report
    }

    fn emit(&self, event_type: EventType, key: &ConnectionKey, data: EventData) {
        self.dispatcher
            .dispatch(event_type, key.identifier.clone(), key.scope.clone(), data);
    }
}
