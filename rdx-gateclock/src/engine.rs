//! The engine that drives the gate tracker from a recurring timer.

use crate::common::{ListenerId, ReminderLead};
use crate::config::GateClockConfig;
use crate::error::GateClockError;
use crate::events::{GateEvent, SystemEvent};
use crate::time::{SystemTimeSource, TickEvent, TimeSource};
use crate::tracker::{GateSnapshot, GateTracker, TickOutcome};
use chrono_tz::Tz;
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// A callback invoked synchronously from inside the tick handler.
pub type GateCallback = Box<dyn FnMut() + Send + Sync>;

/// Which edge a registered callback listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    GateStart,
    Remind,
}

struct Listener {
    kind: ListenerKind,
    callback: GateCallback,
}

/// The main Gateclock engine.
///
/// Holds the configuration, the tracker and every registered callback, and
/// drives the tick loop. The engine is cheap to clone; every clone is a handle
/// to the same running instance.
///
/// Ticks never overlap: the loop awaits each `tick()` before waiting on the
/// timer again, and missed timer periods are delayed rather than replayed in
/// a burst.
#[derive(Clone)]
pub struct GateClockEngine {
    config: Arc<GateClockConfig>,
    time_source: Arc<dyn TimeSource>,
    tracker: Arc<RwLock<GateTracker<Tz>>>,
    listeners: Arc<RwLock<SlotMap<ListenerId, Listener>>>,
    tick_count: Arc<AtomicU64>,
    tick_sender: broadcast::Sender<TickEvent>,
    gate_event_sender: broadcast::Sender<GateEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

// Core implementation block for internal logic.
impl GateClockEngine {
    /// Creates an engine reading the real system clock.
    pub fn new(config: GateClockConfig) -> Result<Self, GateClockError> {
        Self::with_time_source(config, SystemTimeSource)
    }

    /// Creates an engine reading time from `time_source`.
    ///
    /// The configuration is validated first. The window and countdown are
    /// initialized from the source's current time.
    pub fn with_time_source(
        config: GateClockConfig,
        time_source: impl TimeSource,
    ) -> Result<Self, GateClockError> {
        config.validate()?;

        const CHANNEL_CAPACITY: usize = 256;
        let (tick_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (gate_event_sender, _) = broadcast::channel(64);
        let (system_event_sender, _) = broadcast::channel(64);

        let now = time_source.now().with_timezone(&config.timezone);
        let tracker = GateTracker::new(&now, config.remind_in_minutes);

        Ok(Self {
            config: Arc::new(config),
            time_source: Arc::new(time_source),
            tracker: Arc::new(RwLock::new(tracker)),
            listeners: Arc::new(RwLock::new(SlotMap::with_key())),
            tick_count: Arc::new(AtomicU64::new(0)),
            tick_sender,
            gate_event_sender,
            system_event_sender,
        })
    }

    /// Runs the tick loop until a Ctrl+C signal is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("GateClockEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let ticker = self.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move { ticker.run_until(shutdown_rx).await });

        info!(
            "Engine running every {:?}. Press Ctrl+C to shut down.",
            self.config.resolution.period()
        );
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received. Stopping the tick loop...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. The tick loop may already be gone.");
        }
        handle.await?;
        info!("GateClockEngine has shut down.");
        Ok(())
    }

    /// Runs the tick loop until `shutdown_rx` yields or its sender is dropped.
    pub async fn run_until(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.config.resolution.period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: self.time_source.now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
    }

    /// Runs one tick handler at the time source's current time.
    ///
    /// Reminder callbacks run before gate-start callbacks. All of them run to
    /// completion before this returns.
    pub async fn tick(&self) -> TickOutcome<Tz> {
        let timestamp = self.time_source.now();
        let tick = TickEvent {
            tick_count: self.tick_count.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp,
        };
        trace!("Tick #{} at {}.", tick.tick_count, tick.timestamp);
        self.tick_sender.send(tick).ok();

        let now = timestamp.with_timezone(&self.config.timezone);
        let (outcome, lead, next_gates) = {
            let mut tracker = self.tracker.write().await;
            let outcome = tracker.tick(&now);
            (outcome, tracker.reminder_lead(), tracker.next_gates().clone())
        };

        if let Some(gate) = &outcome.reminded {
            info!(gate = %gate, lead_minutes = lead.minutes(), "Reminder due.");
            self.invoke(ListenerKind::Remind).await;
            self.gate_event_sender
                .send(GateEvent::ReminderDue {
                    gate: gate.clone(),
                    remind_in_minutes: lead.minutes(),
                })
                .ok();
        }
        if let Some(gate) = &outcome.started {
            info!(gate = %gate, next = %next_gates[0], "Gate started.");
            self.invoke(ListenerKind::GateStart).await;
            self.gate_event_sender
                .send(GateEvent::GateStarted {
                    gate: gate.clone(),
                    next_gates,
                })
                .ok();
        }
        outcome
    }

    #[doc(hidden)]
    async fn invoke(&self, kind: ListenerKind) {
        let mut listeners = self.listeners.write().await;
        for (_id, listener) in listeners.iter_mut() {
            if listener.kind == kind {
                (listener.callback)();
            }
        }
    }

    #[doc(hidden)]
    async fn add_listener(&self, kind: ListenerKind, callback: GateCallback) -> ListenerId {
        let id = self
            .listeners
            .write()
            .await
            .insert(Listener { kind, callback });
        self.system_event_sender
            .send(SystemEvent::ListenerAdded { id })
            .ok();
        id
    }
}

// Public API implementation block.
impl GateClockEngine {
    /// Registers a callback invoked once per cycle when a gate starts.
    ///
    /// # Returns
    /// A `ListenerId` which can be used to later remove this callback.
    pub async fn on_gate_start(&self, callback: impl FnMut() + Send + Sync + 'static) -> ListenerId {
        self.add_listener(ListenerKind::GateStart, Box::new(callback))
            .await
    }

    /// Registers a callback invoked at most once per cycle when the reminder
    /// lead is reached. Never invoked while the reminder is disabled.
    pub async fn on_remind(&self, callback: impl FnMut() + Send + Sync + 'static) -> ListenerId {
        self.add_listener(ListenerKind::Remind, Box::new(callback))
            .await
    }

    /// Removes a callback registered with `on_gate_start` or `on_remind`.
    ///
    /// Returns `true` if the callback was found and removed.
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        let was_removed = self.listeners.write().await.remove(id).is_some();
        if was_removed {
            self.system_event_sender
                .send(SystemEvent::ListenerRemoved { id })
                .ok();
        }
        was_removed
    }

    /// Changes the reminder lead for the current and all following cycles.
    ///
    /// Leads of a full cycle or more are rejected and leave the engine
    /// untouched.
    pub async fn set_remind_in_minutes(&self, minutes: u32) -> Result<(), GateClockError> {
        let lead = ReminderLead::new(minutes)?;
        let reminder_fired = {
            let mut tracker = self.tracker.write().await;
            tracker.set_reminder_lead(lead);
            tracker.reminder_fired()
        };
        debug!(minutes, reminder_fired, "Reminder lead reconfigured.");
        self.system_event_sender
            .send(SystemEvent::ReminderReconfigured {
                remind_in_minutes: minutes,
                reminder_fired,
            })
            .ok();
        Ok(())
    }

    /// Returns the current countdown and preview window.
    pub async fn snapshot(&self) -> GateSnapshot<Tz> {
        self.tracker.read().await.snapshot()
    }

    /// Returns the configuration the engine was built with.
    pub fn config(&self) -> &GateClockConfig {
        &self.config
    }

    /// Subscribes to the `GateEvent` stream.
    pub fn subscribe_gate_events(&self) -> broadcast::Receiver<GateEvent> {
        self.gate_event_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the raw `TickEvent` stream.
    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<TickEvent> {
        self.tick_sender.subscribe()
    }
}
