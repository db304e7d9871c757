use anyhow::Result;
use gateclock::format::{
    format_hours_minutes, format_minutes_seconds, reminder_message, START_MESSAGE,
};
use gateclock::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration. GATECLOCK_CONFIG points at an explicit file.
    let path = std::env::var_os("GATECLOCK_CONFIG").map(PathBuf::from);
    let config = GateClockConfig::load(path.as_deref())?;
    info!(
        timezone = %config.timezone,
        remind_in_minutes = config.remind_in_minutes.minutes(),
        "Configuration loaded."
    );

    // 3. Create the engine.
    let engine = GateClockEngine::new(config)?;

    // 4. Spawn listeners for the broadcast streams.
    spawn_event_listeners(&engine);

    // 5. Register the two edge callbacks.
    register_callbacks(&engine).await;

    let snapshot = engine.snapshot().await;
    info!(
        "Next gate at {} (in {}).",
        format_hours_minutes(&snapshot.next_gates[0]),
        format_minutes_seconds(snapshot.time_until_ms)
    );

    // 6. Run the engine until Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns tasks that log the gate and system event streams.
fn spawn_event_listeners(engine: &GateClockEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut gate_rx = engine.subscribe_gate_events();
    tokio::spawn(async move {
        while let Ok(event) = gate_rx.recv().await {
            match event {
                GateEvent::ReminderDue {
                    gate,
                    remind_in_minutes,
                } => info!(
                    "[REMIND] {} ({})",
                    reminder_message(remind_in_minutes),
                    format_hours_minutes(&gate)
                ),
                GateEvent::GateStarted { gate, next_gates } => info!(
                    "[GATE] {} ({}), following: {}",
                    START_MESSAGE,
                    format_hours_minutes(&gate),
                    next_gates
                        .iter()
                        .map(format_hours_minutes)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        }
    });
}

/// Registers callbacks that count how many cycles have been observed.
async fn register_callbacks(engine: &GateClockEngine) {
    let gates_seen = Arc::new(AtomicU32::new(0));
    let counter = gates_seen.clone();
    engine
        .on_gate_start(move || {
            let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
            info!("[CALLBACK] Gate start #{}.", seen);
        })
        .await;

    let reminders_seen = Arc::new(AtomicU32::new(0));
    let counter = reminders_seen.clone();
    engine
        .on_remind(move || {
            let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
            info!("[CALLBACK] Reminder #{}.", seen);
        })
        .await;
}
